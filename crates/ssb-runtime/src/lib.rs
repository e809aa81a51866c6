mod descriptor;
mod index;
mod locate;

pub use descriptor::{
    descriptor_path, read_runtime_descriptor, RuntimeDescriptor, RuntimeInstance,
};
pub use index::{InstanceIndex, SpotlightIndex};
pub use locate::{
    candidate_paths, locate, select_instances, Located, LocatorOutcome, SearchRoots,
    DEFAULT_RUNTIME_BUNDLE_ID, RUNTIME_APP_NAME,
};
