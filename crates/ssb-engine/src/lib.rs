mod assets;
mod bookmarks;
mod bundle;
mod discover;
mod payload;
mod profile;
mod template;

pub use assets::{install_welcome_assets, welcome_assets_path};
pub use bookmarks::add_welcome_bookmark;
pub use bundle::{
    info_plist_path, launch_services_path, read_bundle_info, read_url_handler, BundleInfo,
};
pub use discover::{engine_candidates, find_external_engine, validate_engine_source};
pub use payload::{
    internal_engine_path, read_payload_identity, EnginePayload, EngineSource, PayloadState,
};
pub use profile::{
    harvest_extensions, MigrationPolicy, MigrationReport, ProfileMigrator, CROSS_FAMILY_KEEP,
    DEFAULT_PROFILE, LOGIN_DATA_FILES,
};
pub use template::{app_tokens, TokenFilter};
