use std::thread;
use std::time::{Duration, Instant};

use ssb_core::LifecycleError;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Polls `condition` every `policy.interval` until it holds or `policy.timeout` passes.
pub fn wait_until<Condition>(
    what: &str,
    policy: &WaitPolicy,
    mut condition: Condition,
) -> Result<(), LifecycleError>
where
    Condition: FnMut() -> bool,
{
    let started = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(LifecycleError::Timeout {
                what: what.to_string(),
                waited_ms: elapsed.as_millis() as u64,
            });
        }
        debug!(what = %what, "condition not met yet, polling again");
        thread::sleep(policy.interval.min(policy.timeout - elapsed));
    }
}
