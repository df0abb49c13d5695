//! Restart pacing for supervised workers.
//!
//! The intervals are deliberately fixed rather than exponential: a worker
//! that keeps failing is the process supervisor's problem, not ours.

use std::time::Duration;

use rand::Rng;

/// Backoff between bus-consumer and time-sync generations.
pub const CONSUMER_RESTART: Duration = Duration::from_secs(15);

/// Cycle between service-registry re-registration attempts.
pub const REGISTRY_RESTART: Duration = Duration::from_secs(3);

/// Backoff between dispatcher / status-ticker generations.
pub const CORE_RESTART: Duration = Duration::from_secs(1);

/// Pause after a failed `accept` before retrying the listen socket.
pub const ACCEPT_RETRY: Duration = Duration::from_millis(10);

/// Apply a small jitter (0-10%) to a fixed delay so that restarts of the
/// same worker across a fleet of processes do not synchronize.
pub fn jittered(base: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let jitter_range = base_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(base_ms + jitter)
}
