//! Supervised time-sync consumer.
//!
//! Consumes time-reference broadcasts from the bus (JSON bodies carrying
//! `gps_time` and `cache_time`, unix seconds) and adjusts the system
//! clock through a [`ClockSync`] implementation.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::external::bus::BusConsumer;
use crate::lifecycle::Shutdown;
use crate::workers::bus_consumer::spawn_bus_consumer;

/// A sample older than this (by its own `cache_time`) is ignored.
const STALE_SAMPLE_SECS: i64 = 30;
/// Windowed mode only corrects drift strictly inside this band.
const WINDOW_MIN_DRIFT_SECS: i64 = 50;
const WINDOW_MAX_DRIFT_SECS: i64 = 900;

/// Clock adjustment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeSyncMode {
    /// Never adjust.
    #[default]
    Off,
    /// Adjust only when drift is between 50 and 900 seconds.
    Windowed,
    /// Always adjust to the reference time.
    Forced,
}

/// Applies a clock correction.
pub trait ClockSync: Send + Sync {
    fn adjust(&self, target_unix: i64) -> std::io::Result<()>;
}

/// Sets the system clock via the platform tools. Requires privileges.
pub struct SystemClockSync;

impl ClockSync for SystemClockSync {
    #[cfg(unix)]
    fn adjust(&self, target_unix: i64) -> std::io::Result<()> {
        let status = std::process::Command::new("date")
            .arg("-s")
            .arg(format!("@{target_unix}"))
            .status()?;
        if !status.success() {
            return Err(std::io::Error::other("date command failed"));
        }
        // Best effort; the kernel clock is already set.
        let _ = std::process::Command::new("hwclock").arg("-w").status();
        Ok(())
    }

    #[cfg(not(unix))]
    fn adjust(&self, _target_unix: i64) -> std::io::Result<()> {
        Err(std::io::Error::other("clock adjustment unsupported on this platform"))
    }
}

/// Decide on one sample and apply the correction if warranted.
/// Returns `true` when the clock was adjusted.
pub fn handle_sample(mode: TimeSyncMode, clock: &dyn ClockSync, body: &[u8]) -> bool {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable time sample");
            return false;
        }
    };
    let (Some(gps_time), Some(cache_time)) = (
        value.get("gps_time").and_then(serde_json::Value::as_i64),
        value.get("cache_time").and_then(serde_json::Value::as_i64),
    ) else {
        tracing::warn!("time sample missing gps_time or cache_time");
        return false;
    };

    let now = unix_now();
    if (cache_time - now).abs() >= STALE_SAMPLE_SECS {
        tracing::debug!(cache_time, now, "stale time sample ignored");
        return false;
    }

    let drift = (now - gps_time).abs();
    let adjust = match mode {
        TimeSyncMode::Off => false,
        TimeSyncMode::Windowed => drift > WINDOW_MIN_DRIFT_SECS && drift < WINDOW_MAX_DRIFT_SECS,
        TimeSyncMode::Forced => true,
    };
    if !adjust {
        return false;
    }

    tracing::info!(from = now, to = gps_time, drift, "adjusting system time");
    match clock.adjust(gps_time) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "clock adjustment failed");
            false
        }
    }
}

/// Start the supervised time-sync consumer.
pub fn spawn_time_sync(
    consumer: Arc<dyn BusConsumer>,
    binding_key: String,
    mode: TimeSyncMode,
    clock: Arc<dyn ClockSync>,
    backoff: Duration,
    shutdown: &Shutdown,
) -> JoinHandle<()> {
    spawn_bus_consumer(
        "time-sync",
        consumer,
        vec![binding_key],
        Arc::new(move |delivery| {
            handle_sample(mode, clock.as_ref(), &delivery.body);
        }),
        backoff,
        shutdown,
    )
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct RecordingClock {
        last: AtomicI64,
    }

    impl RecordingClock {
        fn new() -> Self {
            Self {
                last: AtomicI64::new(0),
            }
        }
        fn last(&self) -> i64 {
            self.last.load(Ordering::SeqCst)
        }
    }

    impl ClockSync for RecordingClock {
        fn adjust(&self, target_unix: i64) -> std::io::Result<()> {
            self.last.store(target_unix, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample(gps_offset: i64, cache_offset: i64) -> Vec<u8> {
        let now = unix_now();
        format!(
            "{{\"gps_time\":{},\"cache_time\":{}}}",
            now + gps_offset,
            now + cache_offset
        )
        .into_bytes()
    }

    #[test]
    fn stale_sample_is_ignored_even_when_forced() {
        let clock = RecordingClock::new();
        assert!(!handle_sample(
            TimeSyncMode::Forced,
            &clock,
            &sample(-100, -3600)
        ));
        assert_eq!(clock.last(), 0);
    }

    #[test]
    fn off_mode_never_adjusts() {
        let clock = RecordingClock::new();
        assert!(!handle_sample(TimeSyncMode::Off, &clock, &sample(-100, 0)));
    }

    #[test]
    fn windowed_mode_corrects_mid_band_drift() {
        let clock = RecordingClock::new();
        assert!(handle_sample(TimeSyncMode::Windowed, &clock, &sample(-120, 0)));
        assert_ne!(clock.last(), 0);
    }

    #[test]
    fn windowed_mode_leaves_small_and_huge_drift_alone() {
        let clock = RecordingClock::new();
        assert!(!handle_sample(TimeSyncMode::Windowed, &clock, &sample(-10, 0)));
        assert!(!handle_sample(
            TimeSyncMode::Windowed,
            &clock,
            &sample(-1000, 0)
        ));
        assert_eq!(clock.last(), 0);
    }

    #[test]
    fn forced_mode_always_adjusts_fresh_samples() {
        let clock = RecordingClock::new();
        assert!(handle_sample(TimeSyncMode::Forced, &clock, &sample(-5, 0)));
    }

    #[test]
    fn garbage_body_is_rejected() {
        let clock = RecordingClock::new();
        assert!(!handle_sample(TimeSyncMode::Forced, &clock, b"not json"));
        assert!(!handle_sample(TimeSyncMode::Forced, &clock, b"{\"gps_time\":1}"));
    }
}
