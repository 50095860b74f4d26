//! Periodic best location logging.
//!
//! Spawns a background task that logs the resolved location at a fixed
//! interval, useful for reviewing how often a trip fell back to the schedule.
//!
//! # Usage
//!
//! ```ignore
//! let cancellation = CancellationToken::new();
//! if tracing::enabled!(tracing::Level::DEBUG) {
//!     spawn_location_logger(resolver.provider(), cancellation.clone(), DEFAULT_LOG_INTERVAL);
//! }
//! ```
//!
//! Entries are emitted at DEBUG level with `lat`, `lon`, `position`,
//! `source`, `confidence`, `status` and, when known, the schedule `phase`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::provider::{BestLocationProvider, SharedBestLocation};

/// Default logging interval.
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(20);

/// Spawn a task that logs the best location every `interval` until cancelled.
pub fn spawn_location_logger(
    location: SharedBestLocation,
    cancellation: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    log_location(&location);
                }
                _ = cancellation.cancelled() => {
                    tracing::debug!("Location logger stopped");
                    break;
                }
            }
        }
    })
}

fn log_location(location: &SharedBestLocation) {
    let update = location.current();
    let phase = location.schedule_estimate().map(|s| s.phase);

    if let Some(best) = update.best {
        tracing::debug!(
            lat = format!("{:.5}", best.latitude),
            lon = format!("{:.5}", best.longitude),
            position = %format_position(best.latitude, best.longitude),
            source = ?best.source,
            confidence = format!("{:.2}", best.confidence),
            status = %update.status,
            phase = ?phase,
            "Best location"
        );
    } else {
        tracing::debug!(status = %update.status, phase = ?phase, "Best location (no position)");
    }
}

/// Formats coordinates with hemisphere letters, e.g. `"47.60620N 122.33210W"`.
fn format_position(latitude: f64, longitude: f64) -> String {
    let ns = if latitude >= 0.0 { 'N' } else { 'S' };
    let ew = if longitude >= 0.0 { 'E' } else { 'W' };
    format!(
        "{:.5}{} {:.5}{}",
        latitude.abs(),
        ns,
        longitude.abs(),
        ew
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_position_north_east() {
        assert_eq!(format_position(53.5, 9.2), "53.50000N 9.20000E");
        assert_eq!(format_position(0.0, 0.0), "0.00000N 0.00000E");
    }

    #[test]
    fn test_format_position_south_west() {
        assert_eq!(format_position(-33.9, -70.65), "33.90000S 70.65000W");
        assert_eq!(format_position(47.6062, -122.3321), "47.60620N 122.33210W");
    }
}
