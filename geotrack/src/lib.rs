//! Geotrack - hybrid location estimation for scheduled vehicles
//!
//! This library fuses intermittent absolute position fixes with inertial
//! motion data, and merges a remotely broadcast live position with a
//! timetable-based fallback into one best-available location.
//!
//! # Components
//!
//! - [`filter`] - constant-velocity Kalman filter over a local tangent plane
//! - [`sampling`] - tracking sessions, sensor subscriptions, prediction timer
//! - [`schedule`] - timetable position estimate along a route
//! - [`resolver`] - live broadcast vs. schedule, with a staleness rule
//!
//! # Tracking device
//!
//! ```ignore
//! use geotrack::sampling::{SamplingConfig, SamplingController};
//!
//! let mut controller = SamplingController::gps_only(SamplingConfig::default(), gnss);
//! let mut events = controller.subscribe();
//! controller.start_tracking().await?;
//! ```
//!
//! # Observer
//!
//! ```ignore
//! use geotrack::resolver::{BestLocationResolver, ResolverConfig};
//! use geotrack::schedule::ScheduleEstimator;
//!
//! let resolver = BestLocationResolver::start(
//!     ResolverConfig::new("bus-4"),
//!     channel,
//!     ScheduleEstimator::new(route),
//!     Arc::new(SystemClock),
//! );
//! let best = resolver.best_location();
//! ```

pub mod config;
pub mod filter;
pub mod logging;
pub mod resolver;
pub mod sampling;
pub mod schedule;
pub mod state;
pub mod time;

/// Version of the geotrack library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
