//! Core value types shared by the estimation engine.
//!
//! - [`AbsoluteFix`] - satellite/network position measurement
//! - [`InertialSample`] - accelerometer + heading reading
//! - [`LocationEstimate`] - filter output handed to consumers
//! - [`AccuracyLevel`] - coarse bucket of the 95% error radius
//! - [`TrackingMode`] - sampling profile of the controller
//!
//! All timestamps are `tokio::time::Instant` so timer-driven components can be
//! exercised deterministically with a paused clock.

use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

/// Absolute position measurement from the positioning source.
///
/// Ephemeral: consumed by the filter and never retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteFix {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Reported horizontal error radius in meters.
    pub horizontal_error: f64,

    /// When the fix was produced.
    pub timestamp: Instant,
}

impl AbsoluteFix {
    /// Create a fix stamped with the current time.
    pub fn new(latitude: f64, longitude: f64, horizontal_error: f64) -> Self {
        Self {
            latitude,
            longitude,
            horizontal_error,
            timestamp: Instant::now(),
        }
    }

    /// Returns true if every field is a usable finite number.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite() && self.horizontal_error.is_finite()
    }
}

/// Inertial reading in the device frame.
///
/// `acceleration_x` points forward, `acceleration_y` points right, both in m/s².
/// `heading` is the magnetometer-derived heading in radians, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InertialSample {
    pub acceleration_x: f64,
    pub acceleration_y: f64,
    pub heading: f64,
}

impl InertialSample {
    pub fn new(acceleration_x: f64, acceleration_y: f64, heading: f64) -> Self {
        Self {
            acceleration_x,
            acceleration_y,
            heading,
        }
    }

    /// Rotate the device-frame acceleration into (north, east) components.
    pub fn north_east_acceleration(&self) -> (f64, f64) {
        let (sin_h, cos_h) = self.heading.sin_cos();
        let north = self.acceleration_x * cos_h - self.acceleration_y * sin_h;
        let east = self.acceleration_x * sin_h + self.acceleration_y * cos_h;
        (north, east)
    }

    /// Clamp both acceleration axes to `±limit`.
    pub fn clamped(self, limit: f64) -> Self {
        Self {
            acceleration_x: self.acceleration_x.clamp(-limit, limit),
            acceleration_y: self.acceleration_y.clamp(-limit, limit),
            heading: self.heading,
        }
    }
}

/// Position estimate produced by the filter.
///
/// Consumers receive copies; nothing downstream can mutate filter state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationEstimate {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// 95% confidence radius in meters.
    pub horizontal_error_95: f64,

    /// Ground speed in meters per second.
    pub velocity: f64,

    /// When this estimate was computed.
    pub produced_at: Instant,
}

impl LocationEstimate {
    /// Accuracy bucket for this estimate.
    pub fn accuracy(&self) -> AccuracyLevel {
        AccuracyLevel::from_error(self.horizontal_error_95)
    }
}

/// Coarse accuracy classification of a 95% error radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccuracyLevel {
    /// Under 10 m.
    High,
    /// Under 50 m.
    Medium,
    /// Under 100 m.
    Low,
    /// 100 m or worse (including non-finite radii).
    Degraded,
}

impl AccuracyLevel {
    pub const HIGH_LIMIT_METERS: f64 = 10.0;
    pub const MEDIUM_LIMIT_METERS: f64 = 50.0;
    pub const LOW_LIMIT_METERS: f64 = 100.0;

    /// Classify a 95% error radius in meters.
    pub fn from_error(horizontal_error_95: f64) -> Self {
        if !horizontal_error_95.is_finite() {
            Self::Degraded
        } else if horizontal_error_95 < Self::HIGH_LIMIT_METERS {
            Self::High
        } else if horizontal_error_95 < Self::MEDIUM_LIMIT_METERS {
            Self::Medium
        } else if horizontal_error_95 < Self::LOW_LIMIT_METERS {
            Self::Low
        } else {
            Self::Degraded
        }
    }
}

impl std::fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
            Self::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Sampling profile of the controller.
///
/// Each mode maps to a fixed pair of (absolute fix interval, inertial interval).
/// `Off` maps to zero intervals: nothing is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingMode {
    /// Foreground navigation, highest rate.
    #[default]
    Active,
    /// Host process in the background.
    Background,
    /// Vehicle parked or waiting.
    Stationary,
    /// Sampling disabled.
    Off,
}

impl TrackingMode {
    /// Interval between absolute fixes. Zero for `Off`.
    pub fn absolute_fix_interval(&self) -> Duration {
        match self {
            Self::Active => Duration::from_millis(1_000),
            Self::Background => Duration::from_millis(5_000),
            Self::Stationary => Duration::from_millis(30_000),
            Self::Off => Duration::ZERO,
        }
    }

    /// Interval between inertial samples. Zero for `Off`.
    pub fn inertial_interval(&self) -> Duration {
        match self {
            Self::Active => Duration::from_millis(100),
            Self::Background => Duration::from_millis(1_000),
            Self::Stationary => Duration::from_millis(5_000),
            Self::Off => Duration::ZERO,
        }
    }

    /// Returns true if this mode samples nothing.
    pub fn is_off(&self) -> bool {
        matches!(self, Self::Off)
    }
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Background => write!(f, "background"),
            Self::Stationary => write!(f, "stationary"),
            Self::Off => write!(f, "off"),
        }
    }
}

impl FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "background" => Ok(Self::Background),
            "stationary" => Ok(Self::Stationary),
            "off" => Ok(Self::Off),
            other => Err(format!("unknown tracking mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_accuracy_level_boundaries() {
        assert_eq!(AccuracyLevel::from_error(0.0), AccuracyLevel::High);
        assert_eq!(AccuracyLevel::from_error(9.99), AccuracyLevel::High);
        assert_eq!(AccuracyLevel::from_error(10.0), AccuracyLevel::Medium);
        assert_eq!(AccuracyLevel::from_error(49.9), AccuracyLevel::Medium);
        assert_eq!(AccuracyLevel::from_error(50.0), AccuracyLevel::Low);
        assert_eq!(AccuracyLevel::from_error(99.9), AccuracyLevel::Low);
        assert_eq!(AccuracyLevel::from_error(100.0), AccuracyLevel::Degraded);
        assert_eq!(AccuracyLevel::from_error(f64::NAN), AccuracyLevel::Degraded);
        assert_eq!(
            AccuracyLevel::from_error(f64::INFINITY),
            AccuracyLevel::Degraded
        );
    }

    #[test]
    fn test_mode_intervals() {
        assert_eq!(
            TrackingMode::Active.absolute_fix_interval(),
            Duration::from_secs(1)
        );
        assert!(
            TrackingMode::Background.absolute_fix_interval()
                > TrackingMode::Active.absolute_fix_interval()
        );
        assert!(
            TrackingMode::Stationary.inertial_interval()
                > TrackingMode::Background.inertial_interval()
        );
        assert_eq!(TrackingMode::Off.absolute_fix_interval(), Duration::ZERO);
        assert_eq!(TrackingMode::Off.inertial_interval(), Duration::ZERO);
        assert!(TrackingMode::Off.is_off());
        assert!(!TrackingMode::Stationary.is_off());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Active".parse::<TrackingMode>(), Ok(TrackingMode::Active));
        assert_eq!(" stationary ".parse::<TrackingMode>(), Ok(TrackingMode::Stationary));
        assert_eq!("off".parse::<TrackingMode>(), Ok(TrackingMode::Off));
        assert!("sprint".parse::<TrackingMode>().is_err());
    }

    #[test]
    fn test_heading_rotation() {
        // Facing north: forward is north
        let sample = InertialSample::new(1.0, 0.0, 0.0);
        let (n, e) = sample.north_east_acceleration();
        assert!((n - 1.0).abs() < 1e-12);
        assert!(e.abs() < 1e-12);

        // Facing east: forward is east, right is south
        let sample = InertialSample::new(1.0, 2.0, FRAC_PI_2);
        let (n, e) = sample.north_east_acceleration();
        assert!((n + 2.0).abs() < 1e-12);
        assert!((e - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_sample() {
        let sample = InertialSample::new(50.0, -50.0, 1.0).clamped(20.0);
        assert_eq!(sample.acceleration_x, 20.0);
        assert_eq!(sample.acceleration_y, -20.0);
        assert_eq!(sample.heading, 1.0);
    }

    #[test]
    fn test_fix_finite() {
        assert!(AbsoluteFix::new(10.0, 20.0, 5.0).is_finite());
        assert!(!AbsoluteFix::new(f64::NAN, 20.0, 5.0).is_finite());
        assert!(!AbsoluteFix::new(10.0, 20.0, f64::INFINITY).is_finite());
    }
}
