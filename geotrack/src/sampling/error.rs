//! Error types for sampling and sensor sources.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the sampling controller.
///
/// Only [`TrackingError::PermissionDenied`] and
/// [`TrackingError::SubscriptionFailed`] stop tracking from starting; sensor
/// problems degrade fusion to GPS-only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    /// Absolute positioning permission was refused.
    #[error("Location permission denied")]
    PermissionDenied,

    /// An inertial sensor is missing or failing.
    #[error("Sensor {sensor} unavailable: {reason}")]
    SensorUnavailable {
        sensor: &'static str,
        reason: String,
    },

    /// The absolute positioning subscription could not be created.
    #[error("Failed to subscribe to absolute positioning: {0}")]
    SubscriptionFailed(String),
}

/// Errors reported by sensor and positioning sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source is not present or not responding.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// The source cannot sample at the requested interval.
    #[error("Unsupported sampling interval: {0:?}")]
    UnsupportedInterval(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TrackingError::PermissionDenied.to_string(),
            "Location permission denied"
        );
        let err = TrackingError::SensorUnavailable {
            sensor: "accelerometer",
            reason: "no hardware".to_string(),
        };
        assert_eq!(err.to_string(), "Sensor accelerometer unavailable: no hardware");
        assert_eq!(
            SourceError::UnsupportedInterval(Duration::from_millis(5)).to_string(),
            "Unsupported sampling interval: 5ms"
        );
    }
}
