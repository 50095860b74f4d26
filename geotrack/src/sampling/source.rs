//! Sensor and positioning source traits.
//!
//! The engine never talks to hardware directly. Hosts implement
//! [`AbsolutePositionSource`] (GNSS or platform location service) and
//! optionally [`InertialSource`] (accelerometer and magnetometer), and the
//! [`SamplingController`](super::SamplingController) subscribes at the
//! intervals of the current [`TrackingMode`](crate::state::TrackingMode).

use std::future::Future;
use std::time::Duration;

use super::error::SourceError;
use super::subscription::{AccelerationSink, FixSink, HeadingSink, Subscription};

/// Outcome of a location permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Absolute position provider.
pub trait AbsolutePositionSource: Send + Sync + 'static {
    /// Ask the host for location permission.
    fn request_permission(&self) -> impl Future<Output = PermissionStatus> + Send;

    /// Start delivering fixes into `sink` roughly every `interval`.
    ///
    /// The source must stop delivering once the returned subscription's
    /// token is cancelled.
    fn subscribe(&self, interval: Duration, sink: FixSink) -> Result<Subscription, SourceError>;
}

/// Inertial sensor provider.
pub trait InertialSource: Send + Sync + 'static {
    /// Device-frame linear acceleration.
    fn subscribe_acceleration(
        &self,
        interval: Duration,
        sink: AccelerationSink,
    ) -> Result<Subscription, SourceError>;

    /// Magnetometer heading.
    fn subscribe_heading(
        &self,
        interval: Duration,
        sink: HeadingSink,
    ) -> Result<Subscription, SourceError>;
}

/// Inertial source for hosts without motion sensors.
///
/// Every subscription fails, which leaves the controller in GPS-only mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInertialSensors;

impl InertialSource for NoInertialSensors {
    fn subscribe_acceleration(
        &self,
        _interval: Duration,
        _sink: AccelerationSink,
    ) -> Result<Subscription, SourceError> {
        Err(SourceError::Unavailable("no accelerometer".to_string()))
    }

    fn subscribe_heading(
        &self,
        _interval: Duration,
        _sink: HeadingSink,
    ) -> Result<Subscription, SourceError> {
        Err(SourceError::Unavailable("no magnetometer".to_string()))
    }
}
