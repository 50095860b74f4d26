//! Sampling - sensor subscriptions, tracking sessions and fusion timing.
//!
//! # Architecture
//!
//! ```text
//! AbsolutePositionSource ──FixSink──────────┐
//! InertialSource ──AccelerationSink─────────┤
//!               └──HeadingSink──────────────┼──► FusionCore ──► broadcast<TrackingEvent>
//! prediction timer (10 Hz) ─────────────────┘     (PositionFilter)
//! ```
//!
//! [`SamplingController`] owns the session: it requests permission, creates
//! the subscriptions, spawns the prediction timer and disposes all of them on
//! stop. Every path into the filter goes through one mutex.

mod controller;
mod error;
mod fusion;
mod lifecycle;
mod source;
mod subscription;

pub use controller::{
    SamplingConfig, SamplingController, TrackingEvent, DEFAULT_MAX_ACCELERATION,
    DEFAULT_PREDICTION_GAP, DEFAULT_PREDICTION_INTERVAL, MIN_PREDICTION_INTERVAL,
};
pub use error::{SourceError, TrackingError};
pub use lifecycle::LifecycleEvent;
pub use source::{AbsolutePositionSource, InertialSource, NoInertialSensors, PermissionStatus};
pub use subscription::{AccelerationSink, FixSink, HeadingSink, Subscription};
