//! Position filter: linear Kalman fusion of absolute fixes and inertial motion.
//!
//! # Components
//!
//! - [`state`] - `FilterState` (position/velocity vector, covariance, local frame)
//! - [`kalman`] - `PositionFilter` with `reset`/`predict`/`update`/`estimate`
//!
//! The filter is deliberately linear: constant velocity between fixes, with
//! inertial acceleration folded into velocity when available. No gyroscope bias
//! or magnetic declination is modelled.

mod kalman;
mod state;

pub use kalman::{FilterTuning, PositionFilter, UpdateOutcome};
pub use state::{FilterState, METERS_PER_DEGREE};
