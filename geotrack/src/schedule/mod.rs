//! Schedule-based fallback estimation.
//!
//! - [`route`] - `RouteDefinition` / `Waypoint` and JSON loading
//! - [`estimator`] - `ScheduleEstimator`: interpolation along the timetable

mod estimator;
mod route;

pub use estimator::{
    estimate_position, ScheduleConfig, ScheduleEstimate, ScheduleEstimator, TripPhase,
};
pub use route::{RouteDefinition, RouteError, ServicePeriod, Waypoint, MINUTES_PER_DAY};
