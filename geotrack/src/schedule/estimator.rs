//! Schedule Estimator - position from the timetable alone.
//!
//! A pure function of `(RouteDefinition, time of day)`:
//!
//! 1. Pick the morning or evening timetable (noon cutover).
//! 2. Order waypoints by scheduled time.
//! 3. Outside `[first - departure_grace, last + completion_grace]` the trip is
//!    not operating.
//! 4. Otherwise interpolate linearly between the bracketing waypoints.
//!
//! Estimates carry a fixed confidence below anything a live fix reports.
//! Trips that cross midnight are not supported.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;

use super::route::{RouteDefinition, ServicePeriod, Waypoint};
use crate::time::{minutes_of_day, WallClock};

/// Configuration for the schedule estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleConfig {
    /// How long before the first departure the trip counts as operating.
    pub departure_grace: Duration,

    /// How long after the last arrival the trip counts as operating.
    pub completion_grace: Duration,

    /// Confidence reported for every operating estimate.
    pub confidence: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            departure_grace: Duration::from_secs(10 * 60),
            completion_grace: Duration::from_secs(30 * 60),
            confidence: ScheduleEstimator::DEFAULT_CONFIDENCE,
        }
    }
}

/// Where the vehicle is in its trip according to the timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripPhase {
    /// Route has fewer than two waypoints.
    NotEstimable,
    /// Earlier than the departure grace window.
    NotDeparted,
    /// Inside the departure grace window, before the first waypoint.
    Boarding,
    /// Between the first and last waypoints.
    EnRoute,
    /// Past the last waypoint, inside the completion grace window.
    Arriving,
    /// Past the completion grace window.
    Completed,
}

impl TripPhase {
    /// Returns true for phases that report a position.
    pub fn is_operating(&self) -> bool {
        matches!(self, Self::Boarding | Self::EnRoute | Self::Arriving)
    }
}

impl std::fmt::Display for TripPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotEstimable => write!(f, "NotEstimable"),
            Self::NotDeparted => write!(f, "NotDeparted"),
            Self::Boarding => write!(f, "Boarding"),
            Self::EnRoute => write!(f, "EnRoute"),
            Self::Arriving => write!(f, "Arriving"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Timetable-derived position estimate. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEstimate {
    pub is_operating: bool,

    /// `(latitude, longitude)` when operating.
    pub position: Option<(f64, f64)>,

    pub previous_waypoint_id: Option<String>,
    pub next_waypoint_id: Option<String>,

    /// Progress between previous and next waypoint, in `[0, 1]`.
    pub progress_fraction: f64,

    /// Minutes until the next waypoint (never negative).
    pub eta_minutes: f64,

    /// Zero when not operating.
    pub confidence: f64,

    pub phase: TripPhase,
}

impl ScheduleEstimate {
    fn idle(phase: TripPhase) -> Self {
        Self {
            is_operating: false,
            position: None,
            previous_waypoint_id: None,
            next_waypoint_id: None,
            progress_fraction: 0.0,
            eta_minutes: 0.0,
            confidence: 0.0,
            phase,
        }
    }
}

/// Fraction of the way from `previous` to `next` at `now` (all in minutes).
///
/// Zero-length segments count as complete.
fn segment_progress(previous: f64, next: f64, now: f64) -> f64 {
    let span = next - previous;
    if span <= 0.0 {
        return 1.0;
    }
    ((now - previous) / span).clamp(0.0, 1.0)
}

fn interpolate(from: &Waypoint, to: &Waypoint, fraction: f64) -> (f64, f64) {
    (
        from.latitude + (to.latitude - from.latitude) * fraction,
        from.longitude + (to.longitude - from.longitude) * fraction,
    )
}

/// Estimate a position along `route` at local time `now`.
pub fn estimate_position(
    route: &RouteDefinition,
    now: NaiveTime,
    config: &ScheduleConfig,
) -> ScheduleEstimate {
    if !route.is_estimable() {
        return ScheduleEstimate::idle(TripPhase::NotEstimable);
    }

    let period = ServicePeriod::for_time(now);
    let ordered = route.ordered_for(period);
    let now_min = minutes_of_day(now);
    let time_of = |w: &Waypoint| w.scheduled_minutes(period) as f64;

    let (first, last) = match (ordered.first(), ordered.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return ScheduleEstimate::idle(TripPhase::NotEstimable),
    };
    let first_min = time_of(first);
    let last_min = time_of(last);
    let departure_grace = config.departure_grace.as_secs_f64() / 60.0;
    let completion_grace = config.completion_grace.as_secs_f64() / 60.0;

    if now_min < first_min - departure_grace {
        return ScheduleEstimate {
            next_waypoint_id: Some(first.id.clone()),
            eta_minutes: first_min - now_min,
            ..ScheduleEstimate::idle(TripPhase::NotDeparted)
        };
    }
    if now_min > last_min + completion_grace {
        return ScheduleEstimate {
            previous_waypoint_id: Some(last.id.clone()),
            progress_fraction: 1.0,
            ..ScheduleEstimate::idle(TripPhase::Completed)
        };
    }

    let operating = |phase: TripPhase,
                     position: (f64, f64),
                     previous: Option<&Waypoint>,
                     next: Option<&Waypoint>,
                     progress: f64,
                     eta: f64| {
        ScheduleEstimate {
            is_operating: true,
            position: Some(position),
            previous_waypoint_id: previous.map(|w| w.id.clone()),
            next_waypoint_id: next.map(|w| w.id.clone()),
            progress_fraction: progress,
            eta_minutes: eta.max(0.0),
            confidence: config.confidence,
            phase,
        }
    };

    if now_min < first_min {
        return operating(
            TripPhase::Boarding,
            (first.latitude, first.longitude),
            None,
            Some(first),
            0.0,
            first_min - now_min,
        );
    }
    if now_min >= last_min {
        return operating(
            TripPhase::Arriving,
            (last.latitude, last.longitude),
            Some(last),
            None,
            1.0,
            0.0,
        );
    }

    // first_min <= now < last_min, so a later waypoint exists and index >= 1.
    let next_index = ordered
        .iter()
        .position(|w| time_of(*w) > now_min)
        .unwrap_or(ordered.len() - 1)
        .max(1);
    let previous = ordered[next_index - 1];
    let next = ordered[next_index];
    let progress = segment_progress(time_of(previous), time_of(next), now_min);

    operating(
        TripPhase::EnRoute,
        interpolate(previous, next, progress),
        Some(previous),
        Some(next),
        progress,
        time_of(next) - now_min,
    )
}

/// Schedule estimator owning its route.
///
/// Explicitly constructed and injected; the route is shared read-only and can
/// only be swapped wholesale.
#[derive(Debug, Clone)]
pub struct ScheduleEstimator {
    route: Arc<RouteDefinition>,
    config: ScheduleConfig,
}

impl ScheduleEstimator {
    /// Confidence of schedule-only estimates.
    pub const DEFAULT_CONFIDENCE: f64 = 0.6;

    pub fn new(route: RouteDefinition) -> Self {
        Self::with_config(route, ScheduleConfig::default())
    }

    pub fn with_config(route: RouteDefinition, config: ScheduleConfig) -> Self {
        if !route.is_estimable() {
            tracing::warn!(
                route = %route.name,
                waypoints = route.len(),
                "Route has fewer than two waypoints, schedule estimates unavailable"
            );
        }
        Self {
            route: Arc::new(route),
            config,
        }
    }

    pub fn route(&self) -> &RouteDefinition {
        &self.route
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Replace the whole route.
    pub fn replace_route(&mut self, route: RouteDefinition) {
        tracing::info!(
            route = %route.name,
            waypoints = route.len(),
            "Replacing route definition"
        );
        self.route = Arc::new(route);
    }

    /// Estimate at a given local time of day.
    pub fn estimate_at(&self, now: NaiveTime) -> ScheduleEstimate {
        estimate_position(&self.route, now, &self.config)
    }

    /// Estimate at the clock's current time of day.
    pub fn estimate_now(&self, clock: &dyn WallClock) -> ScheduleEstimate {
        self.estimate_at(clock.time_of_day())
    }
}
