//! Resolver data model and the pure status rule.
//!
//! [`ResolverState`] holds the latest broadcast and schedule estimate;
//! [`ResolverState::resolve`] turns them into a [`LocationUpdate`] for a given
//! instant. Nothing in here touches a clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::schedule::ScheduleEstimate;

/// Confidence for a live position with a small reported error.
pub const LIVE_HIGH_CONFIDENCE: f64 = 0.9;

/// Confidence for a live position with a large reported error.
pub const LIVE_LOW_CONFIDENCE: f64 = 0.7;

/// Reported error below which a live position gets high confidence (meters).
pub const LIVE_HIGH_CONFIDENCE_ERROR: f64 = 50.0;

/// Position payload published by the tracked device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPosition {
    pub latitude: f64,
    pub longitude: f64,

    /// Reported horizontal error in meters.
    pub horizontal_error: f64,

    /// When the publisher produced the payload.
    pub updated_at: DateTime<Utc>,
}

impl BroadcastPosition {
    pub fn new(latitude: f64, longitude: f64, horizontal_error: f64, updated_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            horizontal_error,
            updated_at,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Confidence derived from the publisher's own error estimate.
    pub fn confidence(&self) -> f64 {
        if self.horizontal_error.is_finite() && self.horizontal_error < LIVE_HIGH_CONFIDENCE_ERROR {
            LIVE_HIGH_CONFIDENCE
        } else {
            LIVE_LOW_CONFIDENCE
        }
    }
}

/// Event delivered by a broadcast channel subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    /// A new position from the tracked device.
    Position(BroadcastPosition),

    /// The channel has no position for this vehicle.
    Empty,

    /// The channel reported an error.
    Error(String),
}

/// Overall resolver status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverStatus {
    /// A broadcast position arrived within the staleness threshold.
    Live,

    /// No fresh broadcast, but the timetable says the vehicle is running.
    Estimated,

    /// Neither source has an opinion.
    #[default]
    Offline,
}

impl std::fmt::Display for ResolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Estimated => write!(f, "estimated"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Where a best location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Live,
    Estimated,
}

/// Unified best-available location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,

    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Best location together with the status that produced it.
///
/// `best` is `None` when the status is [`ResolverStatus::Offline`]; that means
/// "no opinion", never a position at (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocationUpdate {
    pub best: Option<BestLocation>,
    pub status: ResolverStatus,
}

/// Last broadcast and when it was received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivePosition {
    pub position: BroadcastPosition,
    pub received_at: Instant,

    /// The payload was already older than the staleness threshold on arrival.
    pub stale_on_arrival: bool,
}

impl LivePosition {
    pub fn new(position: BroadcastPosition, received_at: Instant) -> Self {
        Self {
            position,
            received_at,
            stale_on_arrival: false,
        }
    }

    /// Instant at which this position stops counting as live.
    pub fn expires_at(&self, threshold: Duration) -> Option<Instant> {
        (!self.stale_on_arrival).then(|| self.received_at + threshold)
    }
}

/// Inputs to the status rule.
#[derive(Debug, Clone, Default)]
pub struct ResolverState {
    pub live: Option<LivePosition>,
    pub schedule: Option<ScheduleEstimate>,
}

impl ResolverState {
    /// Returns true if the live position is younger than `threshold` at `now`.
    pub fn is_live(&self, now: Instant, threshold: Duration) -> bool {
        self.live
            .and_then(|live| live.expires_at(threshold))
            .is_some_and(|expires_at| now < expires_at)
    }

    /// Instant at which the live position goes stale, if that is still ahead.
    pub fn live_deadline(&self, now: Instant, threshold: Duration) -> Option<Instant> {
        let deadline = self.live?.expires_at(threshold)?;
        (deadline > now).then_some(deadline)
    }

    /// Apply the status rule at `now`.
    pub fn resolve(&self, now: Instant, threshold: Duration) -> LocationUpdate {
        if let Some(live) = self.live.filter(|_| self.is_live(now, threshold)) {
            return LocationUpdate {
                best: Some(BestLocation {
                    latitude: live.position.latitude,
                    longitude: live.position.longitude,
                    source: LocationSource::Live,
                    confidence: live.position.confidence(),
                }),
                status: ResolverStatus::Live,
            };
        }

        match &self.schedule {
            Some(schedule) if schedule.is_operating => LocationUpdate {
                best: schedule.position.map(|(latitude, longitude)| BestLocation {
                    latitude,
                    longitude,
                    source: LocationSource::Estimated,
                    confidence: schedule.confidence,
                }),
                status: ResolverStatus::Estimated,
            },
            _ => LocationUpdate::default(),
        }
    }
}
