//! Fusion core - the filter plus the bookkeeping shared with source callbacks.
//!
//! Sources, the prediction timer and the controller all reach the filter
//! through this type. A single mutex serializes every predict/update so no two
//! filter operations interleave, whatever runtime flavour drives the callbacks.
//!
//! Each tracking session gets a generation number. Callbacks carry the
//! generation they were registered under and are dropped once that session
//! has ended, so a callback racing with `stop_tracking` is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use super::TrackingEvent;
use crate::filter::{FilterTuning, PositionFilter, UpdateOutcome};
use crate::state::{AbsoluteFix, InertialSample, LocationEstimate};

/// Generation value meaning "no session".
const NO_SESSION: u64 = 0;

/// Fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FusionSettings {
    /// Minimum time since the last fix before prediction runs.
    pub prediction_gap: Duration,

    /// Prediction timer period; an inertial sample covers at most this span.
    pub prediction_interval: Duration,

    /// Clamp applied to inertial acceleration (m/s²).
    pub max_acceleration: f64,
}

#[derive(Debug)]
struct FusionState {
    filter: PositionFilter,
    latest: Option<LocationEstimate>,
    /// Last fix of the current session.
    last_fix_at: Option<Instant>,
    /// Time the filter state refers to (last fix, reset or predict).
    last_advance_at: Option<Instant>,
    acceleration: Option<(f64, f64)>,
    heading: Option<f64>,
    inertial_enabled: bool,
    fixes_received: u64,
    predictions_run: u64,
}

/// Shared filter and session bookkeeping.
#[derive(Debug)]
pub(crate) struct FusionCore {
    state: Mutex<FusionState>,
    session: AtomicU64,
    next_session: AtomicU64,
    events: broadcast::Sender<TrackingEvent>,
    settings: FusionSettings,
}

impl FusionCore {
    pub fn new(tuning: FilterTuning, settings: FusionSettings, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(FusionState {
                filter: PositionFilter::with_tuning(tuning),
                latest: None,
                last_fix_at: None,
                last_advance_at: None,
                acceleration: None,
                heading: None,
                inertial_enabled: false,
                fixes_received: 0,
                predictions_run: 0,
            }),
            session: AtomicU64::new(NO_SESSION),
            next_session: AtomicU64::new(NO_SESSION),
            events,
            settings,
        }
    }

    /// Open a new session and return its generation.
    pub fn begin_session(&self, inertial_enabled: bool) -> u64 {
        let generation = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().unwrap();
            state.inertial_enabled = inertial_enabled;
            // No dead reckoning across the stopped period
            state.last_fix_at = None;
            state.acceleration = None;
            state.heading = None;
        }
        self.session.store(generation, Ordering::SeqCst);
        generation
    }

    /// Close the current session; later callbacks are ignored.
    pub fn end_session(&self) {
        self.session.store(NO_SESSION, Ordering::SeqCst);
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation != NO_SESSION && self.session.load(Ordering::SeqCst) == generation
    }

    /// Stop using inertial samples for the rest of this session.
    pub fn disable_inertial(&self) {
        let mut state = self.state.lock().unwrap();
        state.inertial_enabled = false;
        state.acceleration = None;
        state.heading = None;
    }

    pub fn inertial_enabled(&self) -> bool {
        self.state.lock().unwrap().inertial_enabled
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: TrackingEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    pub fn latest(&self) -> Option<LocationEstimate> {
        self.state.lock().unwrap().latest
    }

    /// (fixes received, predictions run) since creation.
    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock().unwrap();
        (state.fixes_received, state.predictions_run)
    }

    /// Apply an absolute fix. Returns true if the filter changed.
    ///
    /// The first fix after filter creation seeds the filter; later fixes
    /// propagate the state to `now` and then update it.
    pub fn on_fix(&self, generation: u64, fix: AbsoluteFix, now: Instant) -> bool {
        if !self.is_current(generation) {
            tracing::trace!(generation, "Dropping fix from ended session");
            return false;
        }
        if !fix.is_finite() {
            tracing::warn!(?fix, "Dropping non-finite absolute fix");
            return false;
        }

        let mut state = self.state.lock().unwrap();
        if state.filter.is_initialized() {
            // Bring the state up to the fix time so velocity stays observable
            if let Some(since) = state.last_advance_at {
                let dt = now.saturating_duration_since(since).as_secs_f64();
                state.filter.predict(dt, None);
            }
            if state
                .filter
                .update(fix.latitude, fix.longitude, fix.horizontal_error)
                == UpdateOutcome::DegenerateInnovation
            {
                tracing::debug!("Fix applied with identity innovation fallback");
            }
        } else {
            tracing::info!(
                lat = fix.latitude,
                lon = fix.longitude,
                "First absolute fix, seeding filter"
            );
            state.filter.reset(fix.latitude, fix.longitude);
        }
        state.last_fix_at = Some(now);
        state.last_advance_at = Some(now);
        state.fixes_received += 1;

        self.publish(&mut state);
        true
    }

    /// Buffer the latest device-frame acceleration.
    pub fn on_acceleration(&self, generation: u64, x: f64, y: f64) {
        if !self.is_current(generation) || !x.is_finite() || !y.is_finite() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.inertial_enabled {
            state.acceleration = Some((x, y));
        }
    }

    /// Buffer the latest magnetometer-derived heading (radians).
    pub fn on_heading(&self, generation: u64, heading: f64) {
        if !self.is_current(generation) || !heading.is_finite() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.inertial_enabled {
            state.heading = Some(heading);
        }
    }

    /// One prediction timer tick. Returns true if the filter was advanced.
    ///
    /// Prediction only runs once more than `prediction_gap` has elapsed since
    /// the session's last fix, so it never competes with a fresh measurement
    /// and never runs before the session has seen a fix. A buffered
    /// acceleration is consumed by the tick whether or not it is used, and is
    /// integrated over at most one timer period.
    pub fn on_prediction_tick(&self, generation: u64, now: Instant) -> bool {
        if !self.is_current(generation) {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        let acceleration = state.acceleration.take();

        let Some(last_fix) = state.last_fix_at else {
            return false;
        };
        if now.saturating_duration_since(last_fix) <= self.settings.prediction_gap {
            return false;
        }

        let since = state.last_advance_at.unwrap_or(last_fix);
        let dt = now.saturating_duration_since(since).as_secs_f64();
        if dt <= 0.0 {
            return false;
        }

        let sample = match (state.inertial_enabled, acceleration, state.heading) {
            (true, Some((x, y)), Some(heading)) => {
                Some(InertialSample::new(x, y, heading).clamped(self.settings.max_acceleration))
            }
            _ => None,
        };

        let inertial_dt = self.settings.prediction_interval.as_secs_f64().min(dt);
        match sample {
            Some(sample) if dt > inertial_dt => {
                state.filter.predict(dt - inertial_dt, None);
                state.filter.predict(inertial_dt, Some(sample));
            }
            _ => state.filter.predict(dt, sample),
        }
        state.last_advance_at = Some(now);
        state.predictions_run += 1;
        tracing::trace!(dt, inertial = sample.is_some(), "Prediction step");

        self.publish(&mut state);
        true
    }

    /// Re-seed the filter at its current estimate. Returns false if uninitialized.
    pub fn reset_to_latest(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(estimate) = state.filter.estimate() else {
            return false;
        };
        state.filter.reset(estimate.latitude, estimate.longitude);
        state.last_advance_at = Some(now);
        self.publish(&mut state);
        true
    }

    fn publish(&self, state: &mut FusionState) {
        if let Some(estimate) = state.filter.estimate() {
            state.latest = Some(estimate);
            self.emit(TrackingEvent::Estimate {
                estimate,
                accuracy: estimate.accuracy(),
            });
        }
    }
}
