//! Sampling controller - owns tracking sessions and feeds the position filter.
//!
//! # States
//!
//! ```text
//! Idle ──start_tracking──► Tracking ──stop_tracking──► Idle
//! ```
//!
//! Entering `Tracking`:
//! 1. Request absolute positioning permission (`PermissionDenied` if refused)
//! 2. Subscribe to fixes at the mode's interval
//! 3. If inertial fusion is enabled, subscribe to acceleration and heading
//! 4. Spawn the 10 Hz prediction timer
//!
//! Leaving `Tracking` disposes every subscription handle the session created
//! and cancels the timer before returning. It is idempotent.
//!
//! # Lifecycle
//!
//! Backgrounding while tracking in `Active` stops the session; if
//! `resume_in_background` is set a new session starts in `Background` mode.
//! Foregrounding restores `Active` and restarts tracking if the caller still
//! wants it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::error::TrackingError;
use super::fusion::{FusionCore, FusionSettings};
use super::lifecycle::LifecycleEvent;
use super::source::{AbsolutePositionSource, InertialSource, NoInertialSensors, PermissionStatus};
use super::subscription::{AccelerationSink, FixSink, HeadingSink, Subscription};
use crate::filter::FilterTuning;
use crate::state::{AccuracyLevel, LocationEstimate, TrackingMode};

/// Default prediction timer period (10 Hz).
pub const DEFAULT_PREDICTION_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest prediction timer period accepted; shorter values are raised to it.
pub const MIN_PREDICTION_INTERVAL: Duration = Duration::from_millis(10);

/// Default minimum time since the last fix before prediction runs.
pub const DEFAULT_PREDICTION_GAP: Duration = Duration::from_millis(2_000);

/// Default clamp on inertial acceleration (about 2 g).
pub const DEFAULT_MAX_ACCELERATION: f64 = 19.6;

/// Events published by the controller.
#[derive(Debug, Clone)]
pub enum TrackingEvent {
    /// The filter produced a new estimate.
    Estimate {
        estimate: LocationEstimate,
        accuracy: AccuracyLevel,
    },

    /// Tracking failed or degraded.
    Error(TrackingError),
}

/// Configuration for the sampling controller.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Initial tracking mode.
    pub mode: TrackingMode,

    /// Subscribe to inertial sensors and use them for prediction.
    pub inertial_fusion: bool,

    /// Prediction timer period.
    pub prediction_interval: Duration,

    /// Minimum time since the last fix before prediction runs.
    pub prediction_gap: Duration,

    /// Keep tracking in `Background` mode when the host backgrounds.
    pub resume_in_background: bool,

    /// Clamp on inertial acceleration magnitude per axis (m/s²).
    pub max_acceleration: f64,

    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,

    /// Filter noise parameters.
    pub tuning: FilterTuning,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            mode: TrackingMode::default(),
            inertial_fusion: true,
            prediction_interval: DEFAULT_PREDICTION_INTERVAL,
            prediction_gap: DEFAULT_PREDICTION_GAP,
            resume_in_background: false,
            max_acceleration: DEFAULT_MAX_ACCELERATION,
            event_capacity: 64,
            tuning: FilterTuning::default(),
        }
    }
}

/// Resources owned by one tracking session.
struct TrackingSession {
    generation: u64,
    subscriptions: Vec<Subscription>,
    cancellation: CancellationToken,
    prediction: JoinHandle<()>,
}

impl TrackingSession {
    fn close(self) {
        for subscription in &self.subscriptions {
            subscription.dispose();
        }
        self.cancellation.cancel();
        self.prediction.abort();
    }
}

/// Drives sensor subscriptions and the position filter.
///
/// Generic over the host's sources, like the rest of the engine's adapters.
/// Use [`SamplingController::gps_only`] when there are no inertial sensors.
pub struct SamplingController<P, I = NoInertialSensors> {
    config: SamplingConfig,
    mode: TrackingMode,
    positioning: Arc<P>,
    inertial: Option<Arc<I>>,
    core: Arc<FusionCore>,
    session: Option<TrackingSession>,
    /// Set by `start_tracking`, cleared by `stop_tracking`.
    wants_tracking: bool,
    /// Active tracking was suspended by a background transition.
    suspended_active: bool,
}

impl<P: AbsolutePositionSource> SamplingController<P, NoInertialSensors> {
    /// Create a controller without inertial sensors.
    pub fn gps_only(config: SamplingConfig, positioning: Arc<P>) -> Self {
        Self::new(config, positioning, None)
    }
}

impl<P, I> SamplingController<P, I>
where
    P: AbsolutePositionSource,
    I: InertialSource,
{
    /// Create a new controller.
    pub fn new(config: SamplingConfig, positioning: Arc<P>, inertial: Option<Arc<I>>) -> Self {
        let core = Arc::new(FusionCore::new(
            config.tuning,
            FusionSettings {
                prediction_gap: config.prediction_gap,
                prediction_interval: prediction_period(config.prediction_interval),
                max_acceleration: config.max_acceleration,
            },
            config.event_capacity,
        ));
        Self {
            mode: config.mode,
            config,
            positioning,
            inertial,
            core,
            session: None,
            wants_tracking: false,
            suspended_active: false,
        }
    }

    /// Subscribe to estimates and errors.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.core.subscribe()
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    /// Most recent filter estimate, if any.
    pub fn current_estimate(&self) -> Option<LocationEstimate> {
        self.core.latest()
    }

    /// Returns true if the running session is fusing inertial samples.
    pub fn inertial_fusion_active(&self) -> bool {
        self.session.is_some() && self.core.inertial_enabled()
    }

    /// Number of live subscription handles held by the current session.
    pub fn active_subscriptions(&self) -> usize {
        self.session
            .as_ref()
            .map(|s| s.subscriptions.iter().filter(|h| h.is_active()).count())
            .unwrap_or(0)
    }

    /// Start tracking. A no-op if already tracking or in `Off` mode.
    pub async fn start_tracking(&mut self) -> Result<(), TrackingError> {
        if self.session.is_some() {
            tracing::debug!(mode = %self.mode, "Already tracking");
            return Ok(());
        }
        self.wants_tracking = true;
        if self.mode.is_off() {
            tracing::info!("Tracking mode is off, not starting");
            return Ok(());
        }

        let result = self.open_session().await;
        if matches!(result, Err(TrackingError::PermissionDenied)) {
            self.wants_tracking = false;
        }
        result
    }

    /// Stop tracking. Safe to call repeatedly.
    pub fn stop_tracking(&mut self) {
        self.wants_tracking = false;
        self.suspended_active = false;
        self.close_session();
    }

    /// Re-seed the filter at its current estimate with initial covariance.
    ///
    /// Returns false if no fix has been received yet.
    pub fn reset_filter(&self) -> bool {
        let reset = self.core.reset_to_latest(Instant::now());
        if reset {
            tracing::info!("Position filter reset to current estimate");
        }
        reset
    }

    /// Change the tracking mode, re-subscribing at the new intervals.
    ///
    /// Switching to `Off` stops any running session; switching away from
    /// `Off` resumes tracking if it was requested earlier.
    pub async fn set_mode(&mut self, mode: TrackingMode) -> Result<(), TrackingError> {
        if mode == self.mode {
            return Ok(());
        }
        tracing::info!(from = %self.mode, to = %mode, "Tracking mode changed");
        self.mode = mode;
        self.suspended_active = false;

        if !self.wants_tracking {
            return Ok(());
        }
        self.close_session();
        if mode.is_off() {
            return Ok(());
        }
        self.open_session().await
    }

    /// React to a host lifecycle transition.
    pub async fn on_lifecycle(&mut self, event: LifecycleEvent) -> Result<(), TrackingError> {
        tracing::debug!(%event, tracking = self.is_tracking(), "Lifecycle event");
        match event {
            LifecycleEvent::Background => {
                if self.session.is_none() || self.mode != TrackingMode::Active {
                    return Ok(());
                }
                self.close_session();
                self.suspended_active = true;
                if self.config.resume_in_background {
                    tracing::info!("Backgrounded, continuing in background mode");
                    self.mode = TrackingMode::Background;
                    self.open_session().await
                } else {
                    tracing::info!("Backgrounded, tracking suspended");
                    Ok(())
                }
            }
            LifecycleEvent::Foreground => {
                if self.suspended_active {
                    self.suspended_active = false;
                    self.mode = TrackingMode::Active;
                    self.close_session();
                    tracing::info!("Foregrounded, resuming active tracking");
                    return self.open_session().await;
                }
                if self.wants_tracking && self.session.is_none() && !self.mode.is_off() {
                    tracing::info!(mode = %self.mode, "Foregrounded, resuming tracking");
                    return self.open_session().await;
                }
                Ok(())
            }
        }
    }

    /// Consume lifecycle events until cancelled or the sender goes away.
    pub async fn run_lifecycle(
        &mut self,
        mut events: broadcast::Receiver<LifecycleEvent>,
        cancellation: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    tracing::debug!("Lifecycle listener cancelled");
                    break;
                }

                result = events.recv() => {
                    match result {
                        Ok(event) => {
                            if let Err(e) = self.on_lifecycle(event).await {
                                tracing::warn!(error = %e, %event, "Lifecycle transition failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Lifecycle channel closed");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Lifecycle listener lagged");
                        }
                    }
                }
            }
        }
    }

    async fn open_session(&mut self) -> Result<(), TrackingError> {
        if self.positioning.request_permission().await == PermissionStatus::Denied {
            tracing::warn!("Location permission denied");
            self.core.emit(TrackingEvent::Error(TrackingError::PermissionDenied));
            return Err(TrackingError::PermissionDenied);
        }

        let mode = self.mode;
        let want_inertial = self.config.inertial_fusion && self.inertial.is_some();
        let generation = self.core.begin_session(want_inertial);

        let fixes = match self.positioning.subscribe(
            mode.absolute_fix_interval(),
            FixSink::new(Arc::clone(&self.core), generation),
        ) {
            Ok(subscription) => subscription,
            Err(e) => {
                self.core.end_session();
                let error = TrackingError::SubscriptionFailed(e.to_string());
                tracing::warn!(error = %error, "Tracking not started");
                self.core.emit(TrackingEvent::Error(error.clone()));
                return Err(error);
            }
        };
        let mut subscriptions = vec![fixes];

        if want_inertial {
            match self.subscribe_inertial(mode, generation) {
                Ok(mut handles) => subscriptions.append(&mut handles),
                Err(error) => {
                    tracing::warn!(error = %error, "Inertial fusion disabled, using absolute fixes only");
                    self.core.disable_inertial();
                }
            }
        } else if self.config.inertial_fusion {
            tracing::debug!("No inertial source, using absolute fixes only");
        }

        let cancellation = CancellationToken::new();
        let prediction = spawn_prediction_timer(
            Arc::clone(&self.core),
            generation,
            prediction_period(self.config.prediction_interval),
            cancellation.clone(),
        );

        tracing::info!(
            mode = %mode,
            generation,
            fix_interval_ms = mode.absolute_fix_interval().as_millis() as u64,
            inertial = self.core.inertial_enabled(),
            "Tracking started"
        );

        self.session = Some(TrackingSession {
            generation,
            subscriptions,
            cancellation,
            prediction,
        });
        Ok(())
    }

    /// Subscribe to both inertial streams; all or nothing.
    fn subscribe_inertial(
        &self,
        mode: TrackingMode,
        generation: u64,
    ) -> Result<Vec<Subscription>, TrackingError> {
        let Some(inertial) = self.inertial.as_ref() else {
            return Ok(Vec::new());
        };
        let interval = mode.inertial_interval();

        let acceleration = inertial
            .subscribe_acceleration(
                interval,
                AccelerationSink::new(Arc::clone(&self.core), generation),
            )
            .map_err(|e| TrackingError::SensorUnavailable {
                sensor: "accelerometer",
                reason: e.to_string(),
            })?;

        // Dropping `acceleration` on failure disposes it
        let heading = inertial
            .subscribe_heading(interval, HeadingSink::new(Arc::clone(&self.core), generation))
            .map_err(|e| TrackingError::SensorUnavailable {
                sensor: "magnetometer",
                reason: e.to_string(),
            })?;

        Ok(vec![acceleration, heading])
    }

    fn close_session(&mut self) {
        let Some(session) = self.session.take() else {
            tracing::trace!("No tracking session to stop");
            return;
        };
        self.core.end_session();
        let generation = session.generation;
        session.close();
        tracing::info!(generation, "Tracking stopped");
    }
}

impl<P, I> Drop for SamplingController<P, I> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.core.end_session();
            session.close();
        }
    }
}

/// Timer period for a configured prediction interval.
fn prediction_period(configured: Duration) -> Duration {
    if configured < MIN_PREDICTION_INTERVAL {
        tracing::warn!(
            configured_ms = configured.as_millis() as u64,
            min_ms = MIN_PREDICTION_INTERVAL.as_millis() as u64,
            "Prediction interval too short, using minimum"
        );
        return MIN_PREDICTION_INTERVAL;
    }
    configured
}

/// Spawn the fixed-rate prediction timer for one session.
fn spawn_prediction_timer(
    core: Arc<FusionCore>,
    generation: u64,
    period: Duration,
    cancellation: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = ticker.tick() => {
                    core.on_prediction_tick(generation, Instant::now());
                }
            }
        }
        tracing::trace!(generation, "Prediction timer stopped");
    })
}
