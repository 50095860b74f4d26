//! Best location resolver - merges the live broadcast with the schedule.
//!
//! The resolver owns a background task that:
//! - receives broadcast events for one vehicle
//! - refreshes the schedule estimate on a fixed interval
//! - wakes exactly when the live position goes stale
//!
//! and publishes a [`LocationUpdate`] whenever the best location or status
//! changes. Queries are answered from the shared state at the caller's
//! instant, so they are exact regardless of when the task last ran.
//!
//! # Usage
//!
//! ```ignore
//! let resolver = BestLocationResolver::start(
//!     ResolverConfig::new("bus-4"),
//!     Arc::new(channel),
//!     ScheduleEstimator::new(route),
//!     Arc::new(SystemClock),
//! );
//! let location = resolver.provider();
//! let mut updates = location.subscribe();
//! ```

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::channel::BroadcastChannel;
use super::model::{
    BestLocation, BroadcastEvent, BroadcastPosition, LivePosition, LocationUpdate, ResolverState,
    ResolverStatus,
};
use super::provider::SharedBestLocation;
use crate::schedule::{RouteDefinition, ScheduleEstimate, ScheduleEstimator};
use crate::time::{age_since, WallClock};

/// Default staleness threshold for the live broadcast.
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(60);

/// Default schedule refresh interval.
pub const DEFAULT_SCHEDULE_REFRESH: Duration = Duration::from_secs(30);

/// Shortest schedule refresh interval accepted; shorter values are raised to it.
pub const MIN_SCHEDULE_REFRESH: Duration = Duration::from_secs(1);

/// Configuration for the resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Vehicle whose broadcast to follow.
    pub vehicle_id: String,

    /// Age after which a broadcast no longer counts as live.
    pub staleness_threshold: Duration,

    /// How often to recompute the schedule estimate.
    pub schedule_refresh: Duration,

    /// Capacity of the update broadcast channel.
    pub update_capacity: usize,
}

impl ResolverConfig {
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            ..Default::default()
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            vehicle_id: String::new(),
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            schedule_refresh: DEFAULT_SCHEDULE_REFRESH,
            update_capacity: 16,
        }
    }
}

/// State shared between the resolver task and its providers.
pub(crate) struct ResolverShared {
    state: RwLock<ResolverState>,
    estimator: RwLock<ScheduleEstimator>,
    clock: Arc<dyn WallClock>,
    updates: broadcast::Sender<LocationUpdate>,
    last_published: RwLock<LocationUpdate>,
    staleness_threshold: Duration,
}

impl ResolverShared {
    fn new(
        estimator: ScheduleEstimator,
        clock: Arc<dyn WallClock>,
        staleness_threshold: Duration,
        update_capacity: usize,
    ) -> Self {
        let (updates, _) = broadcast::channel(update_capacity.max(1));
        Self {
            state: RwLock::new(ResolverState::default()),
            estimator: RwLock::new(estimator),
            clock,
            updates,
            last_published: RwLock::new(LocationUpdate::default()),
            staleness_threshold,
        }
    }

    /// Record a broadcast received at `now`.
    ///
    /// A payload already older than the staleness threshold on arrival is
    /// kept for reference but never counts as live.
    pub fn receive_broadcast(&self, position: BroadcastPosition, now: Instant) {
        if !position.is_finite() {
            tracing::warn!(?position, "Ignoring non-finite broadcast position");
            return;
        }

        let age = age_since(position.updated_at, self.clock.now_utc());
        let mut live = LivePosition::new(position, now);
        if age >= self.staleness_threshold {
            tracing::debug!(
                age_secs = age.as_secs(),
                threshold_secs = self.staleness_threshold.as_secs(),
                "Broadcast position already stale on arrival"
            );
            live.stale_on_arrival = true;
        }

        self.state.write().unwrap().live = Some(live);
        tracing::trace!(
            lat = position.latitude,
            lon = position.longitude,
            error_m = position.horizontal_error,
            "Broadcast position received"
        );
        self.publish_if_changed(now);
    }

    /// Forget the live position (channel empty, failed or closed).
    pub fn clear_live(&self, now: Instant) {
        let had_live = self.state.write().unwrap().live.take().is_some();
        if had_live {
            tracing::debug!("Live position cleared");
        }
        self.publish_if_changed(now);
    }

    /// Recompute the schedule estimate from the wall clock.
    pub fn refresh_schedule(&self, now: Instant) -> ScheduleEstimate {
        let estimate = {
            let estimator = self.estimator.read().unwrap();
            let estimate = estimator.estimate_now(self.clock.as_ref());
            self.state.write().unwrap().schedule = Some(estimate.clone());
            estimate
        };
        self.publish_if_changed(now);
        estimate
    }

    pub fn replace_route(&self, route: RouteDefinition, now: Instant) {
        {
            // Swap and re-estimate under one lock so a concurrent refresh
            // cannot store an estimate from the old route afterwards
            let mut estimator = self.estimator.write().unwrap();
            estimator.replace_route(route);
            let estimate = estimator.estimate_now(self.clock.as_ref());
            self.state.write().unwrap().schedule = Some(estimate);
        }
        self.publish_if_changed(now);
    }

    /// Resolve the current update at `now` without publishing.
    pub fn current(&self, now: Instant) -> LocationUpdate {
        self.state
            .read()
            .unwrap()
            .resolve(now, self.staleness_threshold)
    }

    pub fn schedule_estimate(&self) -> Option<ScheduleEstimate> {
        self.state.read().unwrap().schedule.clone()
    }

    pub fn live_position(&self) -> Option<BroadcastPosition> {
        self.state.read().unwrap().live.map(|live| live.position)
    }

    pub fn live_deadline(&self, now: Instant) -> Option<Instant> {
        self.state
            .read()
            .unwrap()
            .live_deadline(now, self.staleness_threshold)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocationUpdate> {
        self.updates.subscribe()
    }

    /// Publish the update at `now` if it differs from the last one published.
    ///
    /// Resolution and send happen under the `last_published` lock, so
    /// concurrent callers publish in the order they resolved and the last
    /// update sent always matches the state.
    pub fn publish_if_changed(&self, now: Instant) -> Option<LocationUpdate> {
        let mut last = self.last_published.write().unwrap();
        // Never resolve at an instant older than a previous caller's
        let update = self.current(now.max(Instant::now()));
        if *last == update {
            return None;
        }
        let previous = std::mem::replace(&mut *last, update);
        let _ = self.updates.send(update);
        drop(last);

        if previous.status != update.status {
            tracing::info!(from = %previous.status, to = %update.status, "Resolver status changed");
        }
        if let Some(BestLocation {
            latitude,
            longitude,
            confidence,
            ..
        }) = update.best
        {
            tracing::debug!(
                lat = latitude,
                lon = longitude,
                confidence,
                status = %update.status,
                "Best location updated"
            );
        }

        Some(update)
    }
}

/// Merges the live broadcast and the schedule into one best location.
///
/// Dropping the resolver (or calling [`dispose`](Self::dispose)) stops the
/// background task and releases the channel subscription.
pub struct BestLocationResolver {
    shared: Arc<ResolverShared>,
    cancellation: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BestLocationResolver {
    /// Start resolving for `config.vehicle_id`.
    ///
    /// Must be called within a tokio runtime.
    pub fn start<C: BroadcastChannel>(
        config: ResolverConfig,
        channel: Arc<C>,
        estimator: ScheduleEstimator,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        let shared = Arc::new(ResolverShared::new(
            estimator,
            clock,
            config.staleness_threshold,
            config.update_capacity,
        ));
        shared.refresh_schedule(Instant::now());

        let cancellation = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&shared),
            channel,
            config,
            cancellation.clone(),
        ));

        Self {
            shared,
            cancellation,
            task: Some(task),
        }
    }

    /// Shareable query and subscription handle.
    pub fn provider(&self) -> SharedBestLocation {
        SharedBestLocation::new(Arc::clone(&self.shared))
    }

    /// Subscribe to best location changes.
    pub fn subscribe(&self) -> broadcast::Receiver<LocationUpdate> {
        self.shared.subscribe()
    }

    pub fn status(&self) -> ResolverStatus {
        self.shared.current(Instant::now()).status
    }

    /// Best available location, or `None` when offline.
    pub fn best_location(&self) -> Option<BestLocation> {
        self.shared.current(Instant::now()).best
    }

    /// Swap the route used for schedule estimates.
    pub fn replace_route(&self, route: RouteDefinition) {
        self.shared.replace_route(route, Instant::now());
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the background task and release the channel subscription.
    pub async fn dispose(mut self) {
        self.cancellation.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Resolver task ended abnormally");
            }
        }
    }
}

impl Drop for BestLocationResolver {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn run<C: BroadcastChannel>(
    shared: Arc<ResolverShared>,
    channel: Arc<C>,
    config: ResolverConfig,
    cancellation: CancellationToken,
) {
    let mut events: Option<mpsc::Receiver<BroadcastEvent>> =
        match channel.subscribe(&config.vehicle_id).await {
            Ok(rx) => {
                tracing::info!(
                    vehicle_id = %config.vehicle_id,
                    staleness_secs = config.staleness_threshold.as_secs(),
                    "Subscribed to vehicle broadcast"
                );
                Some(rx)
            }
            Err(e) => {
                tracing::warn!(
                    vehicle_id = %config.vehicle_id,
                    error = %e,
                    "Broadcast unavailable, using schedule only"
                );
                None
            }
        };

    let mut refresh = tokio::time::interval(schedule_refresh_period(config.schedule_refresh));
    // Already refreshed at start
    refresh.tick().await;

    loop {
        let deadline = shared.live_deadline(Instant::now());

        tokio::select! {
            _ = cancellation.cancelled() => break,

            event = recv_event(&mut events) => {
                let now = Instant::now();
                match event {
                    Some(BroadcastEvent::Position(position)) => {
                        shared.receive_broadcast(position, now);
                    }
                    Some(BroadcastEvent::Empty) => {
                        tracing::debug!(vehicle_id = %config.vehicle_id, "Broadcast reports no position");
                        shared.clear_live(now);
                    }
                    Some(BroadcastEvent::Error(reason)) => {
                        tracing::warn!(vehicle_id = %config.vehicle_id, %reason, "Broadcast channel error");
                        shared.clear_live(now);
                    }
                    None => {
                        tracing::warn!(vehicle_id = %config.vehicle_id, "Broadcast channel closed");
                        events = None;
                        shared.clear_live(now);
                    }
                }
            }

            _ = refresh.tick() => {
                shared.refresh_schedule(Instant::now());
            }

            _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                tracing::debug!("Live position went stale");
                shared.publish_if_changed(Instant::now());
            }
        }
    }

    tracing::debug!(vehicle_id = %config.vehicle_id, "Resolver stopped");
}

/// Refresh period for a configured schedule refresh interval.
fn schedule_refresh_period(configured: Duration) -> Duration {
    if configured < MIN_SCHEDULE_REFRESH {
        tracing::warn!(
            configured_ms = configured.as_millis() as u64,
            min_ms = MIN_SCHEDULE_REFRESH.as_millis() as u64,
            "Schedule refresh interval too short, using minimum"
        );
        return MIN_SCHEDULE_REFRESH;
    }
    configured
}

/// Next event, or pending forever once the channel is gone.
async fn recv_event(events: &mut Option<mpsc::Receiver<BroadcastEvent>>) -> Option<BroadcastEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::channel::{BroadcastError, LocalChannel};
    use crate::resolver::model::LocationSource;
    use crate::resolver::provider::BestLocationProvider;
    use crate::schedule::Waypoint;
    use crate::time::ManualClock;
    use chrono::Utc;

    const VEHICLE: &str = "bus-4";

    fn route() -> RouteDefinition {
        RouteDefinition::new(
            "Line 4",
            vec![
                Waypoint::new("A", "Depot", 10.0, 20.0, 420, 1020),
                Waypoint::new("B", "Market", 10.1, 20.1, 440, 1040),
            ],
        )
        .unwrap()
    }

    fn config() -> ResolverConfig {
        ResolverConfig::new(VEHICLE)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    struct FailingChannel;

    impl BroadcastChannel for FailingChannel {
        async fn subscribe(
            &self,
            _vehicle_id: &str,
        ) -> Result<mpsc::Receiver<BroadcastEvent>, BroadcastError> {
            Err(BroadcastError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimated_while_route_operating() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let channel = Arc::new(LocalChannel::new());
        let resolver =
            BestLocationResolver::start(config(), channel, ScheduleEstimator::new(route()), clock);

        assert_eq!(resolver.status(), ResolverStatus::Estimated);
        let best = resolver.best_location().unwrap();
        assert_eq!(best.source, LocationSource::Estimated);
        assert!((best.latitude - 10.05).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_outside_service() {
        let clock = Arc::new(ManualClock::at(3, 0).unwrap());
        let resolver = BestLocationResolver::start(
            config(),
            Arc::new(LocalChannel::new()),
            ScheduleEstimator::new(route()),
            clock,
        );

        assert_eq!(resolver.status(), ResolverStatus::Offline);
        assert!(resolver.best_location().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_then_stale_exactly_at_threshold() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let channel = Arc::new(LocalChannel::new());
        let resolver = BestLocationResolver::start(
            config(),
            channel.clone(),
            ScheduleEstimator::new(route()),
            clock.clone(),
        );
        let mut updates = resolver.subscribe();
        settle().await;

        channel.publish(VEHICLE, BroadcastPosition::new(10.02, 20.02, 8.0, clock.now_utc()));
        settle().await;

        assert_eq!(resolver.status(), ResolverStatus::Live);
        let update = updates.recv().await.unwrap();
        assert_eq!(update.status, ResolverStatus::Live);

        tokio::time::advance(DEFAULT_STALENESS_THRESHOLD - Duration::from_millis(1)).await;
        assert_eq!(resolver.status(), ResolverStatus::Live);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(resolver.status(), ResolverStatus::Estimated);

        // The task publishes the transition without any schedule poll
        settle().await;
        let mut last = None;
        while let Ok(update) = updates.try_recv() {
            last = Some(update);
        }
        assert_eq!(last.map(|u| u.status), Some(ResolverStatus::Estimated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_payload_is_not_live() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let channel = Arc::new(LocalChannel::new());
        let resolver = BestLocationResolver::start(
            config(),
            channel.clone(),
            ScheduleEstimator::new(route()),
            clock.clone(),
        );
        settle().await;

        let old = clock.now_utc() - chrono::Duration::seconds(120);
        channel.publish(VEHICLE, BroadcastPosition::new(10.02, 20.02, 8.0, old));
        settle().await;

        assert_eq!(resolver.status(), ResolverStatus::Estimated);
        assert!(resolver.provider().live_position().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_error_falls_back() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let channel = Arc::new(LocalChannel::new());
        let resolver = BestLocationResolver::start(
            config(),
            channel.clone(),
            ScheduleEstimator::new(route()),
            clock.clone(),
        );
        settle().await;

        channel.publish(VEHICLE, BroadcastPosition::new(10.02, 20.02, 8.0, Utc::now()));
        settle().await;
        assert_eq!(resolver.status(), ResolverStatus::Live);

        channel.send(VEHICLE, BroadcastEvent::Error("socket reset".to_string()));
        settle().await;
        assert_eq!(resolver.status(), ResolverStatus::Estimated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_closed_falls_back() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let channel = Arc::new(LocalChannel::new());
        let resolver = BestLocationResolver::start(
            config(),
            channel.clone(),
            ScheduleEstimator::new(route()),
            clock.clone(),
        );
        settle().await;
        channel.publish(VEHICLE, BroadcastPosition::new(10.02, 20.02, 8.0, clock.now_utc()));
        settle().await;

        channel.close();
        settle().await;

        assert_eq!(resolver.status(), ResolverStatus::Estimated);
        assert!(resolver.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_channel_uses_schedule() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let resolver = BestLocationResolver::start(
            config(),
            Arc::new(FailingChannel),
            ScheduleEstimator::new(route()),
            clock,
        );
        settle().await;

        assert_eq!(resolver.status(), ResolverStatus::Estimated);
        assert!(resolver.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_refresh_tracks_clock() {
        let clock = Arc::new(ManualClock::at(7, 0).unwrap());
        let resolver = BestLocationResolver::start(
            config(),
            Arc::new(LocalChannel::new()),
            ScheduleEstimator::new(route()),
            clock.clone(),
        );
        let first = resolver.best_location().unwrap();

        clock.advance(Duration::from_secs(10 * 60));
        tokio::time::sleep(DEFAULT_SCHEDULE_REFRESH + Duration::from_millis(10)).await;

        let later = resolver.best_location().unwrap();
        assert!(later.latitude > first.latitude);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_schedule_refresh_is_raised_to_minimum() {
        let clock = Arc::new(ManualClock::at(7, 0).unwrap());
        let config = ResolverConfig {
            schedule_refresh: Duration::ZERO,
            ..config()
        };
        let resolver = BestLocationResolver::start(
            config,
            Arc::new(LocalChannel::new()),
            ScheduleEstimator::new(route()),
            clock.clone(),
        );
        let first = resolver.best_location().unwrap();

        clock.advance(Duration::from_secs(10 * 60));
        tokio::time::sleep(MIN_SCHEDULE_REFRESH + Duration::from_millis(10)).await;

        assert!(resolver.is_running());
        let later = resolver.best_location().unwrap();
        assert!(later.latitude > first.latitude);
    }

    #[test]
    fn test_concurrent_publishers_end_on_current_state() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let shared = ResolverShared::new(
            ScheduleEstimator::new(route()),
            clock.clone(),
            DEFAULT_STALENESS_THRESHOLD,
            8_192,
        );
        let mut rx = shared.subscribe();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let shared = &shared;
                let clock = &clock;
                scope.spawn(move || {
                    for n in 0..200 {
                        match (worker % 2, n % 2) {
                            (0, 0) => shared.replace_route(route(), Instant::now()),
                            (0, _) => shared.replace_route(RouteDefinition::default(), Instant::now()),
                            (_, 0) => shared.receive_broadcast(
                                BroadcastPosition::new(10.02, 20.02, 8.0, clock.now_utc()),
                                Instant::now(),
                            ),
                            _ => shared.clear_live(Instant::now()),
                        }
                    }
                });
            }
        });

        let mut last_sent = None;
        while let Ok(update) = rx.try_recv() {
            last_sent = Some(update);
        }
        assert_eq!(
            last_sent.unwrap_or_default(),
            shared.current(Instant::now())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_route() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let resolver = BestLocationResolver::start(
            config(),
            Arc::new(LocalChannel::new()),
            ScheduleEstimator::new(route()),
            clock,
        );

        resolver.replace_route(RouteDefinition::default());

        assert_eq!(resolver.status(), ResolverStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_releases_subscription() {
        let clock = Arc::new(ManualClock::at(7, 10).unwrap());
        let channel = Arc::new(LocalChannel::new());
        let resolver = BestLocationResolver::start(
            config(),
            channel.clone(),
            ScheduleEstimator::new(route()),
            clock,
        );
        settle().await;
        assert_eq!(channel.subscriber_count(VEHICLE), 1);

        resolver.dispose().await;

        assert_eq!(channel.subscriber_count(VEHICLE), 0);
    }
}
