//! Provider traits and shared wrapper for the best location.
//!
//! - [`BestLocationProvider`] - Query API (pull)
//! - [`BestLocationBroadcaster`] - Subscription API (push)
//! - [`SharedBestLocation`] - Cloneable handle implementing both

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::Instant;

use super::model::{BestLocation, BroadcastPosition, LocationUpdate, ResolverStatus};
use super::resolver::ResolverShared;
use crate::schedule::ScheduleEstimate;

/// Trait for querying the best location (pull API).
pub trait BestLocationProvider: Send + Sync {
    /// Best location and status at the current instant.
    fn current(&self) -> LocationUpdate;

    fn status(&self) -> ResolverStatus {
        self.current().status
    }

    /// Best location, or `None` when there is no opinion.
    fn best_location(&self) -> Option<BestLocation> {
        self.current().best
    }

    /// Most recent schedule estimate.
    fn schedule_estimate(&self) -> Option<ScheduleEstimate>;

    /// Last broadcast position received, fresh or not.
    fn live_position(&self) -> Option<BroadcastPosition>;
}

/// Trait for subscribing to best location changes (push API).
pub trait BestLocationBroadcaster: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<LocationUpdate>;
}

/// Shared best location - cloneable handle onto a running resolver.
///
/// Keeps answering queries after the resolver is disposed, from the last
/// state it saw.
#[derive(Clone)]
pub struct SharedBestLocation {
    inner: Arc<ResolverShared>,
}

impl SharedBestLocation {
    pub(crate) fn new(inner: Arc<ResolverShared>) -> Self {
        Self { inner }
    }
}

impl BestLocationProvider for SharedBestLocation {
    fn current(&self) -> LocationUpdate {
        self.inner.current(Instant::now())
    }

    fn schedule_estimate(&self) -> Option<ScheduleEstimate> {
        self.inner.schedule_estimate()
    }

    fn live_position(&self) -> Option<BroadcastPosition> {
        self.inner.live_position()
    }
}

impl BestLocationBroadcaster for SharedBestLocation {
    fn subscribe(&self) -> broadcast::Receiver<LocationUpdate> {
        self.inner.subscribe()
    }
}

impl std::fmt::Debug for SharedBestLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBestLocation")
            .field("current", &self.current())
            .finish()
    }
}
