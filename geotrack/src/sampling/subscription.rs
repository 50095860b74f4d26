//! Subscription handles and the sinks sources deliver into.
//!
//! A source that accepts a subscription keeps the sink and a clone of the
//! handle's [`CancellationToken`]. Disposing (or dropping) the [`Subscription`]
//! cancels the token; well-behaved sources stop delivering, and any delivery
//! that still slips through is discarded by the sink's session check.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::fusion::FusionCore;
use crate::state::AbsoluteFix;

/// Handle to an active sensor subscription. Cancels on drop.
#[derive(Debug)]
pub struct Subscription {
    label: &'static str,
    token: CancellationToken,
}

impl Subscription {
    /// Create a new active subscription.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            token: CancellationToken::new(),
        }
    }

    /// Token that fires when the subscription is disposed.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Release the subscription. Idempotent.
    pub fn dispose(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(subscription = self.label, "Disposing subscription");
            self.token.cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Receives absolute fixes for one tracking session.
#[derive(Debug, Clone)]
pub struct FixSink {
    core: Arc<FusionCore>,
    generation: u64,
}

impl FixSink {
    pub(crate) fn new(core: Arc<FusionCore>, generation: u64) -> Self {
        Self { core, generation }
    }

    /// Deliver a fix. Returns false if it was discarded.
    pub fn deliver(&self, fix: AbsoluteFix) -> bool {
        self.core.on_fix(self.generation, fix, Instant::now())
    }

    /// Returns true while the session this sink belongs to is running.
    pub fn is_open(&self) -> bool {
        self.core.is_current(self.generation)
    }
}

/// Receives device-frame acceleration samples (m/s²).
#[derive(Debug, Clone)]
pub struct AccelerationSink {
    core: Arc<FusionCore>,
    generation: u64,
}

impl AccelerationSink {
    pub(crate) fn new(core: Arc<FusionCore>, generation: u64) -> Self {
        Self { core, generation }
    }

    pub fn deliver(&self, acceleration_x: f64, acceleration_y: f64) {
        self.core
            .on_acceleration(self.generation, acceleration_x, acceleration_y);
    }

    pub fn is_open(&self) -> bool {
        self.core.is_current(self.generation)
    }
}

/// Receives magnetometer headings (radians clockwise from north).
#[derive(Debug, Clone)]
pub struct HeadingSink {
    core: Arc<FusionCore>,
    generation: u64,
}

impl HeadingSink {
    pub(crate) fn new(core: Arc<FusionCore>, generation: u64) -> Self {
        Self { core, generation }
    }

    pub fn deliver(&self, heading: f64) {
        self.core.on_heading(self.generation, heading);
    }

    pub fn is_open(&self) -> bool {
        self.core.is_current(self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_is_idempotent() {
        let subscription = Subscription::new("gps");
        let token = subscription.token();
        assert!(subscription.is_active());

        subscription.dispose();
        subscription.dispose();

        assert!(!subscription.is_active());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_drop_cancels() {
        let subscription = Subscription::new("heading");
        let token = subscription.token();
        drop(subscription);
        assert!(token.is_cancelled());
    }
}
