//! Broadcast channel abstraction.
//!
//! The realtime transport carrying positions from the tracked device is
//! host-specific. It only needs to hand the resolver a stream of
//! [`BroadcastEvent`]s for one vehicle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;

use super::model::{BroadcastEvent, BroadcastPosition};

/// Channel capacity for [`LocalChannel`] subscribers.
const LOCAL_CHANNEL_CAPACITY: usize = 32;

/// Errors from a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The channel could not be reached.
    #[error("Broadcast channel unavailable: {0}")]
    Unavailable(String),

    /// The channel has shut down.
    #[error("Broadcast channel closed")]
    Closed,
}

/// Source of broadcast positions for a vehicle.
pub trait BroadcastChannel: Send + Sync + 'static {
    /// Subscribe to events for `vehicle_id`.
    ///
    /// Dropping the receiver ends the subscription.
    fn subscribe(
        &self,
        vehicle_id: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<BroadcastEvent>, BroadcastError>> + Send;
}

/// In-process channel: publishers and the resolver share one process.
///
/// Used when the tracked device and the observer run in the same host, and
/// by tests.
#[derive(Debug, Default)]
pub struct LocalChannel {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<BroadcastEvent>>>>,
    closed: Mutex<bool>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a position for `vehicle_id`. Returns the number of receivers reached.
    pub fn publish(&self, vehicle_id: &str, position: BroadcastPosition) -> usize {
        self.send(vehicle_id, BroadcastEvent::Position(position))
    }

    /// Send an arbitrary event for `vehicle_id`.
    pub fn send(&self, vehicle_id: &str, event: BroadcastEvent) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        let Some(senders) = subscribers.get_mut(vehicle_id) else {
            return 0;
        };
        senders.retain(|tx| !tx.is_closed());
        senders
            .iter()
            .filter(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(vehicle_id, error = %e, "Dropping broadcast event");
                    false
                }
            })
            .count()
    }

    /// Drop all subscribers and refuse new ones.
    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.subscribers.lock().unwrap().clear();
    }

    /// Number of live subscribers for `vehicle_id`.
    pub fn subscriber_count(&self, vehicle_id: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(vehicle_id)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl BroadcastChannel for LocalChannel {
    async fn subscribe(
        &self,
        vehicle_id: &str,
    ) -> Result<mpsc::Receiver<BroadcastEvent>, BroadcastError> {
        if *self.closed.lock().unwrap() {
            return Err(BroadcastError::Closed);
        }
        let (tx, rx) = mpsc::channel(LOCAL_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .unwrap()
            .entry(vehicle_id.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
