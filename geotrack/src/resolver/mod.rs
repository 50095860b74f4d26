//! Best location resolution for observers of a tracked vehicle.
//!
//! # Architecture
//!
//! ```text
//! BroadcastChannel ──mpsc<BroadcastEvent>──┐
//!                                          ├──► BestLocationResolver ──► broadcast<LocationUpdate>
//! ScheduleEstimator (every 30s) ───────────┘          │
//!                                                      └──► SharedBestLocation (query API)
//! ```
//!
//! # Status
//!
//! | Status      | Condition                                          |
//! |-------------|----------------------------------------------------|
//! | `Live`      | broadcast received within the staleness threshold  |
//! | `Estimated` | not live, timetable says the vehicle is operating  |
//! | `Offline`   | neither                                            |

mod channel;
mod logger;
mod model;
mod provider;
#[allow(clippy::module_inception)]
mod resolver;

pub use channel::{BroadcastChannel, BroadcastError, LocalChannel};
pub use logger::{spawn_location_logger, DEFAULT_LOG_INTERVAL};
pub use model::{
    BestLocation, BroadcastEvent, BroadcastPosition, LivePosition, LocationSource, LocationUpdate,
    ResolverState, ResolverStatus, LIVE_HIGH_CONFIDENCE, LIVE_HIGH_CONFIDENCE_ERROR,
    LIVE_LOW_CONFIDENCE,
};
pub use provider::{BestLocationBroadcaster, BestLocationProvider, SharedBestLocation};
pub use resolver::{
    BestLocationResolver, ResolverConfig, DEFAULT_SCHEDULE_REFRESH, DEFAULT_STALENESS_THRESHOLD,
    MIN_SCHEDULE_REFRESH,
};
