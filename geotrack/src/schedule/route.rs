//! Route definition: the ordered list of scheduled waypoints.
//!
//! Routes are loaded once (typically from JSON) and replaced wholesale; there
//! is no API for editing a single waypoint.
//!
//! # JSON format
//!
//! ```json
//! {
//!   "name": "Line 4",
//!   "waypoints": [
//!     { "id": "A", "name": "Depot", "latitude": 10.0, "longitude": 20.0,
//!       "scheduled_minutes_morning": 420, "scheduled_minutes_evening": 1020 }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a day; scheduled times must be strictly below this.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Route loading and validation errors.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Failed to read the route file.
    #[error("Failed to read route file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Route JSON is malformed.
    #[error("Failed to parse route: {0}")]
    Parse(#[from] serde_json::Error),

    /// A waypoint failed validation.
    #[error("Invalid waypoint '{id}': {reason}")]
    InvalidWaypoint { id: String, reason: String },
}

/// Which half of the day's timetable applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePeriod {
    Morning,
    Evening,
}

impl ServicePeriod {
    /// Morning before noon, evening from noon onward.
    pub fn for_time(time: NaiveTime) -> Self {
        if time.hour() < 12 {
            Self::Morning
        } else {
            Self::Evening
        }
    }
}

impl std::fmt::Display for ServicePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Morning => write!(f, "morning"),
            Self::Evening => write!(f, "evening"),
        }
    }
}

/// A scheduled stop on the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Scheduled arrival, minutes after midnight, morning run.
    pub scheduled_minutes_morning: u32,

    /// Scheduled arrival, minutes after midnight, evening run.
    pub scheduled_minutes_evening: u32,
}

impl Waypoint {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        scheduled_minutes_morning: u32,
        scheduled_minutes_evening: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            scheduled_minutes_morning,
            scheduled_minutes_evening,
        }
    }

    /// Scheduled minutes for the given period.
    pub fn scheduled_minutes(&self, period: ServicePeriod) -> u32 {
        match period {
            ServicePeriod::Morning => self.scheduled_minutes_morning,
            ServicePeriod::Evening => self.scheduled_minutes_evening,
        }
    }

    fn validate(&self) -> Result<(), RouteError> {
        let invalid = |reason: String| RouteError::InvalidWaypoint {
            id: self.id.clone(),
            reason,
        };

        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(invalid(format!("latitude {} out of range", self.latitude)));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(invalid(format!("longitude {} out of range", self.longitude)));
        }
        for (label, minutes) in [
            ("morning", self.scheduled_minutes_morning),
            ("evening", self.scheduled_minutes_evening),
        ] {
            if minutes >= MINUTES_PER_DAY {
                return Err(invalid(format!(
                    "{} time {} is not within a day",
                    label, minutes
                )));
            }
        }
        Ok(())
    }
}

/// Ordered sequence of waypoints. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteDefinition {
    #[serde(default)]
    pub name: String,

    waypoints: Vec<Waypoint>,
}

impl RouteDefinition {
    /// Build a validated route.
    pub fn new(name: impl Into<String>, waypoints: Vec<Waypoint>) -> Result<Self, RouteError> {
        let route = Self {
            name: name.into(),
            waypoints,
        };
        route.validate()?;
        Ok(route)
    }

    /// Parse and validate a JSON route definition.
    pub fn from_json(json: &str) -> Result<Self, RouteError> {
        let route: Self = serde_json::from_str(json)?;
        route.validate()?;
        Ok(route)
    }

    /// Load and validate a JSON route definition from disk.
    pub fn load_from(path: &Path) -> Result<Self, RouteError> {
        let content = std::fs::read_to_string(path).map_err(|source| RouteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let route = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            route = %route.name,
            waypoints = route.len(),
            "Route definition loaded"
        );
        Ok(route)
    }

    /// Waypoints in definition order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Returns true if the route has enough waypoints to interpolate along.
    pub fn is_estimable(&self) -> bool {
        self.waypoints.len() >= 2
    }

    /// Waypoints ordered by their scheduled time in `period`.
    ///
    /// Ties keep definition order.
    pub fn ordered_for(&self, period: ServicePeriod) -> Vec<&Waypoint> {
        let mut ordered: Vec<&Waypoint> = self.waypoints.iter().collect();
        ordered.sort_by_key(|w| w.scheduled_minutes(period));
        ordered
    }

    fn validate(&self) -> Result<(), RouteError> {
        let mut seen = HashSet::new();
        for waypoint in &self.waypoints {
            waypoint.validate()?;
            if !seen.insert(waypoint.id.as_str()) {
                return Err(RouteError::InvalidWaypoint {
                    id: waypoint.id.clone(),
                    reason: "duplicate id".to_string(),
                });
            }
        }
        Ok(())
    }
}
