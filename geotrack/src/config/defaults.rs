//! Default values for all configuration settings.

use std::path::PathBuf;

use super::settings::*;
use crate::filter::FilterTuning;
use crate::state::TrackingMode;

// =============================================================================
// [tracking]
// =============================================================================

pub const DEFAULT_TRACKING_MODE: TrackingMode = TrackingMode::Active;
pub const DEFAULT_INERTIAL_FUSION: bool = true;
pub const DEFAULT_PREDICTION_GAP_MS: u64 = 2_000;
pub const DEFAULT_RESUME_IN_BACKGROUND: bool = false;
pub const DEFAULT_MAX_ACCELERATION: f64 = crate::sampling::DEFAULT_MAX_ACCELERATION;

// =============================================================================
// [resolver]
// =============================================================================

pub const DEFAULT_STALENESS_THRESHOLD_MS: u64 = 60_000;
pub const DEFAULT_SCHEDULE_REFRESH_SECS: u64 = 30;

/// Staleness thresholds below this are rejected.
pub const MIN_STALENESS_THRESHOLD_MS: u64 = 1_000;

// =============================================================================
// [logging]
// =============================================================================

pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "geotrack.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";

impl Default for ConfigFile {
    fn default() -> Self {
        let tuning = FilterTuning::default();
        Self {
            tracking: TrackingSettings {
                mode: DEFAULT_TRACKING_MODE,
                inertial_fusion: DEFAULT_INERTIAL_FUSION,
                prediction_gap_ms: DEFAULT_PREDICTION_GAP_MS,
                resume_in_background: DEFAULT_RESUME_IN_BACKGROUND,
                max_acceleration: DEFAULT_MAX_ACCELERATION,
            },
            filter: FilterSettings {
                initial_position_variance: tuning.initial_position_variance,
                initial_velocity_variance: tuning.initial_velocity_variance,
                position_process_noise: tuning.position_process_noise,
                velocity_process_noise: tuning.velocity_process_noise,
            },
            resolver: ResolverSettings {
                vehicle_id: String::new(),
                staleness_threshold_ms: DEFAULT_STALENESS_THRESHOLD_MS,
                schedule_refresh_secs: DEFAULT_SCHEDULE_REFRESH_SECS,
            },
            route: RouteSettings::default(),
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIR),
                file: DEFAULT_LOG_FILE.to_string(),
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}
