//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! Conversions into the runtime configs of each component live here too.

use std::path::PathBuf;
use std::time::Duration;

use crate::filter::FilterTuning;
use crate::resolver::ResolverConfig;
use crate::sampling::SamplingConfig;
use crate::state::TrackingMode;

/// Complete engine configuration loaded from an INI file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Sampling and fusion settings
    pub tracking: TrackingSettings,
    /// Filter noise parameters
    pub filter: FilterSettings,
    /// Best location resolver settings
    pub resolver: ResolverSettings,
    /// Route definition location
    pub route: RouteSettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// `[tracking]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    pub mode: TrackingMode,
    pub inertial_fusion: bool,
    /// Milliseconds since the last fix before prediction runs
    pub prediction_gap_ms: u64,
    pub resume_in_background: bool,
    /// Clamp on inertial acceleration (m/s²)
    pub max_acceleration: f64,
}

/// `[filter]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub initial_position_variance: f64,
    pub initial_velocity_variance: f64,
    pub position_process_noise: f64,
    pub velocity_process_noise: f64,
}

/// `[resolver]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    /// Vehicle whose broadcast to follow (empty = none configured)
    pub vehicle_id: String,
    pub staleness_threshold_ms: u64,
    pub schedule_refresh_secs: u64,
}

/// `[route]` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteSettings {
    /// JSON route definition
    pub file: Option<PathBuf>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
}

impl FilterSettings {
    pub fn tuning(&self) -> FilterTuning {
        FilterTuning {
            initial_position_variance: self.initial_position_variance,
            initial_velocity_variance: self.initial_velocity_variance,
            position_process_noise: self.position_process_noise,
            velocity_process_noise: self.velocity_process_noise,
        }
    }
}

impl ConfigFile {
    /// Sampling controller configuration.
    pub fn sampling_config(&self) -> SamplingConfig {
        SamplingConfig {
            mode: self.tracking.mode,
            inertial_fusion: self.tracking.inertial_fusion,
            prediction_gap: Duration::from_millis(self.tracking.prediction_gap_ms),
            resume_in_background: self.tracking.resume_in_background,
            max_acceleration: self.tracking.max_acceleration,
            tuning: self.filter.tuning(),
            ..SamplingConfig::default()
        }
    }

    /// Resolver configuration.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            vehicle_id: self.resolver.vehicle_id.clone(),
            staleness_threshold: Duration::from_millis(self.resolver.staleness_threshold_ms),
            schedule_refresh: Duration::from_secs(self.resolver.schedule_refresh_secs),
            ..ResolverConfig::default()
        }
    }
}
