//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let route_file = config
        .route
        .file
        .as_ref()
        .map(|p| path_to_string(p))
        .unwrap_or_default();

    format!(
        r#"[tracking]
; Sampling mode:
;   active     - foreground navigation (fix every 1s, inertial every 100ms)
;   background - host backgrounded (fix every 5s, inertial every 1s)
;   stationary - parked or waiting (fix every 30s, inertial every 5s)
;   off        - no sampling
mode = {}
; Use accelerometer and heading to predict between fixes (default: true)
inertial_fusion = {}
; Milliseconds without a fix before prediction starts (default: 2000)
prediction_gap_ms = {}
; Keep tracking at background rates when the host backgrounds (default: false)
resume_in_background = {}
; Clamp applied to inertial acceleration, m/s² (default: 19.6)
max_acceleration = {}

[filter]
; Variances after a reset (m², (m/s)²)
initial_position_variance = {}
initial_velocity_variance = {}
; Process noise added per prediction step
position_process_noise = {}
velocity_process_noise = {}

[resolver]
; Vehicle whose broadcast position to follow
vehicle_id = {}
; Broadcast older than this is no longer live, ms (default: 60000)
staleness_threshold_ms = {}
; Schedule estimate refresh interval, seconds (default: 30)
schedule_refresh_secs = {}

[route]
; JSON route definition, relative to this file or absolute
file = {}

[logging]
directory = {}
file = {}
; Used when RUST_LOG is not set
level = {}
"#,
        config.tracking.mode,
        config.tracking.inertial_fusion,
        config.tracking.prediction_gap_ms,
        config.tracking.resume_in_background,
        config.tracking.max_acceleration,
        config.filter.initial_position_variance,
        config.filter.initial_velocity_variance,
        config.filter.position_process_noise,
        config.filter.velocity_process_noise,
        config.resolver.vehicle_id,
        config.resolver.staleness_threshold_ms,
        config.resolver.schedule_refresh_secs,
        route_file,
        path_to_string(&config.logging.directory),
        config.logging.file,
        config.logging.level,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
