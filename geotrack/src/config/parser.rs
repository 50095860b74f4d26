//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::defaults::MIN_STALENESS_THRESHOLD_MS;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::state::TrackingMode;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [tracking] section
    if let Some(section) = ini.section(Some("tracking")) {
        if let Some(v) = section.get("mode") {
            config.tracking.mode =
                TrackingMode::from_str(v.trim()).map_err(|_| ConfigFileError::InvalidValue {
                    section: "tracking".to_string(),
                    key: "mode".to_string(),
                    value: v.to_string(),
                    reason: "must be one of: active, background, stationary, off".to_string(),
                })?;
        }
        if let Some(v) = parse_bool(section, "tracking", "inertial_fusion")? {
            config.tracking.inertial_fusion = v;
        }
        if let Some(v) = parse_number::<u64>(section, "tracking", "prediction_gap_ms")? {
            config.tracking.prediction_gap_ms = v;
        }
        if let Some(v) = parse_bool(section, "tracking", "resume_in_background")? {
            config.tracking.resume_in_background = v;
        }
        if let Some(v) = parse_positive(section, "tracking", "max_acceleration")? {
            config.tracking.max_acceleration = v;
        }
    }

    // [filter] section
    if let Some(section) = ini.section(Some("filter")) {
        if let Some(v) = parse_positive(section, "filter", "initial_position_variance")? {
            config.filter.initial_position_variance = v;
        }
        if let Some(v) = parse_positive(section, "filter", "initial_velocity_variance")? {
            config.filter.initial_velocity_variance = v;
        }
        if let Some(v) = parse_positive(section, "filter", "position_process_noise")? {
            config.filter.position_process_noise = v;
        }
        if let Some(v) = parse_positive(section, "filter", "velocity_process_noise")? {
            config.filter.velocity_process_noise = v;
        }
    }

    // [resolver] section
    if let Some(section) = ini.section(Some("resolver")) {
        if let Some(v) = section.get("vehicle_id") {
            config.resolver.vehicle_id = v.trim().to_string();
        }
        if let Some(v) = parse_number::<u64>(section, "resolver", "staleness_threshold_ms")? {
            if v < MIN_STALENESS_THRESHOLD_MS {
                return Err(ConfigFileError::InvalidValue {
                    section: "resolver".to_string(),
                    key: "staleness_threshold_ms".to_string(),
                    value: v.to_string(),
                    reason: format!("must be at least {}", MIN_STALENESS_THRESHOLD_MS),
                });
            }
            config.resolver.staleness_threshold_ms = v;
        }
        if let Some(v) = parse_number::<u64>(section, "resolver", "schedule_refresh_secs")? {
            if v == 0 {
                return Err(ConfigFileError::InvalidValue {
                    section: "resolver".to_string(),
                    key: "schedule_refresh_secs".to_string(),
                    value: v.to_string(),
                    reason: "must be a positive integer (seconds)".to_string(),
                });
            }
            config.resolver.schedule_refresh_secs = v;
        }
    }

    // [route] section
    if let Some(section) = ini.section(Some("route")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.route.file = Some(PathBuf::from(v));
            }
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = PathBuf::from(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = section.get("level") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.level = v.to_string();
            }
        }
    }

    Ok(config)
}

fn parse_bool(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<bool>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    match v.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(Some(true)),
        "false" | "no" | "0" | "off" => Ok(Some(false)),
        _ => Err(ConfigFileError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: "must be true or false".to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    v.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: "must be a non-negative integer".to_string(),
        })
}

fn parse_positive(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<f64>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    match v.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => Ok(Some(n)),
        _ => Err(ConfigFileError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: "must be a positive number".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_is_default() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_overlays_present_keys() {
        let config = parse(
            "[tracking]\n\
             mode = stationary\n\
             inertial_fusion = false\n\
             prediction_gap_ms = 3000\n\
             \n\
             [resolver]\n\
             vehicle_id = bus-4\n\
             staleness_threshold_ms = 90000\n\
             \n\
             [route]\n\
             file = /etc/geotrack/line4.json\n",
        )
        .unwrap();

        assert_eq!(config.tracking.mode, TrackingMode::Stationary);
        assert!(!config.tracking.inertial_fusion);
        assert_eq!(config.tracking.prediction_gap_ms, 3_000);
        assert_eq!(config.resolver.vehicle_id, "bus-4");
        assert_eq!(config.resolver.staleness_threshold_ms, 90_000);
        assert_eq!(
            config.route.file,
            Some(PathBuf::from("/etc/geotrack/line4.json"))
        );
        // Untouched keys keep defaults
        assert_eq!(
            config.resolver.schedule_refresh_secs,
            ConfigFile::default().resolver.schedule_refresh_secs
        );
    }

    #[test]
    fn test_invalid_mode() {
        let err = parse("[tracking]\nmode = turbo\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref section, ref key, .. }
                if section == "tracking" && key == "mode"
        ));
    }

    #[test]
    fn test_invalid_bool() {
        assert!(parse("[tracking]\ninertial_fusion = maybe\n").is_err());
    }

    #[test]
    fn test_rejects_non_positive_noise() {
        assert!(parse("[filter]\nposition_process_noise = 0\n").is_err());
        assert!(parse("[filter]\nposition_process_noise = -1.5\n").is_err());
        assert!(parse("[filter]\nposition_process_noise = NaN\n").is_err());
    }

    #[test]
    fn test_rejects_tiny_staleness_threshold() {
        assert!(parse("[resolver]\nstaleness_threshold_ms = 10\n").is_err());
        assert!(parse("[resolver]\nschedule_refresh_secs = 0\n").is_err());
    }

    #[test]
    fn test_error_message() {
        let err = parse("[tracking]\nprediction_gap_ms = soon\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: tracking.prediction_gap_ms = 'soon' - must be a non-negative integer"
        );
    }
}
