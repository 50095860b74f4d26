//! Configuration file loading and saving.
//!
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`], and serialization in [`super::writer`].

use std::path::Path;

use ini::Ini;
use thiserror::Error;

use super::settings::ConfigFile;
use crate::schedule::{RouteDefinition, RouteError};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),

    /// The configured route file could not be loaded
    #[error("Failed to load route: {0}")]
    Route(#[from] RouteError),
}

impl ConfigFile {
    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        let config = super::parser::parse_ini(&ini)?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Load the configured route, if any.
    ///
    /// Relative paths are resolved against `base_dir` (usually the directory
    /// holding the config file).
    pub fn load_route(&self, base_dir: &Path) -> Result<Option<RouteDefinition>, ConfigFileError> {
        let Some(file) = &self.route.file else {
            return Ok(None);
        };
        let path = if file.is_absolute() {
            file.clone()
        } else {
            base_dir.join(file)
        };
        Ok(Some(RouteDefinition::load_from(&path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::state::TrackingMode;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();

        assert_eq!(config.tracking.mode, TrackingMode::Active);
        assert!(config.tracking.inertial_fusion);
        assert_eq!(config.tracking.prediction_gap_ms, DEFAULT_PREDICTION_GAP_MS);
        assert_eq!(config.resolver.staleness_threshold_ms, DEFAULT_STALENESS_THRESHOLD_MS);
        assert_eq!(config.resolver.schedule_refresh_secs, DEFAULT_SCHEDULE_REFRESH_SECS);
        assert!(config.route.file.is_none());
        assert_eq!(config.logging.file, DEFAULT_LOG_FILE);
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_then_load_preserves_settings() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("geotrack.ini");

        let mut config = ConfigFile::default();
        config.tracking.mode = TrackingMode::Background;
        config.tracking.resume_in_background = true;
        config.filter.position_process_noise = 1.25;
        config.resolver.vehicle_id = "bus-4".to_string();
        config.route.file = Some("routes/line4.json".into());
        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_route_relative_to_base() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("line4.json"),
            r#"{"name":"Line 4","waypoints":[
                {"id":"A","latitude":10.0,"longitude":20.0,"scheduled_minutes_morning":420,"scheduled_minutes_evening":1020},
                {"id":"B","latitude":10.1,"longitude":20.1,"scheduled_minutes_morning":440,"scheduled_minutes_evening":1040}
            ]}"#,
        )
        .unwrap();

        let mut config = ConfigFile::default();
        assert!(config.load_route(temp_dir.path()).unwrap().is_none());

        config.route.file = Some("line4.json".into());
        let route = config.load_route(temp_dir.path()).unwrap().unwrap();
        assert_eq!(route.len(), 2);
    }

    #[test]
    fn test_load_route_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = ConfigFile::default();
        config.route.file = Some("missing.json".into());

        assert!(matches!(
            config.load_route(temp_dir.path()),
            Err(ConfigFileError::Route(RouteError::Io { .. }))
        ));
    }

    #[test]
    fn test_component_configs() {
        let mut config = ConfigFile::default();
        config.tracking.prediction_gap_ms = 3_500;
        config.resolver.staleness_threshold_ms = 45_000;
        config.resolver.vehicle_id = "bus-7".to_string();

        let sampling = config.sampling_config();
        assert_eq!(sampling.prediction_gap, std::time::Duration::from_millis(3_500));
        assert_eq!(sampling.tuning, config.filter.tuning());

        let resolver = config.resolver_config();
        assert_eq!(resolver.vehicle_id, "bus-7");
        assert_eq!(resolver.staleness_threshold, std::time::Duration::from_secs(45));
    }
}
