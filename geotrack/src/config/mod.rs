//! Engine configuration loaded from an INI file.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use geotrack::config::ConfigFile;
//!
//! let config = ConfigFile::load_from(Path::new("geotrack.ini")).unwrap();
//! let sampling = config.sampling_config();
//! let resolver = config.resolver_config();
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::ConfigFileError;
pub use settings::{
    ConfigFile, FilterSettings, LoggingSettings, ResolverSettings, RouteSettings, TrackingSettings,
};
