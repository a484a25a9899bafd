//! Process configuration: built-in defaults, then an optional `labgrade`
//! file (toml, json or yaml) in the working directory, then `LABGRADE_*`
//! environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::db::DEFAULT_DB_FILE_NAME;

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Workspace opened at startup, before any `workspace.select`.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    pub db_file_name: String,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name("labgrade").required(false))
                .add_source(Environment::with_prefix("LABGRADE").try_parsing(true)),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config = builder
            .set_default("db_file_name", DEFAULT_DB_FILE_NAME)?
            .set_default("log_filter", DEFAULT_LOG_FILTER)?
            .build()?;
        let mut app_config: AppConfig = config.try_deserialize()?;

        if app_config.db_file_name.trim().is_empty() {
            app_config.db_file_name = DEFAULT_DB_FILE_NAME.to_string();
        }
        if app_config
            .workspace
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            app_config.workspace = None;
        }
        Ok(app_config)
    }

    /// Like [`AppConfig::load`], but a broken source is reported on stderr
    /// and the defaults are used instead of refusing to start.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            eprintln!("labgraded: failed to load configuration, using defaults: {e}");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_apply_without_sources() {
        let cfg = AppConfig::from_builder(Config::builder()).expect("config");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let builder = Config::builder().add_source(File::from_str(
            "workspace = \"/tmp/labs\"\nlog_filter = \"labgrade=debug\"\n",
            FileFormat::Toml,
        ));
        let cfg = AppConfig::from_builder(builder).expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/labs")));
        assert_eq!(cfg.log_filter, "labgrade=debug");
        assert_eq!(cfg.db_file_name, DEFAULT_DB_FILE_NAME);
    }

    #[test]
    fn blank_values_fall_back() {
        let builder = Config::builder().add_source(File::from_str(
            "workspace = \"\"\ndb_file_name = \"  \"\n",
            FileFormat::Toml,
        ));
        let cfg = AppConfig::from_builder(builder).expect("config");
        assert_eq!(cfg.workspace, None);
        assert_eq!(cfg.db_file_name, DEFAULT_DB_FILE_NAME);
    }
}
