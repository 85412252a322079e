//! Configuration parser for loading provider configuration.
//!
//! Values come from a YAML file, then from the environment (optionally
//! seeded by a `.env` file). Environment values win.

use crate::error::{ConfigError, RadarError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ProviderConfig;

/// Environment variable overriding `project_id`.
pub const ENV_PROJECT_ID: &str = "HCP_PROJECT_ID";
/// Environment variable overriding `organization_id`.
pub const ENV_ORGANIZATION_ID: &str = "HCP_ORGANIZATION_ID";
/// Environment variable overriding `offboard.timeout_secs`.
pub const ENV_OFFBOARD_TIMEOUT_SECS: &str = "HCP_RADAR_OFFBOARD_TIMEOUT_SECS";

/// Configuration parser for loading provider configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory searched for `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory searched for `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be read, or does
    /// not parse.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(RadarError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path)?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string. An empty document yields the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(ProviderConfig::default());
        }

        let config: ProviderConfig = serde_yaml::from_str(content).map_err(|e| {
            RadarError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed configuration (default project: {})",
            config.project_id.as_deref().unwrap_or("none")
        );
        Ok(config)
    }

    /// Loads a file, then applies process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// has an invalid value.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout override is not a number of seconds.
    pub fn apply_env_overrides<F>(config: &mut ProviderConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project_id) = lookup(ENV_PROJECT_ID) {
            debug!("Overriding project_id from environment");
            config.project_id = Some(project_id);
        }

        if let Some(organization_id) = lookup(ENV_ORGANIZATION_ID) {
            debug!("Overriding organization_id from environment");
            config.organization_id = Some(organization_id);
        }

        if let Some(timeout) = lookup(ENV_OFFBOARD_TIMEOUT_SECS) {
            debug!("Overriding offboard.timeout_secs from environment");
            config.offboard.timeout_secs = timeout.trim().parse().map_err(|e| {
                RadarError::Config(ConfigError::ParseError {
                    message: format!("Invalid {ENV_OFFBOARD_TIMEOUT_SECS} '{timeout}': {e}"),
                    location: None,
                })
            })?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                RadarError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "hcp-radar.yaml",
    "hcp-radar.yml",
    ".hcp-radar.yaml",
];

/// Finds the configuration file in `start_dir` or one of its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(RadarError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
