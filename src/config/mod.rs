//! Provider configuration.
//!
//! This module handles all configuration-related functionality:
//! - Parsing the provider YAML file with `.env` and environment overrides
//! - Validation of configuration values
//! - Fingerprinting sensitive payloads for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::PayloadHasher;
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_OFFBOARD_TIMEOUT_SECS, ENV_ORGANIZATION_ID,
    ENV_PROJECT_ID, find_config_file,
};
pub use spec::{IamConfig, OffboardConfig, ProviderConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
