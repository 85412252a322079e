//! Validation of provider configuration.
//!
//! Every problem is collected before reporting, so a user fixes a broken
//! configuration in one pass.

use crate::error::{ConfigError, RadarError, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use super::spec::ProviderConfig;

/// Role prefixes the control plane is known to accept.
const KNOWN_ROLE_PREFIXES: &[&str] = &["roles/"];

/// Validator for provider configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks a configuration without failing.
    #[must_use]
    pub fn check(&self, config: &ProviderConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_ids(config, &mut result);
        Self::validate_offboard(config, &mut result);
        Self::validate_iam(config, &mut result);

        for warning in &result.warnings {
            warn!("{warning}");
        }
        result
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if any check fails; the message counts the rest.
    pub fn validate(&self, config: &ProviderConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        let Some(first_error) = result.errors.first() else {
            debug!("Configuration validation passed");
            return Ok(result);
        };

        let message = match result.errors.len() {
            1 => first_error.message.clone(),
            n => format!("{} (and {} more)", first_error.message, n - 1),
        };
        Err(RadarError::Config(ConfigError::validation(
            message,
            first_error.field.clone(),
        )))
    }

    fn validate_ids(config: &ProviderConfig, result: &mut ValidationResult) {
        let ids = [
            ("project_id", config.project_id.as_deref()),
            ("organization_id", config.organization_id.as_deref()),
        ];
        for (field, value) in ids {
            if let Some(value) = value
                && Uuid::parse_str(value).is_err()
            {
                result.errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("'{value}' is not a valid UUID"),
                });
            }
        }
    }

    fn validate_offboard(config: &ProviderConfig, result: &mut ValidationResult) {
        let offboard = &config.offboard;

        if offboard.poll_interval_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("offboard.poll_interval_secs"),
                message: String::from("Poll interval must be at least 1 second"),
            });
        }

        if offboard.max_poll_interval_secs < offboard.poll_interval_secs {
            result.errors.push(ValidationError {
                field: String::from("offboard.max_poll_interval_secs"),
                message: format!(
                    "Maximum poll interval ({}s) is below the poll interval ({}s)",
                    offboard.max_poll_interval_secs, offboard.poll_interval_secs
                ),
            });
        }

        if offboard.timeout_secs < offboard.poll_interval_secs {
            result.errors.push(ValidationError {
                field: String::from("offboard.timeout_secs"),
                message: format!(
                    "Timeout ({}s) is shorter than one poll interval ({}s)",
                    offboard.timeout_secs, offboard.poll_interval_secs
                ),
            });
        }
    }

    fn validate_iam(config: &ProviderConfig, result: &mut ValidationResult) {
        for role in &config.iam.extra_roles {
            if role.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("iam.extra_roles"),
                    message: String::from("Role names cannot be empty"),
                });
            } else if !KNOWN_ROLE_PREFIXES.iter().any(|p| role.starts_with(p)) {
                result
                    .warnings
                    .push(format!("Role '{role}' does not start with a known prefix"));
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
