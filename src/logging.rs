//! Logging setup.
//!
//! All output goes to **stderr**; stdout belongs to the plugin handshake of
//! whatever process embeds this crate. `RUST_LOG` takes precedence over the
//! level chosen here.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn filter_for(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

const fn level_for(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Installs a human-readable subscriber.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(filter_for(level_for(verbose)))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Installs a JSON subscriber, one object per line.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_json_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(filter_for(level_for(verbose)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

/// Installs a human-readable subscriber unless one is already set.
///
/// Returns false if a subscriber was already installed.
pub fn try_init_logging(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(filter_for(default_level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_level() {
        assert_eq!(level_for(true), "debug");
        assert_eq!(level_for(false), "info");
    }

    #[test]
    fn test_filter_directives_parse() {
        assert!(EnvFilter::try_new("hcp_radar_reconcile=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hcp_radar_reconcile::offboard=trace").is_ok());
    }

    #[test]
    fn test_second_init_is_refused() {
        let _ = try_init_logging("info");
        assert!(!try_init_logging("debug"));
    }
}
