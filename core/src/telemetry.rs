// Logging setup for binaries embedding the core
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log targets used by the core, one per component. These, not the crate
/// path, are the keys for `RUST_LOG` directives such as `session=debug`.
pub const TARGETS: &[&str] = &["decoder", "rate", "reducer", "session", "source", "telemetry"];

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Initialize a fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_filter` when the variable is unset or invalid.
/// Returns an error if a global subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// use rill_core::telemetry::{init_logging, DEFAULT_FILTER};
///
/// fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     init_logging(DEFAULT_FILTER)?;
///     Ok(())
/// }
/// ```
pub fn init_logging(default_filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()?;

    info!(target: "telemetry", "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(!DEFAULT_FILTER.contains("rill_core"));
    }

    #[test]
    fn test_component_targets_are_filter_keys() {
        let directives: Vec<String> = TARGETS.iter().map(|t| format!("{t}=debug")).collect();
        let filter = EnvFilter::try_new(directives.join(","));
        assert!(filter.is_ok());
        assert!(!TARGETS.iter().any(|t| t.contains("::")));
    }
}
