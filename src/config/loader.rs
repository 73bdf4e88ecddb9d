//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns a detailed error if the file doesn't exist, TOML parsing fails,
/// or validation rules are violated.
pub fn load_config(path: &str) -> Result<AppConfig> {
    let path = Path::new(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: AppConfig =
    toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;

    validate_config(&config)?;

    info!(
        sink_batch_size = config.sink.batch_size,
        config_store = %config.config_store.path,
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
    anyhow::ensure!(
        config.sink.batch_size > 0,
        "sink.batch_size must be positive"
    );
    anyhow::ensure!(
        config.sink.flush_interval_ms > 0,
        "sink.flush_interval_ms must be positive"
    );
    anyhow::ensure!(
        !config.polymarket.gamma_base_url.is_empty(),
        "polymarket.gamma_base_url must not be empty"
    );
    anyhow::ensure!(
        !config.polymarket.ws_url.is_empty(),
        "polymarket.ws_url must not be empty"
    );
    anyhow::ensure!(
        !config.kalshi.rest_base_url.is_empty(),
        "kalshi.rest_base_url must not be empty"
    );
    anyhow::ensure!(
        !config.kalshi.ws_url.is_empty(),
        "kalshi.ws_url must not be empty"
    );
    anyhow::ensure!(
        config.kalshi.private_key_path.is_none() || config.kalshi.private_key_pem.is_none(),
        "kalshi: set at most one of private_key_path / private_key_pem"
    );
    anyhow::ensure!(
        config.manager.reload_interval_s > 0,
        "manager.reload_interval_s must be positive"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_minimal_config() {
        let dir = std::env::temp_dir().join(format!(
                "lob-listener-test-{}",
                uuid::Uuid::new_v4()
            ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
[logging]
[sink]
[polymarket]
[kalshi]
[manager]
[metrics]
[config_store]
"#,
        )
            .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.sink.batch_size, 100);
        assert_eq!(config.manager.reload_interval_s, 60);

        std::fs::remove_dir_all(&dir).ok();
    }
}
