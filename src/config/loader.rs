//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::RegistryConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RegistryConfig, ConfigError> {
    let config: RegistryConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RegistryConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = parse_config(&content)?;

    tracing::debug!(
        path = %path.display(),
        chain_id = config.network.chain_id,
        contract = %config.contract.address,
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL_CONFIG: &str = r#"
        [network]
        chain_id = 31337
        name = "Localhost"
        rpc_url = "http://localhost:8545"
        explorer_url = ""

        [network.native_currency]
        name = "Ether"
        symbol = "ETH"
        decimals = 18

        [contract]
        address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

        [registration]
        minimum_delay_secs = 3600
        stake = "0.002"

        [transactions]
        receipt_timeout_secs = 30
        poll_interval_ms = 500
    "#;

    #[test]
    fn test_parse_local_config() {
        let config = parse_config(LOCAL_CONFIG).unwrap();
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.transactions.poll_interval_ms, 500);
        assert_eq!(config.transactions.confirmation_blocks, 1);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[network\nchain_id = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config("[transactions]\nreceipt_timeout_secs = 0").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("Validation failed: "));
        assert!(text.contains("contract.address"));
        assert!(text.contains("transactions.receipt_timeout_secs"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/registry.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("registry-config-{}.toml", fastrand::u64(..)));
        fs::write(&path, LOCAL_CONFIG).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.registration.stake, "0.002");

        fs::remove_file(&path).unwrap_or_default();
    }
}
