//! Configuration module for the ledger transaction engine.
//!
//! This module provides the structures that describe a ledger client
//! deployment: which identity it acts for, how long confirmations may take,
//! and which storage medium and ledger gateway implementations to wire in.
//! Configuration is loaded from TOML with `${VAR}` and `${VAR:-default}`
//! environment substitution and validated before use.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for a ledger client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Client identity settings.
	pub client: ClientConfig,
	/// Confirmation monitoring settings.
	#[serde(default)]
	pub monitor: MonitorConfig,
	/// Durable medium for transaction history.
	pub storage: StorageConfig,
	/// Ledger gateway selection.
	pub gateway: GatewayConfig,
}

/// Configuration specific to the client instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
	/// Name of this client instance, used in logs.
	pub id: String,
	/// Principal the client submits transfers for.
	pub identity: String,
}

/// Confirmation monitoring configuration.
///
/// The timeout is one deadline for every transaction handled by the
/// client; it cannot be changed per transfer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
	/// Seconds a transfer may stay pending before it is failed.
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
	/// Seconds between two confirmation checks of the same transfer.
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
}

impl MonitorConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_seconds)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_seconds)
	}
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			timeout_seconds: default_timeout_seconds(),
			poll_interval_seconds: default_poll_interval_seconds(),
		}
	}
}

fn default_timeout_seconds() -> u64 {
	60
}

fn default_poll_interval_seconds() -> u64 {
	3
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the ledger gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of gateway implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut output = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		output.push_str(&input[last_end..full_match.start()]);
		output.push_str(&value);
		last_end = full_match.end();
	}
	output.push_str(&input[last_end..]);

	Ok(output)
}

impl Config {
	/// Loads and validates configuration from a TOML file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.display(), e),
			))
		})?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.client.id.trim().is_empty() {
			return Err(ConfigError::Validation("Client ID cannot be empty".into()));
		}
		if self.client.identity.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Client identity cannot be empty".into(),
			));
		}

		// Monitor bounds
		if self.monitor.timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"monitor.timeout_seconds must be greater than 0".into(),
			));
		}
		if self.monitor.timeout_seconds > 3600 {
			return Err(ConfigError::Validation(
				"monitor.timeout_seconds cannot exceed 3600 (1 hour)".into(),
			));
		}
		if self.monitor.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"monitor.poll_interval_seconds must be greater than 0".into(),
			));
		}
		if self.monitor.poll_interval_seconds >= self.monitor.timeout_seconds {
			return Err(ConfigError::Validation(format!(
				"monitor.poll_interval_seconds ({}) must be shorter than monitor.timeout_seconds ({})",
				self.monitor.poll_interval_seconds, self.monitor.timeout_seconds
			)));
		}

		validate_primary(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;
		validate_primary(
			"gateway",
			&self.gateway.primary,
			&self.gateway.implementations,
		)?;

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved first and the result is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE_CONFIG: &str = r#"
[client]
id = "test-client"
identity = "aaaaa-aa"

[storage]
primary = "memory"
[storage.implementations.memory]

[gateway]
primary = "simulated"
[gateway.implementations.simulated]
expected_fee = 10000
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("LEDGER_TEST_HOST", "localhost");
		std::env::set_var("LEDGER_TEST_PORT", "4943");

		let input = "url = \"http://${LEDGER_TEST_HOST}:${LEDGER_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "url = \"http://localhost:4943\"");

		std::env::remove_var("LEDGER_TEST_HOST");
		std::env::remove_var("LEDGER_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${LEDGER_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${LEDGER_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("LEDGER_MISSING_VAR"));
	}

	#[test]
	fn test_monitor_defaults() {
		let config: Config = BASE_CONFIG.parse().unwrap();
		assert_eq!(config.client.id, "test-client");
		assert_eq!(config.monitor.timeout(), Duration::from_secs(60));
		assert_eq!(config.monitor.poll_interval(), Duration::from_secs(3));
		assert_eq!(config.gateway.primary, "simulated");
	}

	#[test]
	fn test_identity_from_env() {
		std::env::set_var("LEDGER_TEST_IDENTITY", "rrkah-fqaaa");
		let config_str = BASE_CONFIG.replace("\"aaaaa-aa\"", "\"${LEDGER_TEST_IDENTITY}\"");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.client.identity, "rrkah-fqaaa");
		std::env::remove_var("LEDGER_TEST_IDENTITY");
	}

	#[test]
	fn test_primary_must_exist() {
		let config_str = BASE_CONFIG.replace("primary = \"memory\"", "primary = \"file\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary storage 'file' not found in implementations"));
	}

	#[test]
	fn test_poll_interval_must_be_shorter_than_timeout() {
		let config_str = format!(
			"{}\n[monitor]\ntimeout_seconds = 5\npoll_interval_seconds = 5\n",
			BASE_CONFIG
		);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("must be shorter than"));
	}

	#[test]
	fn test_zero_timeout_rejected() {
		let config_str = format!("{}\n[monitor]\ntimeout_seconds = 0\n", BASE_CONFIG);
		assert!(Config::from_str(&config_str).is_err());
	}

	#[test]
	fn test_empty_identity_rejected() {
		let config_str = BASE_CONFIG.replace("\"aaaaa-aa\"", "\"\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("identity"));
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, BASE_CONFIG).unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.client.identity, "aaaaa-aa");
		assert!(config.storage.implementations.contains_key("memory"));
	}

	#[tokio::test]
	async fn test_from_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let result = Config::from_file(dir.path().join("missing.toml")).await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
