//! Relayer configuration.
//!
//! TOML file with `${VAR}` environment substitution (so secrets like the
//! signing key never live in the file), `RELAYER_*` environment
//! overrides for deployment knobs, and validation at load time.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
	pub relayer: RelayerSection,
	pub chain: ChainSection,
	pub account: AccountSection,
	/// Absent means the sponsored path is disabled and every intent
	/// executes self-funded.
	pub bundler: Option<BundlerSection>,
	#[serde(default)]
	pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerSection {
	pub name: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSection {
	pub rpc_url: String,
	pub chain_id: u64,
	pub router_address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSection {
	pub private_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlerSection {
	pub url: String,
	pub entry_point: Address,
	/// The relayer's smart account, sender of sponsored operations.
	pub smart_account: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
	#[serde(default = "default_ttl_seconds")]
	pub ttl_seconds: u64,
	#[serde(default = "default_reap_interval_seconds")]
	pub reap_interval_seconds: u64,
}

impl Default for StoreSection {
	fn default() -> Self {
		Self {
			ttl_seconds: default_ttl_seconds(),
			reap_interval_seconds: default_reap_interval_seconds(),
		}
	}
}

fn default_http_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_ttl_seconds() -> u64 {
	600
}

fn default_reap_interval_seconds() -> u64 {
	60
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "RELAYER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<RelayerConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		let content = tokio::fs::read_to_string(file_path).await?;
		let mut config = self.parse(&content)?;

		self.apply_env_overrides(&mut config)?;
		validate(&config)?;

		Ok(config)
	}

	fn parse(&self, content: &str) -> Result<RelayerConfig, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;
		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	/// Replaces `${VAR_NAME}` patterns with the environment value.
	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();
		let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut RelayerConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.relayer.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.relayer.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		Ok(())
	}
}

fn validate(config: &RelayerConfig) -> Result<(), ConfigError> {
	if !config.chain.rpc_url.starts_with("http://") && !config.chain.rpc_url.starts_with("https://")
	{
		return Err(ConfigError::ValidationError(
			"chain.rpc_url must start with http:// or https://".to_string(),
		));
	}

	if config.chain.chain_id == 0 {
		return Err(ConfigError::ValidationError(
			"chain.chain_id must be non-zero".to_string(),
		));
	}

	if config.chain.router_address == Address::ZERO {
		return Err(ConfigError::ValidationError(
			"chain.router_address must not be the zero address".to_string(),
		));
	}

	if config.store.ttl_seconds == 0 {
		return Err(ConfigError::ValidationError(
			"store.ttl_seconds must be positive".to_string(),
		));
	}

	if let Some(bundler) = &config.bundler {
		if bundler.entry_point == Address::ZERO || bundler.smart_account == Address::ZERO {
			return Err(ConfigError::ValidationError(
				"bundler.entry_point and bundler.smart_account must not be zero".to_string(),
			));
		}
	}

	Ok(())
}
