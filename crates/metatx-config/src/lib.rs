// metatx-config/src/lib.rs

use metatx_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::env;
use std::path::Path;
use thiserror::Error;

pub mod types;

pub use types::*;

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

impl From<ValidationError> for ConfigError {
	fn from(err: ValidationError) -> Self {
		ConfigError::ValidationError(err.to_string())
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "METATX_".to_string(),
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

	pub async fn load(&self) -> Result<MetaTxConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}

		let content = tokio::fs::read_to_string(file_path).await?;
		tracing::debug!(path = %file_path, "Loaded configuration file");
		self.load_str(&content)
	}

	/// Parses, overrides and validates configuration from a TOML string.
	pub fn load_str(&self, content: &str) -> Result<MetaTxConfig, ConfigError> {
		let substituted_content = self.substitute_env_vars(content)?;

		let raw: toml::Value = toml::from_str(&substituted_content)
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;
		validate_sections(&raw)?;

		let mut config: MetaTxConfig = raw
			.try_into()
			.map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config)?;
		self.validate_config(&config)?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = regex::Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut MetaTxConfig) -> Result<(), ConfigError> {
		if let Ok(api_key) = env::var(format!("{}API_KEY", self.env_prefix)) {
			config.sdk.api_key = api_key;
		}

		if let Ok(strict) = env::var(format!("{}STRICT_MODE", self.env_prefix)) {
			config.sdk.strict_mode = strict
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid strict mode: {}", e)))?;
		}

		if let Ok(rpc_url) = env::var(format!("{}RPC_URL", self.env_prefix)) {
			config.network.rpc_url = rpc_url;
		}

		if let Ok(base_url) = env::var(format!("{}RELAY_URL", self.env_prefix)) {
			config.relay.base_url = base_url;
		}

		Ok(())
	}

	fn validate_config(&self, config: &MetaTxConfig) -> Result<(), ConfigError> {
		if config.sdk.api_key.trim().is_empty() {
			return Err(ConfigError::ValidationError(
				"sdk.api_key must not be empty".to_string(),
			));
		}

		if config.relay.timeout_secs == 0 {
			return Err(ConfigError::ValidationError(
				"relay.timeout_secs must be greater than zero".to_string(),
			));
		}

		if config.notifier.initial_backoff_ms > config.notifier.max_backoff_ms {
			return Err(ConfigError::ValidationError(
				"notifier.initial_backoff_ms must not exceed notifier.max_backoff_ms".to_string(),
			));
		}

		Ok(())
	}
}

/// Schema for the `[sdk]` section.
pub struct SdkSectionSchema;

impl ConfigSchema for SdkSectionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("api_key", FieldType::String)],
			vec![
				Field::new("strict_mode", FieldType::Boolean),
				Field::new(
					"contract_addresses",
					FieldType::Array(Box::new(FieldType::Address)),
				),
			],
		)
		.validate(config)
	}
}

/// Schema for the `[relay]` section.
pub struct RelaySectionSchema;

impl ConfigSchema for RelaySectionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("base_url", FieldType::Url { websocket: false })],
			vec![
				Field::new("dapp_api_url", FieldType::Url { websocket: false }),
				Field::new(
					"timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("sdk_version", FieldType::String),
			],
		)
		.validate(config)
	}
}

/// Schema for the `[network]` section.
pub struct NetworkSectionSchema;

impl ConfigSchema for NetworkSectionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("rpc_url", FieldType::Url { websocket: false })],
			vec![Field::new("json_rpc_url", FieldType::Url { websocket: false })],
		)
		.validate(config)
	}
}

/// Schema for the `[wallet]` section.
pub struct WalletSectionSchema;

impl ConfigSchema for WalletSectionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![Field::new("private_key", FieldType::PrivateKey)], vec![]).validate(config)
	}
}

/// Schema for the `[notifier]` section.
pub struct NotifierSectionSchema;

impl ConfigSchema for NotifierSectionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let non_negative = || FieldType::Integer {
			min: Some(0),
			max: None,
		};
		Schema::new(
			vec![],
			vec![
				Field::new("endpoint", FieldType::Url { websocket: true }),
				Field::new("enabled", FieldType::Boolean),
				Field::new("max_retries", non_negative()),
				Field::new("initial_backoff_ms", non_negative()),
				Field::new("max_backoff_ms", non_negative()),
				Field::new(
					"subscription_ttl_secs",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
		)
		.validate(config)
	}
}

fn validate_sections(raw: &toml::Value) -> Result<(), ConfigError> {
	let sections: [(&str, bool, &dyn ConfigSchema); 5] = [
		("sdk", true, &SdkSectionSchema),
		("relay", true, &RelaySectionSchema),
		("network", true, &NetworkSectionSchema),
		("wallet", false, &WalletSectionSchema),
		("notifier", false, &NotifierSectionSchema),
	];

	for (name, required, schema) in sections {
		match raw.get(name) {
			Some(section) => schema.validate(section).map_err(|e| {
				ConfigError::ValidationError(format!("[{}] {}", name, e))
			})?,
			None if required => {
				return Err(ConfigError::ValidationError(format!(
					"Missing section [{}]",
					name
				)))
			}
			None => {}
		}
	}

	Ok(())
}
