//! Schema validation for TOML configuration sections.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has the wrong TOML type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// An `http(s)://` or `ws(s)://` URL, depending on `websocket`.
	Url { websocket: bool },
	/// A 0x-prefixed 20-byte hex address.
	Address,
	/// A 32-byte hex private key, with or without 0x prefix.
	PrivateKey,
	Array(Box<FieldType>),
}

/// Type alias for field validator functions.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A field definition with name and type.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}
}

/// Schema definition with required and optional fields.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML table against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			check_field(field, value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				check_field(field, value)?;
			}
		}

		Ok(())
	}
}

fn check_field(field: &Field, value: &toml::Value) -> Result<(), ValidationError> {
	validate_field_type(&field.name, value, &field.field_type)?;
	if let Some(validator) = &field.validator {
		validator(value).map_err(|message| ValidationError::InvalidValue {
			field: field.name.clone(),
			message,
		})?;
	}
	Ok(())
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
	ValidationError::InvalidValue {
		field: field.to_string(),
		message: message.into(),
	}
}

fn is_hex_of_len(raw: &str, len: usize) -> bool {
	raw.len() == len && raw.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validates that a value matches the expected field type.
fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "string", value))?;
		}
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(field_name, "integer", value))?;
			if let Some(min_val) = min {
				if int_val < *min_val {
					return Err(invalid(
						field_name,
						format!("Value {} is less than minimum {}", int_val, min_val),
					));
				}
			}
			if let Some(max_val) = max {
				if int_val > *max_val {
					return Err(invalid(
						field_name,
						format!("Value {} is greater than maximum {}", int_val, max_val),
					));
				}
			}
		}
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(mismatch(field_name, "boolean", value));
			}
		}
		FieldType::Url { websocket } => {
			let url = value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "string", value))?;
			let schemes: &[&str] = if *websocket {
				&["ws://", "wss://"]
			} else {
				&["http://", "https://"]
			};
			if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
				return Err(invalid(
					field_name,
					format!("URL must start with {}", schemes.join(" or ")),
				));
			}
		}
		FieldType::Address => {
			let raw = value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "string", value))?;
			let hex = raw
				.strip_prefix("0x")
				.ok_or_else(|| invalid(field_name, "Address must start with 0x"))?;
			if !is_hex_of_len(hex, 40) {
				return Err(invalid(field_name, "Address must be 20 bytes of hex"));
			}
		}
		FieldType::PrivateKey => {
			let raw = value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "string", value))?;
			let hex = raw.strip_prefix("0x").unwrap_or(raw);
			if !is_hex_of_len(hex, 64) {
				return Err(invalid(
					field_name,
					"Private key must be 64 hex characters (32 bytes)",
				));
			}
		}
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| mismatch(field_name, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				validate_field_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
		}
	}

	Ok(())
}

/// A configuration section that knows how to validate itself.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn relay_schema() -> Schema {
		Schema::new(
			vec![
				Field::new("base_url", FieldType::Url { websocket: false }),
				Field::new("api_key", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(key) if !key.is_empty() => Ok(()),
						_ => Err("API key must not be empty".to_string()),
					}
				}),
			],
			vec![
				Field::new(
					"timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("contracts", FieldType::Array(Box::new(FieldType::Address))),
			],
		)
	}

	#[test]
	fn test_valid_section_passes() {
		let config: toml::Value = toml::from_str(
			r#"
			base_url = "https://relay.example"
			api_key = "key"
			timeout_secs = 600
			contracts = ["0x00000000000000000000000000000000000000aa"]
			"#,
		)
		.unwrap();
		assert!(relay_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_and_invalid_fields() {
		let missing: toml::Value = toml::from_str(r#"base_url = "https://relay.example""#).unwrap();
		assert!(matches!(
			relay_schema().validate(&missing),
			Err(ValidationError::MissingField(f)) if f == "api_key"
		));

		let bad_url: toml::Value =
			toml::from_str("base_url = \"ftp://relay\"\napi_key = \"k\"").unwrap();
		assert!(matches!(
			relay_schema().validate(&bad_url),
			Err(ValidationError::InvalidValue { field, .. }) if field == "base_url"
		));

		let bad_address: toml::Value = toml::from_str(
			"base_url = \"http://relay\"\napi_key = \"k\"\ncontracts = [\"0x12\"]",
		)
		.unwrap();
		assert!(matches!(
			relay_schema().validate(&bad_address),
			Err(ValidationError::InvalidValue { field, .. }) if field == "contracts[0]"
		));
	}

	#[test]
	fn test_private_key_field() {
		let schema = Schema::new(vec![Field::new("private_key", FieldType::PrivateKey)], vec![]);
		let ok: toml::Value = toml::from_str(&format!("private_key = \"0x{}\"", "ab".repeat(32))).unwrap();
		assert!(schema.validate(&ok).is_ok());
		let short: toml::Value = toml::from_str("private_key = \"0xabcd\"").unwrap();
		assert!(schema.validate(&short).is_err());
	}
}
