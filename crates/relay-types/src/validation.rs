//! Schema checks for the TOML tables handed to pluggable implementations.
//!
//! Each account, chain client and storage backend describes the shape of its
//! own configuration table with a [`Schema`]. The table is checked before the
//! implementation is constructed, so a typo in a key surfaces as a named
//! field error instead of a failure deep inside a factory.

use thiserror::Error;

/// Errors produced while checking a table against a [`Schema`].
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	/// Prefixes the offending field path with `parent`.
	fn nested_under(self, parent: &str) -> Self {
		match self {
			Self::MissingField(f) => Self::MissingField(format!("{}.{}", parent, f)),
			Self::InvalidValue { field, message } => Self::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			Self::TypeMismatch {
				field,
				expected,
				actual,
			} => Self::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
			other => other,
		}
	}

	fn mismatch(field: &str, expected: &str, value: &toml::Value) -> Self {
		Self::TypeMismatch {
			field: field.to_string(),
			expected: expected.to_string(),
			actual: value.type_str().to_string(),
		}
	}
}

/// Expected shape of a single value.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with inclusive bounds.
	Integer {
		min: Option<i64>,
		max: Option<i64>,
	},
	/// Float; integers are accepted too since TOML writes `2` and `2.0`
	/// differently.
	Float {
		min: Option<f64>,
	},
	Boolean,
	Array(Box<FieldType>),
	Table(Schema),
}

/// Extra check run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named entry in a [`Schema`].
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

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a TOML table. Unknown keys are ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks `config`, stopping at the first offending field.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn check_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(ValidationError::mismatch(field_name, "string", value));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| ValidationError::mismatch(field_name, "integer", value))?;
			if let Some(min_val) = min.filter(|m| int_val < *m) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("Value {} is less than minimum {}", int_val, min_val),
				});
			}
			if let Some(max_val) = max.filter(|m| int_val > *m) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("Value {} is greater than maximum {}", int_val, max_val),
				});
			}
		},
		FieldType::Float { min } => {
			let float_val = value
				.as_float()
				.or_else(|| value.as_integer().map(|i| i as f64))
				.ok_or_else(|| ValidationError::mismatch(field_name, "float", value))?;
			if let Some(min_val) = min.filter(|m| float_val < *m) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("Value {} is less than minimum {}", float_val, min_val),
				});
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(ValidationError::mismatch(field_name, "boolean", value));
			}
		},
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| ValidationError::mismatch(field_name, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				check_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
		},
		FieldType::Table(schema) => {
			schema
				.validate(value)
				.map_err(|e| e.nested_under(field_name))?;
		},
	}

	Ok(())
}

/// Implemented by every pluggable implementation to describe its table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

/// Validator accepting a 20-byte hex address with `0x` prefix.
pub fn address_validator(value: &toml::Value) -> Result<(), String> {
	let s = value.as_str().ok_or("expected string")?;
	let digits = s
		.strip_prefix("0x")
		.ok_or_else(|| format!("'{}' is missing the 0x prefix", s))?;
	if digits.len() != 40 || hex::decode(digits).is_err() {
		return Err(format!("'{}' is not a 20-byte hex address", s));
	}
	Ok(())
}

/// Validator accepting a 32-byte hex private key, with or without `0x`.
pub fn private_key_validator(value: &toml::Value) -> Result<(), String> {
	let s = value.as_str().ok_or("expected string")?;
	let digits = crate::without_0x_prefix(s);
	if digits.len() != 64 || hex::decode(digits).is_err() {
		return Err("private key must be 32 bytes of hex".to_string());
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn keystore_schema() -> Schema {
		Schema::new(
			vec![Field::new(
				"keys",
				FieldType::Array(Box::new(FieldType::Table(Schema::new(
					vec![
						Field::new("private_key", FieldType::String)
							.with_validator(private_key_validator),
					],
					vec![Field::new("passphrase", FieldType::String)],
				)))),
			)],
			vec![Field::new("multiplier", FieldType::Float { min: Some(1.0) })],
		)
	}

	#[test]
	fn test_valid_table_passes() {
		let config: toml::Value = toml::from_str(
			r#"
			multiplier = 2
			[[keys]]
			private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
			passphrase = "relay"
			"#,
		)
		.unwrap();
		assert!(keystore_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_nested_errors_carry_path() {
		let config: toml::Value = toml::from_str(
			r#"
			[[keys]]
			passphrase = "relay"
			"#,
		)
		.unwrap();
		assert_eq!(
			keystore_schema().validate(&config),
			Err(ValidationError::MissingField("keys[0].private_key".into()))
		);
	}

	#[test]
	fn test_float_minimum() {
		let config: toml::Value = toml::from_str(
			r#"
			keys = []
			multiplier = 0.5
			"#,
		)
		.unwrap();
		assert!(matches!(
			keystore_schema().validate(&config),
			Err(ValidationError::InvalidValue { field, .. }) if field == "multiplier"
		));
	}

	#[test]
	fn test_address_validator() {
		let ok = toml::Value::String("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into());
		assert!(address_validator(&ok).is_ok());
		let short = toml::Value::String("0x1234".into());
		assert!(address_validator(&short).is_err());
		let bare = toml::Value::String("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into());
		assert!(address_validator(&bare).is_err());
	}
}
