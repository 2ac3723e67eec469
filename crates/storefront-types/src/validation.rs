//! TOML schema validation for pluggable implementation sections.
//!
//! Storage backends are configured through free-form TOML tables
//! (`[storage.implementations.<name>]`). Each backend describes the keys it
//! understands with a [`Schema`] so a typo is reported at start-up instead of
//! being silently ignored.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
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
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
}

/// A named, typed field in a schema.
#[derive(Debug)]
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}
}

/// Required and optional fields of a TOML table.
///
/// Keys that are neither required nor optional are rejected.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
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

		for key in table.keys() {
			let known = self
				.required
				.iter()
				.chain(self.optional.iter())
				.any(|f| &f.name == key);
			if !known {
				return Err(ValidationError::UnknownField(key.clone()));
			}
		}

		Ok(())
	}
}

fn check_field(field: &Field, value: &toml::Value) -> Result<(), ValidationError> {
	let FieldType::Integer { min, max } = &field.field_type else {
		if value.is_str() {
			return Ok(());
		}
		return Err(ValidationError::TypeMismatch {
			field: field.name.clone(),
			expected: "string".to_string(),
			actual: value.type_str().to_string(),
		});
	};

	let int_val = value
		.as_integer()
		.ok_or_else(|| ValidationError::TypeMismatch {
			field: field.name.clone(),
			expected: "integer".to_string(),
			actual: value.type_str().to_string(),
		})?;
	let out_of_range = |message: String| ValidationError::InvalidValue {
		field: field.name.clone(),
		message,
	};
	if let Some(min_val) = min.filter(|m| int_val < *m) {
		return Err(out_of_range(format!("{} is below the minimum of {}", int_val, min_val)));
	}
	if let Some(max_val) = max.filter(|m| int_val > *m) {
		return Err(out_of_range(format!("{} is above the maximum of {}", int_val, max_val)));
	}
	Ok(())
}

/// A configuration schema that can validate TOML values.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
