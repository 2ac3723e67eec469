//! Parameter maps for gateway requests and callbacks.

use crate::SignatureError;
use std::collections::BTreeMap;
use std::fmt;

/// A scalar request parameter.
///
/// The gateway only ever signs strings and integers; anything else has no
/// agreed textual form and is refused at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
	Integer(i64),
	Text(String),
}

impl fmt::Display for ParamValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ParamValue::Integer(n) => write!(f, "{}", n),
			ParamValue::Text(s) => f.write_str(s),
		}
	}
}

impl From<&str> for ParamValue {
	fn from(s: &str) -> Self {
		ParamValue::Text(s.to_string())
	}
}

impl From<String> for ParamValue {
	fn from(s: String) -> Self {
		ParamValue::Text(s)
	}
}

impl From<i64> for ParamValue {
	fn from(n: i64) -> Self {
		ParamValue::Integer(n)
	}
}

impl From<u32> for ParamValue {
	fn from(n: u32) -> Self {
		ParamValue::Integer(i64::from(n))
	}
}

impl ParamValue {
	/// Converts a JSON value, refusing anything that is not a string or an
	/// integral number.
	pub fn from_json(field: &str, value: &serde_json::Value) -> Result<Self, SignatureError> {
		let invalid = |kind: &str| SignatureError::InvalidArgument {
			field: field.to_string(),
			kind: kind.to_string(),
		};

		match value {
			serde_json::Value::String(s) => Ok(ParamValue::Text(s.clone())),
			serde_json::Value::Number(n) => {
				if let Some(i) = n.as_i64() {
					Ok(ParamValue::Integer(i))
				} else if n.is_u64() {
					Err(invalid("integer out of range"))
				} else {
					match n.as_f64() {
						Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
							Ok(ParamValue::Integer(f as i64))
						},
						_ => Err(invalid("non-integral number")),
					}
				}
			},
			serde_json::Value::Null => Err(invalid("null")),
			serde_json::Value::Bool(_) => Err(invalid("boolean")),
			serde_json::Value::Array(_) => Err(invalid("array")),
			serde_json::Value::Object(_) => Err(invalid("object")),
		}
	}
}

/// Field name to scalar value.
///
/// A `BTreeMap` keeps keys in byte order, which for UTF-8 strings is the
/// codepoint order the canonical string requires, regardless of the order
/// in which fields were inserted.
pub type ParameterMap = BTreeMap<String, ParamValue>;

/// Builds a [`ParameterMap`] from a JSON object.
pub fn params_from_json(value: &serde_json::Value) -> Result<ParameterMap, SignatureError> {
	let object = value
		.as_object()
		.ok_or_else(|| SignatureError::InvalidArgument {
			field: "<root>".to_string(),
			kind: "expected an object of scalar values".to_string(),
		})?;

	object
		.iter()
		.map(|(k, v)| Ok((k.clone(), ParamValue::from_json(k, v)?)))
		.collect()
}

/// Builds a [`ParameterMap`] from string pairs, as received in a form body.
pub fn params_from_pairs<I, K, V>(pairs: I) -> ParameterMap
where
	I: IntoIterator<Item = (K, V)>,
	K: Into<String>,
	V: Into<String>,
{
	pairs
		.into_iter()
		.map(|(k, v)| (k.into(), ParamValue::Text(v.into())))
		.collect()
}
