use serde_json::Value;

pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableValue, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::String(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

/// Like [`classify_nullable`] for fields that must be non-null strings when
/// present.
pub fn classify_string(field: &str, optional_value: Option<&Value>) -> Result<Option<String>, String> {
    match classify_nullable(optional_value) {
        Ok(NullableValue::Omitted) => Ok(None),
        Ok(NullableValue::String(value)) => Ok(Some(value)),
        Ok(NullableValue::Null) => Err(format!("{field} cannot be null")),
        Err(_) => Err(format!("{field} must be a string")),
    }
}

pub fn classify_bool(field: &str, optional_value: Option<&Value>) -> Result<Option<bool>, String> {
    match optional_value {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(format!("{field} must be a boolean")),
    }
}
