//! Cell values of a row.

use crate::catalog::ColumnType;
use crate::error::ValidationError;
use crate::model::ReferenceRow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One value of a row, aligned with a column of the owning grid.
///
/// Serialized untagged so a row renders as `["Ann", 0, [{"uuid": ...}]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    References(Vec<ReferenceRow>),
}

impl Value {
    /// Value given to a freshly added row: `[]` for references, `0` for
    /// integers and `""` for everything else.
    pub fn default_for(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Reference => Value::References(Vec::new()),
            ColumnType::Int => Value::Int(0),
            _ => Value::Text(String::new()),
        }
    }

    /// Coerce a JSON change value to the storage type of a column.
    ///
    /// Reference columns never accept scalar values.
    pub fn coerce(
        column_type: ColumnType,
        raw: &serde_json::Value,
    ) -> Result<Self, ValidationError> {
        use serde_json::Value as Json;

        match (column_type, raw) {
            (ColumnType::Reference, _) => Err(ValidationError::invalid(
                "changeValue",
                "reference columns hold relationships, not scalar values",
            )),
            (_, Json::Null) => Ok(Value::Null),
            (ColumnType::Int, Json::Number(n)) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| ValidationError::invalid("changeValue", format!("{} is not an integer", n))),
            (ColumnType::Int, Json::String(s)) => s
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| ValidationError::invalid("changeValue", format!("'{}' is not an integer", s))),
            (ColumnType::Boolean, Json::Bool(b)) => Ok(Value::Bool(*b)),
            (ColumnType::Boolean, Json::String(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ValidationError::invalid(
                    "changeValue",
                    format!("'{}' is not a boolean", s),
                )),
            },
            (ColumnType::Int | ColumnType::Boolean, other) => Err(ValidationError::invalid(
                "changeValue",
                format!("{} cannot be stored in a {} column", other, column_type),
            )),
            (_, Json::String(s)) => Ok(Value::Text(s.clone())),
            (_, other) => Err(ValidationError::invalid(
                "changeValue",
                format!("{} cannot be stored in a {} column", other, column_type),
            )),
        }
    }

    pub fn as_references(&self) -> Option<&Vec<ReferenceRow>> {
        match self {
            Value::References(refs) => Some(refs),
            _ => None,
        }
    }

    pub fn as_references_mut(&mut self) -> Option<&mut Vec<ReferenceRow>> {
        match self {
            Value::References(refs) => Some(refs),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::References(refs) => {
                let parts: Vec<&str> = refs.iter().map(|r| r.display_string.as_str()).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_defaults_by_type() {
        assert_eq!(Value::default_for(ColumnType::Reference), Value::References(vec![]));
        assert_eq!(Value::default_for(ColumnType::Int), Value::Int(0));
        assert_eq!(Value::default_for(ColumnType::Text), Value::Text(String::new()));
        assert_eq!(Value::default_for(ColumnType::Boolean), Value::Text(String::new()));
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(Value::coerce(ColumnType::Int, &json!(42)), Ok(Value::Int(42)));
        assert_eq!(Value::coerce(ColumnType::Int, &json!(" 7 ")), Ok(Value::Int(7)));
        assert!(Value::coerce(ColumnType::Int, &json!("seven")).is_err());
        assert!(Value::coerce(ColumnType::Int, &json!(1.5)).is_err());
    }

    #[test]
    fn test_coerce_text_and_bool() {
        assert_eq!(
            Value::coerce(ColumnType::Text, &json!("Ann")),
            Ok(Value::Text("Ann".to_string()))
        );
        assert!(Value::coerce(ColumnType::Text, &json!(3)).is_err());
        assert_eq!(Value::coerce(ColumnType::Boolean, &json!(true)), Ok(Value::Bool(true)));
        assert!(Value::coerce(ColumnType::Boolean, &json!("yes")).is_err());
    }

    #[test]
    fn test_coerce_rejects_reference_columns() {
        let err = Value::coerce(ColumnType::Reference, &json!("x"));
        assert!(matches!(err, Err(ValidationError::InvalidValue { .. })));
    }

    #[test]
    fn test_untagged_serialization() {
        let manager = ReferenceRow::new(Uuid::nil(), vec!["Bob".to_string()]);
        let values = vec![
            Value::Text("Ann".to_string()),
            Value::Int(0),
            Value::References(vec![manager]),
        ];
        assert_eq!(
            serde_json::to_value(&values).ok(),
            Some(json!([
                "Ann",
                0,
                [{"uuid": "00000000-0000-0000-0000-000000000000", "displayString": "Bob"}]
            ]))
        );
    }
}
