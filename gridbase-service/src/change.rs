//! Change operations.
//!
//! Requests carry changes as loosely shaped JSON objects. They are checked
//! once, up front, and turned into the closed [`Operation`] union that the
//! engine matches exhaustively.

use gridbase_core::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A change as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    #[serde(default)]
    pub change_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_value: Option<serde_json::Value>,
}

/// Payload of a relationship change: the referenced row and its display values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePayload {
    pub uuid: Uuid,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A validated change.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Add {
        grid_uuid: Uuid,
        row_uuid: Uuid,
    },
    Update {
        grid_uuid: Uuid,
        column_uuid: Uuid,
        row_uuid: Uuid,
        value: serde_json::Value,
    },
    AddRelationship {
        grid_uuid: Uuid,
        column_uuid: Uuid,
        row_uuid: Uuid,
        reference: ReferencePayload,
    },
    RemoveRelationship {
        grid_uuid: Uuid,
        column_uuid: Uuid,
        row_uuid: Uuid,
        reference_uuid: Uuid,
    },
    Load {
        grid_uuid: Uuid,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add { .. } => "add",
            Operation::Update { .. } => "update",
            Operation::AddRelationship { .. } => "addRelationship",
            Operation::RemoveRelationship { .. } => "removeRelationship",
            Operation::Load { .. } => "load",
        }
    }

    pub fn grid_uuid(&self) -> Uuid {
        match self {
            Operation::Add { grid_uuid, .. }
            | Operation::Update { grid_uuid, .. }
            | Operation::AddRelationship { grid_uuid, .. }
            | Operation::RemoveRelationship { grid_uuid, .. }
            | Operation::Load { grid_uuid } => *grid_uuid,
        }
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ValidationError> {
    value.ok_or_else(|| ValidationError::missing(field))
}

/// Parse a relationship payload; string values are kept, others stringified.
fn reference_payload(raw: Option<&serde_json::Value>, require_values: bool) -> Result<ReferencePayload, ValidationError> {
    let raw = match raw {
        Some(raw) if !raw.is_null() => raw,
        _ => return Err(ValidationError::missing("change value")),
    };
    let uuid = raw
        .get("uuid")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ValidationError::missing("reference UUID"))?;
    let uuid = Uuid::parse_str(uuid).map_err(|e| ValidationError::invalid("reference UUID", e.to_string()))?;

    let values: Vec<String> = raw
        .get("values")
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    if require_values && values.is_empty() {
        return Err(ValidationError::missing("reference values"));
    }
    Ok(ReferencePayload { uuid, values })
}

impl TryFrom<&ChangeRequest> for Operation {
    type Error = ValidationError;

    fn try_from(change: &ChangeRequest) -> Result<Self, Self::Error> {
        let grid_uuid = required(change.grid_uuid, "grid UUID")?;
        match change.change_type.as_str() {
            "add" => Ok(Operation::Add {
                grid_uuid,
                row_uuid: required(change.row_uuid, "row UUID")?,
            }),
            "update" => Ok(Operation::Update {
                grid_uuid,
                column_uuid: required(change.column_uuid, "column UUID")?,
                row_uuid: required(change.row_uuid, "row UUID")?,
                value: change.change_value.clone().unwrap_or(serde_json::Value::Null),
            }),
            "addRelationship" => Ok(Operation::AddRelationship {
                grid_uuid,
                column_uuid: required(change.column_uuid, "column UUID")?,
                row_uuid: required(change.row_uuid, "row UUID")?,
                reference: reference_payload(change.change_value.as_ref(), true)?,
            }),
            "removeRelationship" => Ok(Operation::RemoveRelationship {
                grid_uuid,
                column_uuid: required(change.column_uuid, "column UUID")?,
                row_uuid: required(change.row_uuid, "row UUID")?,
                reference_uuid: reference_payload(change.change_value.as_ref(), false)?.uuid,
            }),
            "load" => Ok(Operation::Load { grid_uuid }),
            "" => Err(ValidationError::missing("change type")),
            other => Err(ValidationError::invalid("changeType", format!("unknown change type '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<Operation, ValidationError> {
        let change: ChangeRequest = serde_json::from_value(value).map_err(|e| ValidationError::invalid("change", e.to_string()))?;
        Operation::try_from(&change)
    }

    #[test]
    fn test_add_requires_row_uuid() {
        let grid = Uuid::from_u128(1);
        let err = parse(json!({"changeType": "add", "gridUuid": grid}));
        assert_eq!(err, Err(ValidationError::missing("row UUID")));

        let op = parse(json!({"changeType": "add", "gridUuid": grid, "rowUuid": grid}));
        assert_eq!(op, Ok(Operation::Add { grid_uuid: grid, row_uuid: grid }));
    }

    #[test]
    fn test_relationship_payload() -> Result<(), ValidationError> {
        let id = Uuid::from_u128(2);
        let op = parse(json!({
            "changeType": "addRelationship",
            "gridUuid": id, "columnUuid": id, "rowUuid": id,
            "changeValue": {"uuid": id.to_string(), "values": ["Bob", 42]}
        }))?;
        match op {
            Operation::AddRelationship { reference, .. } => {
                assert_eq!(reference.values, vec!["Bob".to_string(), "42".to_string()]);
            }
            other => panic!("unexpected operation {:?}", other),
        }

        let err = parse(json!({
            "changeType": "addRelationship",
            "gridUuid": id, "columnUuid": id, "rowUuid": id,
            "changeValue": {"uuid": id.to_string(), "values": []}
        }));
        assert_eq!(err, Err(ValidationError::missing("reference values")));

        let op = parse(json!({
            "changeType": "removeRelationship",
            "gridUuid": id, "columnUuid": id, "rowUuid": id,
            "changeValue": {"uuid": id.to_string()}
        }))?;
        assert_eq!(op.name(), "removeRelationship");
        Ok(())
    }

    #[test]
    fn test_unknown_change_type() {
        let err = parse(json!({"changeType": "drop", "gridUuid": Uuid::nil()}));
        assert!(matches!(err, Err(ValidationError::InvalidValue { .. })));
    }
}
