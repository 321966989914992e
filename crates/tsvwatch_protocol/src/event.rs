//! The parsed event record and its static field table.
//!
//! Every place that needs to walk an event field by field (the TSV parser,
//! the key-value backend, report consumers) goes through [`EVENT_FIELDS`].

use crate::ids::EventId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One record parsed from an input file.
///
/// Immutable once parsed. `id` is assigned at parse time and never comes
/// from the input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub number: i64,
    pub mqtt: String,
    pub inventory_id: String,
    pub unit_guid: String,
    pub message_id: String,
    pub message_text: String,
    pub context: String,
    pub message_class: String,
    pub level: i64,
    pub area: String,
    pub address: String,
    pub block: bool,
    pub event_type: String,
    pub bit: i64,
    pub invert_bit: i64,
}

impl Event {
    /// Empty event with a fresh identity.
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

impl FieldKind {
    /// Decode a raw cell. The empty string yields the kind's default.
    pub fn decode(&self, raw: &str) -> Option<FieldValue> {
        match self {
            FieldKind::Text => Some(FieldValue::Text(raw.to_string())),
            FieldKind::Integer if raw.is_empty() => Some(FieldValue::Integer(0)),
            FieldKind::Integer => raw.parse::<i64>().ok().map(FieldValue::Integer),
            FieldKind::Boolean => parse_bool(raw).map(FieldValue::Boolean),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "" => Some(false),
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Boolean(_) => FieldKind::Boolean,
        }
    }

    /// String form that [`FieldKind::decode`] reads back.
    pub fn encode(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("column '{column}': cannot decode {value:?} as {kind}")]
    Decode {
        column: &'static str,
        kind: FieldKind,
        value: String,
    },
    #[error("column '{column}': expected {expected}, got {actual}")]
    KindMismatch {
        column: &'static str,
        expected: FieldKind,
        actual: FieldKind,
    },
}

/// One entry of the field table: header column, storage key, kind, and
/// accessor/mutator pair.
#[derive(Clone, Copy)]
pub struct FieldSpec {
    /// Column name in the TSV header.
    pub column: &'static str,
    /// Key used by the key-value backend.
    pub key: &'static str,
    pub kind: FieldKind,
    pub get: fn(&Event) -> FieldValue,
    set: fn(&mut Event, FieldValue),
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("column", &self.column)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

impl FieldSpec {
    pub fn decode(&self, raw: &str) -> Result<FieldValue, FieldError> {
        self.kind.decode(raw).ok_or_else(|| FieldError::Decode {
            column: self.column,
            kind: self.kind,
            value: raw.to_string(),
        })
    }

    pub fn apply(&self, event: &mut Event, value: FieldValue) -> Result<(), FieldError> {
        if value.kind() != self.kind {
            return Err(FieldError::KindMismatch {
                column: self.column,
                expected: self.kind,
                actual: value.kind(),
            });
        }
        (self.set)(event, value);
        Ok(())
    }

    pub fn decode_into(&self, event: &mut Event, raw: &str) -> Result<(), FieldError> {
        let value = self.decode(raw)?;
        self.apply(event, value)
    }
}

macro_rules! field {
    ($column:literal, $key:literal, Text, $field:ident) => {
        FieldSpec {
            column: $column,
            key: $key,
            kind: FieldKind::Text,
            get: |e: &Event| FieldValue::Text(e.$field.clone()),
            set: |e: &mut Event, v: FieldValue| {
                if let FieldValue::Text(s) = v {
                    e.$field = s;
                }
            },
        }
    };
    ($column:literal, $key:literal, Integer, $field:ident) => {
        FieldSpec {
            column: $column,
            key: $key,
            kind: FieldKind::Integer,
            get: |e: &Event| FieldValue::Integer(e.$field),
            set: |e: &mut Event, v: FieldValue| {
                if let FieldValue::Integer(n) = v {
                    e.$field = n;
                }
            },
        }
    };
    ($column:literal, $key:literal, Boolean, $field:ident) => {
        FieldSpec {
            column: $column,
            key: $key,
            kind: FieldKind::Boolean,
            get: |e: &Event| FieldValue::Boolean(e.$field),
            set: |e: &mut Event, v: FieldValue| {
                if let FieldValue::Boolean(b) = v {
                    e.$field = b;
                }
            },
        }
    };
}

/// Every data field of [`Event`] (identity excluded), in header order.
pub static EVENT_FIELDS: [FieldSpec; 15] = [
    field!("n", "number", Integer, number),
    field!("mqtt", "mqtt", Text, mqtt),
    field!("invid", "inventory_id", Text, inventory_id),
    field!("unit_guid", "unit_guid", Text, unit_guid),
    field!("msg_id", "message_id", Text, message_id),
    field!("text", "message_text", Text, message_text),
    field!("context", "context", Text, context),
    field!("class", "message_class", Text, message_class),
    field!("level", "level", Integer, level),
    field!("area", "area", Text, area),
    field!("addr", "address", Text, address),
    field!("block", "block", Boolean, block),
    field!("type", "event_type", Text, event_type),
    field!("bit", "bit", Integer, bit),
    field!("invert_bit", "invert_bit", Integer, invert_bit),
];

pub fn field_by_column(column: &str) -> Option<&'static FieldSpec> {
    EVENT_FIELDS.iter().find(|f| f.column == column)
}

pub fn field_by_key(key: &str) -> Option<&'static FieldSpec> {
    EVENT_FIELDS.iter().find(|f| f.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn field_table_names_are_unique() {
        let columns: HashSet<_> = EVENT_FIELDS.iter().map(|f| f.column).collect();
        let keys: HashSet<_> = EVENT_FIELDS.iter().map(|f| f.key).collect();
        assert_eq!(columns.len(), EVENT_FIELDS.len());
        assert_eq!(keys.len(), EVENT_FIELDS.len());
        assert!(!keys.contains("id"));
    }

    #[test]
    fn accessor_and_mutator_agree() {
        let mut event = Event::new();
        event.unit_guid = "GUID-1".to_string();
        event.level = 3;
        event.block = true;

        let mut copy = Event::new();
        for field in EVENT_FIELDS.iter() {
            field.apply(&mut copy, (field.get)(&event)).unwrap();
        }
        copy.id = event.id.clone();
        assert_eq!(copy, event);
    }

    #[test]
    fn boolean_tokens() {
        let block = field_by_column("block").unwrap();
        for raw in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(block.decode(raw).unwrap(), FieldValue::Boolean(true));
        }
        for raw in ["", "0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(block.decode(raw).unwrap(), FieldValue::Boolean(false));
        }
        assert!(matches!(block.decode("yes"), Err(FieldError::Decode { column: "block", .. })));
    }

    #[test]
    fn empty_integer_is_zero_and_garbage_fails() {
        let level = field_by_column("level").unwrap();
        assert_eq!(level.decode("").unwrap(), FieldValue::Integer(0));
        assert_eq!(level.decode("-12").unwrap(), FieldValue::Integer(-12));
        assert!(level.decode("1.5").is_err());
    }

    #[test]
    fn apply_rejects_wrong_kind() {
        let mut event = Event::new();
        let number = field_by_key("number").unwrap();
        let err = number
            .apply(&mut event, FieldValue::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, FieldError::KindMismatch { .. }));
    }

    #[test]
    fn encoded_values_decode_back() {
        let field = field_by_key("block").unwrap();
        let encoded = FieldValue::Boolean(true).encode();
        assert_eq!(field.decode(&encoded).unwrap(), FieldValue::Boolean(true));
    }
}
