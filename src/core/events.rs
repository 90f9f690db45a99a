//! Event records and category tables for dataflow profile logs
//!
//! This module contains:
//! - FieldValue: one flattened payload value (scalar or untouched list)
//! - EventRecord: a normalized, time-aligned log event
//! - Field, phase and category names of the runtime's log contract

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// Log contract names
// ============================================================================

/// Field names written by the runtime's JSON logger
pub mod fields {
    pub const TIMESTAMP: &str = "ts";
    pub const CATEGORY: &str = "class";
    pub const PHASE: &str = "event";
    pub const HOST_RANK: &str = "host_rank";
    pub const WORKER_RANK: &str = "worker_rank";

    pub const ID: &str = "id";
    pub const NODE_REF: &str = "dia_id";
    pub const LABEL: &str = "label";
    pub const KIND: &str = "type";
    pub const PARENTS: &str = "parents";
    pub const TARGETS: &str = "targets";
    pub const PROGRAM: &str = "program";

    pub const ITEMS: &str = "items";
    pub const BYTES: &str = "bytes";

    /// Envelope fields lifted out of the payload into EventRecord itself
    pub const ENVELOPE: &[&str] = &[TIMESTAMP, CATEGORY, PHASE, HOST_RANK, WORKER_RANK];
}

/// Values of the `event` field
pub mod phases {
    pub const CREATE: &str = "create";
    pub const CLOSE: &str = "close";
    pub const PROFILE: &str = "profile";
    pub const START: &str = "start";
}

/// Values of the `class` field
pub mod categories {
    pub const DIA_BASE: &str = "DIABase";
    pub const DIA: &str = "DIA";
    pub const STREAM: &str = "Stream";
    pub const STREAM_SINK: &str = "StreamSink";
    pub const FILE: &str = "File";
    pub const CMDLINE: &str = "Cmdline";
    pub const STAGE_BUILDER: &str = "StageBuilder";
    pub const LINUX_PROC_STATS: &str = "LinuxProcStats";
    pub const NET_MANAGER: &str = "NetManager";
    pub const BLOCK_POOL: &str = "BlockPool";
    pub const MEM_PROFILE: &str = "MemProfile";

    /// Categories whose `create` records define dataflow nodes
    pub const NODE: &[&str] = &[DIA_BASE, DIA];

    /// Categories whose `profile` records carry metric keys
    pub const METRIC_SOURCES: &[&str] = &[LINUX_PROC_STATS, NET_MANAGER, BLOCK_POOL, MEM_PROFILE];
}

// ============================================================================
// Category Groups (recognized discriminators)
// ============================================================================

pub struct CategoryGroup {
    pub name: &'static str,
    pub categories: &'static [&'static str],
}

/// Every category the ingester keeps; anything else is not a profile event
pub const CATEGORY_GROUPS: &[CategoryGroup] = &[
    CategoryGroup {
        name: "Graph",
        categories: &[categories::DIA_BASE, categories::DIA, categories::STAGE_BUILDER],
    },
    CategoryGroup {
        name: "Transfer",
        categories: &[categories::STREAM, categories::STREAM_SINK, categories::FILE],
    },
    CategoryGroup {
        name: "Profile",
        categories: categories::METRIC_SOURCES,
    },
    CategoryGroup {
        name: "Control",
        categories: &[categories::CMDLINE],
    },
];

/// Group name for a category, None if the category is not recognized
pub fn category_group(category: &str) -> Option<&'static str> {
    CATEGORY_GROUPS
        .iter()
        .find(|group| group.categories.contains(&category))
        .map(|group| group.name)
}

pub fn is_recognized(category: &str) -> bool {
    category_group(category).is_some()
}

// ============================================================================
// FieldValue
// ============================================================================

/// One value of a flattened payload.
///
/// Objects never appear here: they are flattened into prefixed keys.
/// Arrays are kept exactly as logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl FieldValue {
    /// Convert a non-object JSON value. Returns None for objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        let field = match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    FieldValue::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::Str(s.clone()),
            Value::Array(items) => FieldValue::List(items.clone()),
            Value::Object(_) => return None,
        };
        Some(field)
    }

    /// Numeric view; None for non-numbers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::UInt(u) => Some(*u as f64),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Non-negative integer view. Whole, finite floats are accepted.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(u) => Some(*u),
            FieldValue::Int(i) => u64::try_from(*i).ok(),
            FieldValue::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => {
                Some(*f as u64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer ids from a list value; non-integer entries are skipped
    pub fn as_id_list(&self) -> Option<Vec<u64>> {
        match self {
            FieldValue::List(items) => Some(items.iter().filter_map(Value::as_u64).collect()),
            _ => None,
        }
    }
}

// ============================================================================
// EventRecord
// ============================================================================

/// A normalized event on the store's zero-based time axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Milliseconds since the earliest record of the batch
    pub timestamp: f64,
    /// `class` discriminator
    pub category: String,
    /// `event` discriminator
    pub phase: String,
    pub host_rank: Option<u64>,
    pub worker_rank: Option<u64>,
    /// Position in ingestion order (stable tiebreak for equal timestamps)
    pub seq: u64,
    /// Flattened payload without the envelope fields
    pub fields: BTreeMap<String, FieldValue>,
}

impl EventRecord {
    pub fn is(&self, category: &str, phase: &str) -> bool {
        self.category == category && self.phase == phase
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn uint(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(FieldValue::as_u64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    /// Id list field; a missing or non-list field yields an empty list
    pub fn ids(&self, key: &str) -> Vec<u64> {
        self.get(key).and_then(FieldValue::as_id_list).unwrap_or_default()
    }

    /// Short description used in diagnostics
    pub fn describe(&self) -> String {
        format!("{}/{} #{}", self.category, self.phase, self.seq)
    }
}
