//! Stored journal records.
//!
//! A [`Journal`] is a complete, self-contained snapshot of one entity at one
//! version: the filtered column values in [`JournalData`] plus one row per
//! attachment and per non-blank custom value. Deltas are never stored; they
//! are computed by diffing two snapshots (see [`crate::journal::diff`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::journable::Attributes;
use crate::error::JournalError;

/// The snapshot record of a journal: the entity's filtered column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalData {
    /// Snapshot record type, e.g. `WorkPackageJournal`.
    pub data_type: String,
    pub attributes: Attributes,
}

impl JournalData {
    pub const fn new(data_type: String, attributes: Attributes) -> Self {
        Self {
            data_type,
            attributes,
        }
    }

    /// The stored column values.
    #[must_use]
    pub const fn journaled_attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Value of one column, `None` when the column is not part of the record.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Overwrite an existing column. Returns `true` if the stored value
    /// changed. Columns the record does not carry are left alone.
    pub fn set(&mut self, column: &str, value: Value) -> bool {
        match self.attributes.get_mut(column) {
            Some(current) if *current != value => {
                *current = value;
                true
            }
            _ => false,
        }
    }

    /// Decode a stored snapshot. Anything other than a JSON object is
    /// reported as corrupt.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::CorruptSnapshot`] when `json` is not a JSON
    /// object.
    pub fn from_json(journal_id: i64, data_type: String, json: &str) -> Result<Self, JournalError> {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => Ok(Self::new(data_type, map.into_iter().collect())),
            Ok(other) => Err(JournalError::CorruptSnapshot {
                journal_id,
                reason: format!("expected an object, found {}", json_kind(&other)),
            }),
            Err(e) => Err(JournalError::CorruptSnapshot {
                journal_id,
                reason: e.to_string(),
            }),
        }
    }

    /// Encode the column values for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be serialized.
    pub fn to_json(&self) -> Result<String, JournalError> {
        Ok(serde_json::to_string(&self.attributes)?)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One attachment present on the entity at a journal's version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachableJournal {
    pub attachment_id: i64,
    pub filename: String,
}

/// One non-blank custom value present on the entity at a journal's version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomizableJournal {
    pub custom_field_id: i64,
    pub value: Option<String>,
}

/// A persisted journal with its dependents loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub id: i64,
    pub journable_id: i64,
    /// Base type of the journaled entity (never a subtype).
    pub journable_type: String,
    pub version: u32,
    pub user_id: i64,
    pub notes: String,
    pub activity_type: String,
    pub created_at_us: i64,
    /// `None` when the snapshot record is missing or unreadable.
    pub data: Option<JournalData>,
    pub attachable_journals: Vec<AttachableJournal>,
    pub customizable_journals: Vec<CustomizableJournal>,
}

impl Journal {
    /// The first journal of an entity records its creation.
    #[must_use]
    pub const fn is_initial(&self) -> bool {
        self.version == 1
    }
}

/// A journal built from an entity's state but not yet written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJournal {
    pub journable_id: i64,
    pub journable_type: String,
    pub version: u32,
    pub user_id: i64,
    pub notes: String,
    pub activity_type: String,
    pub data: JournalData,
    pub attachable_journals: Vec<AttachableJournal>,
    pub customizable_journals: Vec<CustomizableJournal>,
}
