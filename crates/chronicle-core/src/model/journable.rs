//! The capability an entity needs to have its history journaled.
//!
//! The engine never sees concrete work packages or wiki pages. It sees a
//! [`Journalable`]: an id, a type tag, an activity label, the live column
//! values, and optionally an attachment set and a custom-value set. An
//! entity without one of the optional sets reports `None`, which the engine
//! treats as "zero rows" for that association.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Column name to value, as read from the entity or a stored snapshot.
pub type Attributes = BTreeMap<String, Value>;

/// An attachment as the engine sees it: a stable id and the file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub filename: String,
}

/// A custom field value on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomValue {
    pub custom_field_id: i64,
    #[serde(default)]
    pub value: Option<String>,
}

/// An entity type whose changes are recorded as journals.
pub trait Journalable {
    /// Unique id of the entity within its base type.
    fn journable_id(&self) -> i64;

    /// Concrete type tag, e.g. `WorkPackage` or a subtype such as
    /// `PlanningElement`. The registry resolves it to a base type.
    fn type_name(&self) -> &str;

    /// Label used to group journals in activity feeds.
    fn activity_type(&self) -> &str;

    /// Current live column values.
    fn attributes(&self) -> Attributes;

    /// Attachments on the entity, or `None` when the type cannot carry any.
    fn attachments(&self) -> Option<&[Attachment]> {
        None
    }

    /// Custom values on the entity, or `None` when the type has no custom
    /// fields.
    fn custom_values(&self) -> Option<&[CustomValue]> {
        None
    }
}

/// A self-describing entity state, as handed over by a persistence hook or
/// loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: i64,
    #[serde(default)]
    pub activity_type: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_values: Option<Vec<CustomValue>>,
}

impl EntitySnapshot {
    /// Create a snapshot with no optional associations.
    pub fn new(type_name: impl Into<String>, id: i64, activity_type: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            activity_type: activity_type.into(),
            attributes: Attributes::new(),
            attachments: None,
            custom_values: None,
        }
    }

    /// Set one attribute, builder style.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Declare the attachment capability with the given attachments.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Declare the custom-field capability with the given values.
    #[must_use]
    pub fn with_custom_values(mut self, values: Vec<CustomValue>) -> Self {
        self.custom_values = Some(values);
        self
    }
}

impl Journalable for EntitySnapshot {
    fn journable_id(&self) -> i64 {
        self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn activity_type(&self) -> &str {
        &self.activity_type
    }

    fn attributes(&self) -> Attributes {
        self.attributes.clone()
    }

    fn attachments(&self) -> Option<&[Attachment]> {
        self.attachments.as_deref()
    }

    fn custom_values(&self) -> Option<&[CustomValue]> {
        self.custom_values.as_deref()
    }
}
