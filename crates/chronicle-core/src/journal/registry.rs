//! Static mapping from entity type tags to their snapshot record types.
//!
//! Every journaled base type has one snapshot record type (`<Base>Journal`)
//! and a fixed set of recognized columns. Subtypes (a `PlanningElement` is a
//! `WorkPackage`) resolve to their base type, so all journals of one entity
//! share one `journable_type` regardless of which subtype saved them.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::config::JournalConfig;
use crate::error::JournalError;
use crate::model::journable::Attributes;

/// Columns never copied into a snapshot, whatever the record type declares.
pub const EXCLUDED_COLUMNS: &[&str] = &["id", "updated_at", "updated_on"];

/// Snapshot record type of one journaled base type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSchema {
    base_type: String,
    data_type: String,
    columns: BTreeSet<String>,
}

impl SnapshotSchema {
    fn new<'a>(base_type: &str, columns: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            base_type: base_type.to_string(),
            data_type: format!("{base_type}Journal"),
            columns: columns.into_iter().map(str::to_string).collect(),
        }
    }

    /// The base entity type, stored as `journable_type`.
    #[must_use]
    pub fn base_type(&self) -> &str {
        &self.base_type
    }

    /// The snapshot record type name, e.g. `WorkPackageJournal`.
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Recognized column names.
    #[must_use]
    pub const fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    /// Project `attributes` onto the recognized columns, minus the synthetic
    /// ones in [`EXCLUDED_COLUMNS`].
    ///
    /// Every such column is present in the result; one the entity did not
    /// supply is `null`. Unrecognized names are dropped.
    #[must_use]
    pub fn filter(&self, attributes: &Attributes) -> Attributes {
        self.columns
            .iter()
            .filter(|name| !EXCLUDED_COLUMNS.contains(&name.as_str()))
            .map(|name| {
                let value = attributes.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}

/// Registry of journaled types, populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct JournalRegistry {
    schemas: BTreeMap<String, SnapshotSchema>,
    subtypes: BTreeMap<String, String>,
}

impl JournalRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in journaled type.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register(
            "WorkPackage",
            [
                "type_id",
                "project_id",
                "subject",
                "description",
                "due_date",
                "category_id",
                "status_id",
                "assigned_to_id",
                "priority_id",
                "fixed_version_id",
                "author_id",
                "lock_version",
                "done_ratio",
                "estimated_hours",
                "start_date",
                "parent_id",
                "responsible_id",
            ],
        );
        registry.register_subtype("PlanningElement", "WorkPackage");
        registry.register(
            "WikiContent",
            ["page_id", "author_id", "text", "lock_version"],
        );
        registry.register(
            "Message",
            [
                "board_id",
                "parent_id",
                "subject",
                "content",
                "author_id",
                "replies_count",
                "last_reply_id",
                "locked",
                "sticky",
            ],
        );
        registry.register(
            "TimeEntry",
            [
                "project_id",
                "user_id",
                "work_package_id",
                "hours",
                "comments",
                "activity_id",
                "spent_on",
                "tyear",
                "tmonth",
                "tweek",
            ],
        );
        registry.register(
            "News",
            [
                "project_id",
                "title",
                "summary",
                "description",
                "author_id",
                "comments_count",
            ],
        );
        registry.register(
            "Changeset",
            [
                "repository_id",
                "revision",
                "committer",
                "committed_on",
                "comments",
                "commit_date",
                "scmid",
                "user_id",
            ],
        );
        registry.register(
            "Attachment",
            [
                "container_id",
                "container_type",
                "filename",
                "disk_filename",
                "filesize",
                "content_type",
                "digest",
                "downloads",
                "author_id",
                "description",
            ],
        );

        registry
    }

    /// Built-in types plus the types declared in configuration.
    #[must_use]
    pub fn from_config(config: &JournalConfig) -> Self {
        let mut registry = Self::builtin();
        registry.apply_config(config);
        registry
    }

    /// Register (or replace) a base type and its recognized columns.
    pub fn register<'a>(&mut self, base_type: &str, columns: impl IntoIterator<Item = &'a str>) {
        self.subtypes.remove(base_type);
        self.schemas
            .insert(base_type.to_string(), SnapshotSchema::new(base_type, columns));
    }

    /// Declare `subtype` as journaled under `base_type`.
    pub fn register_subtype(&mut self, subtype: &str, base_type: &str) {
        self.subtypes
            .insert(subtype.to_string(), base_type.to_string());
    }

    /// Merge `[[journal.types]]` declarations into the registry.
    pub fn apply_config(&mut self, config: &JournalConfig) {
        for declared in &config.types {
            self.register(&declared.name, declared.columns.iter().map(String::as_str));
            for subtype in &declared.subtypes {
                self.register_subtype(subtype, &declared.name);
            }
            tracing::debug!(
                journable_type = %declared.name,
                columns = declared.columns.len(),
                "registered journaled type from config"
            );
        }
    }

    /// Whether entities tagged `type_name` are journaled.
    #[must_use]
    pub fn is_journalized(&self, type_name: &str) -> bool {
        self.resolve(type_name).is_ok()
    }

    /// Base type of `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::UnknownJournableType`] for unregistered tags.
    pub fn base_type<'s>(&'s self, type_name: &'s str) -> Result<&'s str, JournalError> {
        self.resolve(type_name).map(SnapshotSchema::base_type)
    }

    /// Snapshot schema for `type_name`, following subtype links.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::UnknownJournableType`] for unregistered tags.
    pub fn resolve(&self, type_name: &str) -> Result<&SnapshotSchema, JournalError> {
        let base = self
            .subtypes
            .get(type_name)
            .map_or(type_name, String::as_str);
        self.schemas
            .get(base)
            .ok_or_else(|| JournalError::UnknownJournableType(type_name.to_string()))
    }

    /// The journaled base type of a snapshot record type, e.g.
    /// `WorkPackageJournal` gives `WorkPackage`.
    #[must_use]
    pub fn journaled_type(&self, data_type: &str) -> Option<&str> {
        self.schemas
            .values()
            .find(|schema| schema.data_type == data_type)
            .map(SnapshotSchema::base_type)
    }

    /// Registered base types in name order.
    pub fn base_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
