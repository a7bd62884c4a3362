//! The journal engine.
//!
//! [`JournalManager`] is the entry point. It borrows a store connection and
//! the type registry and exposes:
//!
//! | Operation | Module |
//! |---|---|
//! | `changed`, `entity_changes` | [`detect`] |
//! | `add_journal`, `create_journal`, `save_journal`, `record_if_changed`, `delete_journals_for` | [`record`] |
//! | `journal_changes`, `history` | [`changes`] |
//! | `recreate_initial_journal`, `rebuild_initial_journal` | [`rebuild`] |
//! | `update_user_references`, `reassign_user_batch` | [`users`] |
//!
//! Journals are immutable snapshots. Change sets are always computed by
//! diffing two snapshots, never stored.

pub mod changes;
pub mod detect;
pub mod diff;
pub mod normalize;
pub mod rebuild;
pub mod record;
pub mod registry;
pub mod users;

use rusqlite::Connection;

use registry::JournalRegistry;

/// Supplies the acting user when a caller does not name one.
///
/// The engine never reads ambient state itself; whoever sits at the request
/// boundary implements this.
pub trait CurrentUser {
    fn user_id(&self) -> i64;
}

/// A fixed acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedUser(pub i64);

impl CurrentUser for FixedUser {
    fn user_id(&self) -> i64 {
        self.0
    }
}

/// Journal engine bound to one store connection.
///
/// Pass a `Transaction` (it derefs to `Connection`) to make journal writes
/// part of the entity's own save.
pub struct JournalManager<'conn> {
    conn: &'conn Connection,
    registry: &'conn JournalRegistry,
}

impl<'conn> JournalManager<'conn> {
    /// Create a manager over `conn` using `registry` for type resolution.
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection, registry: &'conn JournalRegistry) -> Self {
        Self { conn, registry }
    }

    /// The registry this manager resolves types with.
    #[must_use]
    pub const fn registry(&self) -> &JournalRegistry {
        self.registry
    }

    /// Whether entities tagged `type_name` are journaled.
    #[must_use]
    pub fn is_journalized(&self, type_name: &str) -> bool {
        self.registry.is_journalized(type_name)
    }
}
