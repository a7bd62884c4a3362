use std::fmt;

/// Machine-readable error codes for operators and scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UnknownJournableType,
    JournalNotFound,
    InvalidEntity,
    VersionCollision,
    CorruptSnapshot,
    StoreWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnknownJournableType => "E1003",
            Self::JournalNotFound => "E2001",
            Self::InvalidEntity => "E2002",
            Self::VersionCollision => "E3001",
            Self::CorruptSnapshot => "E3002",
            Self::StoreWriteFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Journal store not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UnknownJournableType => "Entity type has no registered journal type",
            Self::JournalNotFound => "Journal not found",
            Self::InvalidEntity => "Entity snapshot is malformed",
            Self::VersionCollision => "Journal version already recorded",
            Self::CorruptSnapshot => "Journal snapshot is unreadable",
            Self::StoreWriteFailed => "Journal store write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `chr init` to create the journal store."),
            Self::ConfigParseError => Some("Fix syntax in .chronicle/config.toml and retry."),
            Self::UnknownJournableType => {
                Some("Register the type under [[journal.types]] in .chronicle/config.toml.")
            }
            Self::JournalNotFound => None,
            Self::InvalidEntity => {
                Some("Entity JSON needs `type`, `id` and an `attributes` object.")
            }
            Self::VersionCollision => {
                Some("Another writer recorded this version first. Retry the enclosing save.")
            }
            Self::CorruptSnapshot => {
                Some("Run `chr recreate-initial` for the entity to rebuild its first journal.")
            }
            Self::StoreWriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures raised by the journal engine and its store.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("no journal type registered for entity type '{0}'")]
    UnknownJournableType(String),

    #[error("{journable_type} #{journable_id} already has a journal at version {version}")]
    VersionCollision {
        journable_type: String,
        journable_id: i64,
        version: u32,
    },

    #[error("journal not found: {0}")]
    JournalNotFound(String),

    #[error("snapshot of journal {journal_id} is unreadable: {reason}")]
    CorruptSnapshot { journal_id: i64, reason: String },

    #[error("journal store: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("snapshot encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JournalError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownJournableType(_) => ErrorCode::UnknownJournableType,
            Self::VersionCollision { .. } => ErrorCode::VersionCollision,
            Self::JournalNotFound(_) => ErrorCode::JournalNotFound,
            Self::CorruptSnapshot { .. } => ErrorCode::CorruptSnapshot,
            Self::Storage(_) => ErrorCode::StoreWriteFailed,
            Self::Serialization(_) => ErrorCode::InternalUnexpected,
        }
    }
}
