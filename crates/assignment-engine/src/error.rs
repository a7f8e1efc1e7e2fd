use thiserror::Error;

/// Why an atomic assignment was refused
///
/// A conflict is never partially applied: the transaction that detected it was
/// rolled back and the caller may re-run selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentConflict {
    /// Ticket already has an agent, or reached a terminal status
    TicketUnavailable,
    /// Agent reached `max_load` between selection and assignment
    AgentAtCapacity,
    /// Agent no longer accepts automatic assignments
    AgentUnavailable,
}

impl std::fmt::Display for AssignmentConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentConflict::TicketUnavailable => write!(f, "ticket is already assigned or closed"),
            AssignmentConflict::AgentAtCapacity => write!(f, "agent is at maximum load"),
            AssignmentConflict::AgentUnavailable => write!(f, "agent is not accepting tickets"),
        }
    }
}

/// Comprehensive error type for assignment engine operations
///
/// Finding no agent is not an error; the ticket is queued instead.
///
/// # Examples
///
/// ```
/// use deskroute_assignment_engine::{EngineError, Result};
///
/// fn lookup() -> Result<()> {
///     Err(EngineError::not_found("agent agent-404"))
/// }
///
/// match lookup() {
///     Err(EngineError::NotFound(what)) => assert_eq!(what, "agent agent-404"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database operation errors from sqlx
    ///
    /// Busy/locked errors are retried by the engine before they surface here.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Concurrent writers kept winning and retries were exhausted
    #[error("Contention on {0}: retries exhausted")]
    Contention(String),

    /// Referenced tenant, agent or ticket does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Assignment refused; state left unchanged
    #[error("Assignment conflict: {0}")]
    Conflict(AssignmentConflict),

    /// Operation is not valid for the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON (de)serialization of stored columns or config files
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new InvalidState error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// The assignment conflict carried by this error, if any
    pub fn conflict(&self) -> Option<AssignmentConflict> {
        match self {
            EngineError::Conflict(c) => Some(*c),
            _ => None,
        }
    }

    /// Whether retrying the same unit of work may succeed
    ///
    /// SQLite reports writer contention as `SQLITE_BUSY` (5) or `SQLITE_LOCKED` (6),
    /// possibly as an extended code whose low byte carries the primary code.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Database(sqlx::Error::PoolTimedOut) => true,
            EngineError::Database(sqlx::Error::Database(db_err)) => {
                let primary = db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                matches!(primary, Some(5) | Some(6))
                    || db_err.message().contains("database is locked")
            }
            _ => false,
        }
    }
}

/// Result type for assignment engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
