//! Error types for the dread engine.

/// Errors surfaced at the engine's call boundary.
///
/// Collaborator failures (notifier, generative backend) never show up here;
/// they are recovered or reported to the observer instead.
#[derive(Debug, thiserror::Error)]
pub enum NagError {
    /// Dread or urgency outside 1..=5.
    #[error("{field} must be between 1 and 5 (got {value})")]
    InvalidRating { field: &'static str, value: i64 },

    /// Task name missing or blank.
    #[error("task name must be non-empty")]
    EmptyName,

    /// No task with this id is known to the store.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The task already reached a terminal state.
    #[error("task {id} is already {state}")]
    AlreadyFinished { id: String, state: &'static str },

    /// A task with this id was already registered.
    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    /// The task's schedule was cancelled; no further fires may be stored.
    #[error("task {0} has been cancelled; refusing to schedule")]
    Cancelled(String),

    /// Configuration failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// The planner could not resolve a next fire time.
    #[error("schedule inconsistency for task {task_id}: {reason}")]
    Schedule { task_id: String, reason: String },
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NagError>;
