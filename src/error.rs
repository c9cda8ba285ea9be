//! Domain error types

use thiserror::Error;

/// Form and record validation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Name must not be empty")]
    EmptyName,
    #[error("Name is too long ({0} characters, max {max})", max = crate::exercises::MAX_NAME_LEN)]
    NameTooLong(usize),
    #[error("Name must be unique (case-insensitive): '{0}' already exists")]
    DuplicateName(String),
    #[error("Set count must be between 1 and {max}, got {0}", max = crate::exercises::MAX_DEFAULT_SETS)]
    InvalidSetCount(u32),
    #[error("Set value must be greater than zero")]
    ZeroSetValue,
    #[error("Weight must be a non-negative number")]
    InvalidWeight,
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Exercise not found: {0}")]
    ExerciseNotFound(String),
    #[error("Workout not found: {0}")]
    WorkoutNotFound(String),
    #[error("Workout '{0}' is used by the active session")]
    WorkoutInUse(String),
}

/// Misuse of the active-session state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("A session for '{0}' is already in progress")]
    AlreadyActive(String),
    #[error("No active session")]
    NoActiveSession,
    #[error("Workout '{0}' has no sets to perform")]
    EmptyWorkout(String),
    #[error("Session is already finished")]
    Finished,
}

/// Import failures: either the text could not be read as JSON at all,
/// or it was JSON without anything usable in it.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Could not parse JSON: {0}")]
    Parse(String),
    #[error("Import validation failed: {0}")]
    Validation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
