//! Domain errors for the behavior tracker

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while parsing or validating tracker input
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Unknown severity: {0} (expected low, medium or high)")]
    UnknownSeverity(String),

    #[error("Unknown grouping dimension: {0}")]
    UnknownGroupBy(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown suggestion category: {0}")]
    UnknownCategory(String),

    #[error("Unknown suggestion priority: {0}")]
    UnknownPriority(String),

    #[error("Notes are required for a behavior log")]
    EmptyNotes,

    #[error("No behavior logs found for student {0}")]
    NoLogsFound(Uuid),
}
