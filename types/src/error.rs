//! Validation errors raised before any store interaction.

use thiserror::Error;

/// Malformed input. Always permanent: never retried, never partially applied.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyId { field: &'static str },

    #[error("{field} is {len} bytes, limit is {max}")]
    IdTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} contains reserved character {ch:?}")]
    ReservedChar { field: &'static str, ch: char },

    #[error("amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange { amount: i64, min: i64, max: i64 },

    #[error("breakdown {category} = {value} outside allowed range [{min}, {max}]")]
    BreakdownOutOfRange {
        category: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{stat} = {value} exceeds per-event limit {max}")]
    StatOutOfRange {
        stat: &'static str,
        value: u32,
        max: u32,
    },

    #[error("{count} milestones exceeds limit {max}")]
    TooManyMilestones { count: usize, max: usize },

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),
}
