//! String identifiers used as parts of deterministic document keys.
//!
//! Keys are built by joining identifiers with `:` inside a `/`-separated
//! collection path, so neither character may appear in an identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ValidationError;

/// Maximum identifier length in bytes.
pub const MAX_ID_LEN: usize = 128;

const RESERVED: [char; 2] = ['/', ':'];

/// Check that `value` can safely be embedded in a document key.
pub fn validate_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyId { field });
    }
    if value.len() > MAX_ID_LEN {
        return Err(ValidationError::IdTooLong {
            field,
            len: value.len(),
            max: MAX_ID_LEN,
        });
    }
    if let Some(ch) = value.chars().find(|c| RESERVED.contains(c)) {
        return Err(ValidationError::ReservedChar { field, ch });
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Reject values that cannot be embedded in a document key.
            pub fn validate(&self) -> Result<(), ValidationError> {
                validate_id($field, &self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// A participant (player) taking part in events and periods.
    ParticipantId,
    "participant_id"
);
string_id!(
    /// Caller-supplied idempotency key of a ledger transaction.
    TransactionId,
    "transaction_id"
);
string_id!(
    /// A group event (match) that can hold an MVP vote.
    EventId,
    "event_id"
);
string_id!(
    /// Human-legible competition period identifier, e.g. `monthly_2026_10`.
    PeriodId,
    "period_id"
);
