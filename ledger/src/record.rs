//! The durable audit record of an applied transaction.

use serde::{Deserialize, Serialize};

use gamify_types::{LedgerTransaction, ParticipantScoreState, Timestamp};

/// Stored at `ledger_transactions/{participant}:{transaction}`. Its
/// existence is the idempotency check; it is never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub transaction: LedgerTransaction,
    pub score_before: i64,
    pub level_before: u32,
    /// Participant state right after this transaction was applied.
    pub state_after: ParticipantScoreState,
    pub recorded_at: Timestamp,
}
