//! Badge identifiers and grant records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ParticipantId, Timestamp, TransactionId};

/// Every badge the rule table can award.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeId {
    HatTrick,
    Poker,
    Manita,
    Playmaker,
    BalancedPlayer,
    Streak7,
    IronMan,
    Streak30,
    MvpStreak3,
    Veteran50,
    Veteran100,
    Level5,
    Level10,
    CleanSheet,
    Paredao,
    DefensiveWall,
    Winner25,
    Winner50,
}

impl BadgeId {
    pub const ALL: [BadgeId; 18] = [
        BadgeId::HatTrick,
        BadgeId::Poker,
        BadgeId::Manita,
        BadgeId::Playmaker,
        BadgeId::BalancedPlayer,
        BadgeId::Streak7,
        BadgeId::IronMan,
        BadgeId::Streak30,
        BadgeId::MvpStreak3,
        BadgeId::Veteran50,
        BadgeId::Veteran100,
        BadgeId::Level5,
        BadgeId::Level10,
        BadgeId::CleanSheet,
        BadgeId::Paredao,
        BadgeId::DefensiveWall,
        BadgeId::Winner25,
        BadgeId::Winner50,
    ];

    /// Stable identifier used in document keys.
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeId::HatTrick => "hat_trick",
            BadgeId::Poker => "poker",
            BadgeId::Manita => "manita",
            BadgeId::Playmaker => "playmaker",
            BadgeId::BalancedPlayer => "balanced_player",
            BadgeId::Streak7 => "streak_7",
            BadgeId::IronMan => "iron_man",
            BadgeId::Streak30 => "streak_30",
            BadgeId::MvpStreak3 => "mvp_streak_3",
            BadgeId::Veteran50 => "veteran_50",
            BadgeId::Veteran100 => "veteran_100",
            BadgeId::Level5 => "level_5",
            BadgeId::Level10 => "level_10",
            BadgeId::CleanSheet => "clean_sheet",
            BadgeId::Paredao => "paredao",
            BadgeId::DefensiveWall => "defensive_wall",
            BadgeId::Winner25 => "winner_25",
            BadgeId::Winner50 => "winner_50",
        }
    }
}

impl fmt::Display for BadgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A badge awarded to a participant. At most one per `(participant, badge)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeGrant {
    pub participant_id: ParticipantId,
    pub badge_id: BadgeId,
    pub granted_at: Timestamp,
    /// Transaction whose application unlocked the badge.
    pub source_transaction: TransactionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_key_name() {
        for badge in BadgeId::ALL {
            let json = serde_json::to_string(&badge).unwrap();
            assert_eq!(json, format!("\"{}\"", badge.as_str()));
        }
    }
}
