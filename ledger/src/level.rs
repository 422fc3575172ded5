//! Level lookup from cumulative score.

/// Minimum cumulative score for each level, indexed by level.
pub const LEVEL_THRESHOLDS: [i64; 11] = [
    0, 100, 350, 850, 1_850, 3_850, 7_350, 12_850, 20_850, 32_850, 52_850,
];

/// Highest level whose threshold `score` reaches.
pub fn level_for_score(score: i64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|threshold| score >= *threshold)
        .map_or(0, |level| level as u32)
}

/// Score needed for the level after `level`, or `None` at the cap.
pub fn next_level_threshold(level: u32) -> Option<i64> {
    LEVEL_THRESHOLDS.get(level as usize + 1).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_map_to_levels() {
        assert_eq!(level_for_score(-5), 0);
        assert_eq!(level_for_score(0), 0);
        assert_eq!(level_for_score(99), 0);
        assert_eq!(level_for_score(100), 1);
        assert_eq!(level_for_score(3_849), 4);
        assert_eq!(level_for_score(3_850), 5);
        assert_eq!(level_for_score(52_850), 10);
        assert_eq!(level_for_score(i64::MAX), 10);
    }

    #[test]
    fn next_threshold_stops_at_cap() {
        assert_eq!(next_level_threshold(0), Some(100));
        assert_eq!(next_level_threshold(9), Some(52_850));
        assert_eq!(next_level_threshold(10), None);
    }

    #[test]
    fn table_is_strictly_increasing() {
        assert!(LEVEL_THRESHOLDS.windows(2).all(|w| w[0] < w[1]));
    }
}
