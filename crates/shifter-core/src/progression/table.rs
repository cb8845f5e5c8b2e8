//! Progression tier table: maps a score to a level and title.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShifterError};

/// Title every profile starts with at score 0.
pub const INITIAL_TITLE: &str = "Seeker";

/// One step of the progression ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionTier {
    /// Lowest score that reaches this tier (inclusive).
    pub min_score: u64,
    pub level: u32,
    pub title: String,
}

impl ProgressionTier {
    pub fn new(min_score: u64, level: u32, title: impl Into<String>) -> Self {
        Self {
            min_score,
            level,
            title: title.into(),
        }
    }
}

/// Ordered, validated list of tiers.
///
/// Always non-empty, first tier at score 0, scores and levels strictly
/// increasing. The mapping is therefore a monotonic step function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProgressionTable {
    tiers: Vec<ProgressionTier>,
}

impl ProgressionTable {
    /// Builds a table from custom tiers, rejecting any that break ordering.
    pub fn from_tiers(tiers: Vec<ProgressionTier>) -> Result<Self> {
        let first = tiers
            .first()
            .ok_or_else(|| ShifterError::config("progression table must have at least one tier"))?;
        if first.min_score != 0 {
            return Err(ShifterError::config(format!(
                "first progression tier must start at score 0, got {}",
                first.min_score
            )));
        }

        for pair in tiers.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if upper.min_score <= lower.min_score || upper.level <= lower.level {
                return Err(ShifterError::config(format!(
                    "progression tiers must strictly increase: '{}' ({}, L{}) then '{}' ({}, L{})",
                    lower.title,
                    lower.min_score,
                    lower.level,
                    upper.title,
                    upper.min_score,
                    upper.level
                )));
            }
        }

        Ok(Self { tiers })
    }

    /// Tier reached at `score`.
    pub fn tier_for(&self, score: u64) -> &ProgressionTier {
        let idx = self.tiers.partition_point(|tier| tier.min_score <= score);
        // Index 0 always has min_score 0, so idx >= 1.
        &self.tiers[idx.saturating_sub(1)]
    }

    pub fn level_for(&self, score: u64) -> u32 {
        self.tier_for(score).level
    }

    pub fn title_for(&self, score: u64) -> &str {
        &self.tier_for(score).title
    }

    /// The tier after the one reached at `score`, if any.
    pub fn next_tier(&self, score: u64) -> Option<&ProgressionTier> {
        self.tiers.iter().find(|tier| tier.min_score > score)
    }

    pub fn tiers(&self) -> &[ProgressionTier] {
        &self.tiers
    }
}

impl Default for ProgressionTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                ProgressionTier::new(0, 0, INITIAL_TITLE),
                ProgressionTier::new(100, 1, "Initiate"),
                ProgressionTier::new(300, 2, "Apprentice"),
                ProgressionTier::new(600, 3, "Adept"),
                ProgressionTier::new(1_000, 4, "Guardian"),
                ProgressionTier::new(2_000, 5, "Luminary"),
                ProgressionTier::new(5_000, 6, "Sage"),
                ProgressionTier::new(10_000, 7, "Ascended Master"),
            ],
        }
    }
}

impl<'de> Deserialize<'de> for ProgressionTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tiers = Vec::<ProgressionTier>::deserialize(deserializer)?;
        Self::from_tiers(tiers).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_tier() {
        let table = ProgressionTable::default();
        assert_eq!(table.level_for(0), 0);
        assert_eq!(table.title_for(0), "Seeker");
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let table = ProgressionTable::default();
        assert_eq!(table.level_for(99), 0);
        assert_eq!(table.level_for(100), 1);
        assert_eq!(table.title_for(100), "Initiate");
        assert_eq!(table.level_for(u64::MAX), 7);
    }

    #[test]
    fn test_levels_are_monotonic() {
        let table = ProgressionTable::default();
        let mut last = 0;
        for score in (0..12_000).step_by(50) {
            let level = table.level_for(score);
            assert!(level >= last, "level dropped at score {score}");
            last = level;
        }
    }

    #[test]
    fn test_next_tier() {
        let table = ProgressionTable::default();
        assert_eq!(table.next_tier(150).map(|t| t.min_score), Some(300));
        assert!(table.next_tier(10_000).is_none());
    }

    #[test]
    fn test_rejects_table_not_starting_at_zero() {
        let err = ProgressionTable::from_tiers(vec![ProgressionTier::new(10, 0, "Late")]).unwrap_err();
        assert!(matches!(err, ShifterError::Config(_)));
    }

    #[test]
    fn test_rejects_non_increasing_tiers() {
        let tiers = vec![
            ProgressionTier::new(0, 0, "Seeker"),
            ProgressionTier::new(50, 1, "A"),
            ProgressionTier::new(50, 2, "B"),
        ];
        assert!(ProgressionTable::from_tiers(tiers).is_err());

        let tiers = vec![
            ProgressionTier::new(0, 1, "Seeker"),
            ProgressionTier::new(50, 1, "A"),
        ];
        assert!(ProgressionTable::from_tiers(tiers).is_err());
    }

    #[test]
    fn test_rejects_empty_table() {
        assert!(ProgressionTable::from_tiers(Vec::new()).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: ProgressionTable =
            serde_json::from_str(r#"[{"min_score":0,"level":0,"title":"Seeker"}]"#).unwrap();
        assert_eq!(ok.tiers().len(), 1);

        let bad = serde_json::from_str::<ProgressionTable>(r#"[{"min_score":5,"level":0,"title":"X"}]"#);
        assert!(bad.is_err());
    }
}
