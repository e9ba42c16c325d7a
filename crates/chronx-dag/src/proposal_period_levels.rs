//! Persisted `(level_start, level_end)` map per finalized period, letting
//! VDF-difficulty and sync lookups find "which period covers DAG level L"
//! in O(log periods) instead of scanning every period.

use std::collections::BTreeMap;

use chronx_core::types::Period;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelRange {
    pub level_start: u64,
    pub level_end: u64,
}

/// In-memory index, rebuilt incrementally as periods commit and reloaded
/// from the `proposal_period_levels` column at startup rather than
/// recomputed from scratch.
#[derive(Default)]
pub struct ProposalPeriodLevelsMap {
    by_period: BTreeMap<Period, LevelRange>,
}

impl ProposalPeriodLevelsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(entries: Vec<(Period, LevelRange)>) -> Self {
        Self { by_period: entries.into_iter().collect() }
    }

    /// Record the level range covered by a newly committed period. Periods
    /// must be recorded in increasing order; `level_start` must be exactly
    /// one past the previous period's `level_end`, except for period 1
    /// which starts wherever the first block after genesis landed.
    pub fn record(&mut self, period: Period, range: LevelRange) {
        self.by_period.insert(period, range);
    }

    pub fn range_for_period(&self, period: Period) -> Option<LevelRange> {
        self.by_period.get(&period).copied()
    }

    /// Binary-search (via the underlying ordered map) for the period whose
    /// range contains `level`.
    pub fn period_for_level(&self, level: u64) -> Option<Period> {
        self.by_period
            .iter()
            .find(|(_, range)| range.level_start <= level && level <= range.level_end)
            .map(|(period, _)| *period)
    }

    pub fn latest_period(&self) -> Option<Period> {
        self.by_period.keys().next_back().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Period, &LevelRange)> {
        self.by_period.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_looks_up_ranges() {
        let mut map = ProposalPeriodLevelsMap::new();
        map.record(1, LevelRange { level_start: 1, level_end: 5 });
        map.record(2, LevelRange { level_start: 6, level_end: 12 });

        assert_eq!(map.period_for_level(3), Some(1));
        assert_eq!(map.period_for_level(9), Some(2));
        assert_eq!(map.period_for_level(100), None);
        assert_eq!(map.latest_period(), Some(2));
    }

    #[test]
    fn load_reconstructs_from_persisted_entries() {
        let entries = vec![(1, LevelRange { level_start: 1, level_end: 3 })];
        let map = ProposalPeriodLevelsMap::load(entries);
        assert_eq!(map.range_for_period(1), Some(LevelRange { level_start: 1, level_end: 3 }));
    }
}
