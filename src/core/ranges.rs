//! Range listeners
//!
//! Formulas reading a range above [`EXPANDED_RANGE_LIMIT`] cells are not
//! given one graph edge per cell. The whole rectangle is recorded here
//! instead, and a cell edit finds its listeners with
//! [`RangeAddress::contains`].
//!
//! [`EXPANDED_RANGE_LIMIT`]: super::formula::EXPANDED_RANGE_LIMIT

use crate::types::{CellAddress, RangeAddress};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct RangeListeners {
    by_range: BTreeMap<RangeAddress, BTreeSet<CellAddress>>,
    by_listener: HashMap<CellAddress, Vec<RangeAddress>>,
}

impl RangeListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_listener.is_empty()
    }

    /// Replace the ranges `listener` watches
    pub fn set(&mut self, listener: CellAddress, ranges: Vec<RangeAddress>) {
        self.clear(listener);
        if ranges.is_empty() {
            return;
        }
        for range in &ranges {
            self.by_range.entry(*range).or_default().insert(listener);
        }
        self.by_listener.insert(listener, ranges);
    }

    pub fn clear(&mut self, listener: CellAddress) {
        let Some(ranges) = self.by_listener.remove(&listener) else {
            return;
        };
        for range in ranges {
            if let Some(listeners) = self.by_range.get_mut(&range) {
                listeners.remove(&listener);
                if listeners.is_empty() {
                    self.by_range.remove(&range);
                }
            }
        }
    }

    /// Ranges watched by `listener`
    pub fn ranges(&self, listener: CellAddress) -> &[RangeAddress] {
        self.by_listener
            .get(&listener)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Cells watching a range that contains `cell`, sorted
    pub fn listeners(&self, cell: CellAddress) -> Vec<CellAddress> {
        let found: BTreeSet<CellAddress> = self
            .by_range
            .iter()
            .filter(|(range, _)| range.contains(cell))
            .flat_map(|(_, listeners)| listeners.iter().copied())
            .collect();
        found.into_iter().collect()
    }

    /// Members of `cells` inside any range `listener` watches, sorted
    pub fn watched_among(
        &self,
        listener: CellAddress,
        cells: &BTreeSet<CellAddress>,
    ) -> Vec<CellAddress> {
        let mut found = BTreeSet::new();
        for range in self.ranges(listener) {
            let first = CellAddress::new(range.sheet, range.first_row, 0);
            let last = CellAddress::new(range.sheet, range.last_row, u32::MAX);
            found.extend(
                cells
                    .range(first..=last)
                    .filter(|cell| range.contains(**cell))
                    .copied(),
            );
        }
        found.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SheetId;
    use pretty_assertions::assert_eq;

    const SHEET: SheetId = SheetId(0);

    fn at(row: u32, col: u32) -> CellAddress {
        CellAddress::new(SHEET, row, col)
    }

    fn whole_column(col: u32) -> RangeAddress {
        RangeAddress::new(SHEET, (0, col), (1_048_575, col))
    }

    #[test]
    fn test_listeners_by_containment() {
        let mut tracker = RangeListeners::new();
        tracker.set(at(0, 0), vec![whole_column(1)]);
        tracker.set(at(0, 2), vec![whole_column(1), whole_column(3)]);

        assert_eq!(tracker.listeners(at(500_000, 1)), vec![at(0, 0), at(0, 2)]);
        assert_eq!(tracker.listeners(at(7, 3)), vec![at(0, 2)]);
        assert!(tracker.listeners(at(7, 4)).is_empty());
        assert!(tracker
            .listeners(CellAddress::new(SheetId(1), 7, 1))
            .is_empty());
    }

    #[test]
    fn test_set_replaces_and_clear_removes() {
        let mut tracker = RangeListeners::new();
        tracker.set(at(0, 0), vec![whole_column(1)]);
        tracker.set(at(0, 0), vec![whole_column(3)]);
        assert!(tracker.listeners(at(9, 1)).is_empty());
        assert_eq!(tracker.ranges(at(0, 0)), &[whole_column(3)]);

        tracker.clear(at(0, 0));
        assert!(tracker.is_empty());
        assert!(tracker.listeners(at(9, 3)).is_empty());
        assert!(tracker.ranges(at(0, 0)).is_empty());
    }

    #[test]
    fn test_watched_among_filters_columns() {
        let mut tracker = RangeListeners::new();
        tracker.set(at(0, 0), vec![RangeAddress::new(SHEET, (0, 1), (9_999, 2))]);
        let cells: BTreeSet<CellAddress> =
            [at(3, 0), at(3, 1), at(4, 2), at(4, 3), at(10_000, 1)]
                .into_iter()
                .collect();
        assert_eq!(tracker.watched_among(at(0, 0), &cells), vec![at(3, 1), at(4, 2)]);
        assert!(tracker.watched_among(at(5, 5), &cells).is_empty());
    }
}
