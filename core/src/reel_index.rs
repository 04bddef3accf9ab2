//! Per-reel symbol → stop-position index.
//!
//! Built once per configuration load and immutable afterwards. Symbols are
//! kept in a BTreeMap so every enumeration runs in sorted symbol-id order.

use crate::types::{StopIndex, SymbolId};
use std::collections::BTreeMap;

/// Positions of every symbol on one reel.
///
/// Invariant: the position lists partition `0..len`, each index exactly once,
/// and every list is non-empty and ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReelIndex {
    positions: BTreeMap<SymbolId, Vec<StopIndex>>,
    len: usize,
}

impl ReelIndex {
    pub fn build(reel: &[SymbolId]) -> Self {
        let mut positions: BTreeMap<SymbolId, Vec<StopIndex>> = BTreeMap::new();
        for (stop, symbol) in reel.iter().enumerate() {
            positions.entry(symbol.clone()).or_default().push(stop);
        }
        Self { positions, len: reel.len() }
    }

    /// Number of physical stops.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn positions(&self, symbol: &str) -> Option<&[StopIndex]> {
        self.positions.get(symbol).map(Vec::as_slice)
    }

    /// Distinct symbols on this reel, sorted by id.
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolId> {
        self.positions.keys()
    }

    /// Distinct symbols in order of their first stop on this reel.
    pub fn symbols_by_stop(&self) -> Vec<&SymbolId> {
        let mut symbols: Vec<(&SymbolId, StopIndex)> = self
            .positions
            .iter()
            .filter_map(|(symbol, stops)| stops.first().map(|&first| (symbol, first)))
            .collect();
        symbols.sort_unstable_by_key(|&(_, first)| first);
        symbols.into_iter().map(|(symbol, _)| symbol).collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.positions.len()
    }

    /// Symbol shown at `stop`, if the stop exists.
    pub fn symbol_at(&self, stop: StopIndex) -> Option<&SymbolId> {
        self.positions
            .iter()
            .find(|(_, stops)| stops.binary_search(&stop).is_ok())
            .map(|(symbol, _)| symbol)
    }
}

/// Indexes for every reel of a machine, in reel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReelLayout {
    reels: Vec<ReelIndex>,
}

impl ReelLayout {
    pub fn build(reels: &[Vec<SymbolId>]) -> Self {
        let reels = reels.iter().map(|r| ReelIndex::build(r)).collect();
        Self { reels }
    }

    pub fn reel_count(&self) -> usize {
        self.reels.len()
    }

    pub fn reel(&self, i: usize) -> &ReelIndex {
        &self.reels[i]
    }

    pub fn reels(&self) -> &[ReelIndex] {
        &self.reels
    }
}
