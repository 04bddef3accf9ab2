//! Visible-result evaluation: what do the reels actually show?

use crate::{
    config::{DispenserConfig, OutcomeClass},
    reel_index::ReelLayout,
    types::{StopIndex, SymbolId},
};
use std::collections::BTreeMap;

/// Map each reel's stop to the symbol shown. `None` for an out-of-range stop.
pub fn resolve_symbols(layout: &ReelLayout, stops: &[StopIndex]) -> Option<Vec<SymbolId>> {
    if stops.len() != layout.reel_count() {
        return None;
    }
    layout
        .reels()
        .iter()
        .zip(stops)
        .map(|(reel, &stop)| reel.symbol_at(stop).cloned())
        .collect()
}

/// Highest visible class. A combination counts when every one of its
/// symbols is shown; since each reel shows one symbol, distinct required
/// symbols necessarily sit on distinct reels.
pub fn classify(shown: &[SymbolId], combos: &[&[SymbolId]]) -> OutcomeClass {
    if combos
        .iter()
        .any(|combo| !combo.is_empty() && combo.iter().all(|s| shown.contains(s)))
    {
        return OutcomeClass::FixedCombination;
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for symbol in shown {
        *counts.entry(symbol.as_str()).or_insert(0) += 1;
    }
    match counts.values().max().copied().unwrap_or(0) {
        n if n >= 3 => OutcomeClass::TripleMatch,
        2 => OutcomeClass::PairMatch,
        _ => OutcomeClass::NoWin,
    }
}

/// Required symbol sets of every combination prize in `config`.
pub fn combo_sets(config: &DispenserConfig) -> Vec<&[SymbolId]> {
    config
        .prizes
        .iter()
        .filter(|p| p.outcome == OutcomeClass::FixedCombination)
        .filter_map(|p| p.special.as_ref().map(|s| s.symbols.as_slice()))
        .collect()
}
