//! Stop synthesis: desired outcome → concrete per-reel stop vector.
//!
//! Pure with respect to everything but the RNG stream it is handed. Returns
//! `None` when the reel layout cannot show the requested outcome; that is an
//! ordinary result, handled by the planner's fallback chain.
//!
//! ORDERING (fixed, so a seed replays identically):
//!   - triple-match takes the common symbol that appears first on reel 0
//!   - other symbol scans run in sorted id order (ReelIndex is a BTreeMap)
//!   - reels and reel pairs are scanned in ascending index order
//!   - combination symbols are placed in configuration order
//!
//! Every "pick uniformly" goes through the supplied SpinRng.

use crate::{
    config::{OutcomeClass, PrizeConfig},
    reel_index::{ReelIndex, ReelLayout},
    rng::SpinRng,
    types::{StopIndex, SymbolId},
};

/// What the caller wants the reels to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeRequest<'a> {
    PairMatch,
    TripleMatch,
    FixedCombination { symbols: &'a [SymbolId] },
    NoWin,
}

impl<'a> OutcomeRequest<'a> {
    pub fn for_prize(prize: &'a PrizeConfig) -> Self {
        match prize.outcome {
            OutcomeClass::PairMatch   => Self::PairMatch,
            OutcomeClass::TripleMatch => Self::TripleMatch,
            OutcomeClass::NoWin       => Self::NoWin,
            OutcomeClass::FixedCombination => Self::FixedCombination {
                symbols: prize.special.as_ref().map(|s| s.symbols.as_slice()).unwrap_or(&[]),
            },
        }
    }

    pub fn class(&self) -> OutcomeClass {
        match self {
            Self::PairMatch                 => OutcomeClass::PairMatch,
            Self::TripleMatch               => OutcomeClass::TripleMatch,
            Self::FixedCombination { .. }   => OutcomeClass::FixedCombination,
            Self::NoWin                     => OutcomeClass::NoWin,
        }
    }
}

/// Compute stops realizing `request`, or `None` if the layout cannot.
pub fn synthesize(
    layout: &ReelLayout,
    request: OutcomeRequest<'_>,
    rng: &mut SpinRng,
) -> Option<Vec<StopIndex>> {
    match request {
        OutcomeRequest::TripleMatch => triple_match(layout, rng),
        OutcomeRequest::PairMatch => pair_match(layout, rng),
        OutcomeRequest::FixedCombination { symbols } => fixed_combination(layout, symbols, rng),
        OutcomeRequest::NoWin => Some(no_win(layout, rng)),
    }
}

/// Uniform position of `symbol` on `reel`. The symbol must be present.
fn stop_for(reel: &ReelIndex, symbol: &str, rng: &mut SpinRng) -> Option<StopIndex> {
    reel.positions(symbol).map(|stops| *rng.pick(stops))
}

/// Uniform symbol among `candidates`, then uniform position of that symbol.
fn stop_among(reel: &ReelIndex, candidates: &[&SymbolId], rng: &mut SpinRng) -> Option<StopIndex> {
    if candidates.is_empty() {
        return None;
    }
    let symbol = *rng.pick(candidates);
    stop_for(reel, symbol, rng)
}

fn any_stop(reel: &ReelIndex, rng: &mut SpinRng) -> Option<StopIndex> {
    let all: Vec<&SymbolId> = reel.symbols().collect();
    stop_among(reel, &all, rng)
}

/// Symbols present on every reel, ordered by first stop on reel 0.
pub fn common_symbols(layout: &ReelLayout) -> Vec<&SymbolId> {
    let Some((first, rest)) = layout.reels().split_first() else {
        return Vec::new();
    };
    first
        .symbols_by_stop()
        .into_iter()
        .filter(|s| rest.iter().all(|r| r.contains(s)))
        .collect()
}

fn triple_match(layout: &ReelLayout, rng: &mut SpinRng) -> Option<Vec<StopIndex>> {
    if layout.reel_count() < 3 {
        return None;
    }
    let symbol = common_symbols(layout).into_iter().next()?.clone();
    layout
        .reels()
        .iter()
        .map(|reel| stop_for(reel, &symbol, rng))
        .collect()
}

fn pair_match(layout: &ReelLayout, rng: &mut SpinRng) -> Option<Vec<StopIndex>> {
    let n = layout.reel_count();
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (layout.reel(i), layout.reel(j));
            let Some(symbol) = a.symbols().find(|s| b.contains(s)) else {
                continue;
            };

            let mut stops = vec![0; n];
            stops[i] = stop_for(a, symbol, rng)?;
            stops[j] = stop_for(b, symbol, rng)?;

            // Steer other reels off the matched symbol; a reel that only
            // carries it shows it anyway.
            for (k, reel) in layout.reels().iter().enumerate() {
                if k == i || k == j {
                    continue;
                }
                let others: Vec<&SymbolId> = reel.symbols().filter(|s| *s != symbol).collect();
                stops[k] = if others.is_empty() {
                    stop_for(reel, symbol, rng)?
                } else {
                    stop_among(reel, &others, rng)?
                };
            }
            return Some(stops);
        }
    }
    None
}

/// Greedy first-fit placement, no backtracking.
///
/// Each required symbol takes the lowest-indexed unused reel carrying it.
/// An earlier symbol can therefore claim the only reel a later symbol could
/// use, and the request reports infeasible even though another assignment
/// exists. Callers rely on this exact placement, so it is not a search.
fn fixed_combination(
    layout: &ReelLayout,
    required: &[SymbolId],
    rng: &mut SpinRng,
) -> Option<Vec<StopIndex>> {
    if required.is_empty() {
        return None;
    }

    let mut ordered: Vec<&SymbolId> = Vec::with_capacity(required.len());
    for symbol in required {
        if !ordered.contains(&symbol) {
            ordered.push(symbol);
        }
    }

    let n = layout.reel_count();
    let mut stops: Vec<Option<StopIndex>> = vec![None; n];
    for symbol in ordered {
        let reel_idx = (0..n).find(|&i| stops[i].is_none() && layout.reel(i).contains(symbol))?;
        stops[reel_idx] = Some(stop_for(layout.reel(reel_idx), symbol, rng)?);
    }

    stops
        .into_iter()
        .enumerate()
        .map(|(i, stop)| match stop {
            Some(s) => Some(s),
            None => any_stop(layout.reel(i), rng),
        })
        .collect()
}

/// Best-effort losing spin.
///
/// Each reel prefers a symbol not already shown on an earlier reel. When a
/// reel carries nothing new it shows any symbol, so pairs or triples remain
/// possible on small layouts. This is a filter, never a guarantee.
fn no_win(layout: &ReelLayout, rng: &mut SpinRng) -> Vec<StopIndex> {
    let mut shown: Vec<&SymbolId> = Vec::with_capacity(layout.reel_count());
    let mut stops = Vec::with_capacity(layout.reel_count());

    for reel in layout.reels() {
        let fresh: Vec<&SymbolId> = reel.symbols().filter(|s| !shown.contains(s)).collect();
        let candidates: Vec<&SymbolId> = if fresh.is_empty() {
            reel.symbols().collect()
        } else {
            fresh
        };
        let symbol = *rng.pick(&candidates);
        shown.push(symbol);
        // The symbol came from this reel's own index, so it has positions.
        let positions = reel.positions(symbol).unwrap_or(&[0]);
        stops.push(*rng.pick(positions));
    }
    stops
}
