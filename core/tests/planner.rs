//! Spin planner tests.
//!
//! Tests cover: the triple-cherry scenario, class priority, config-order
//! tie-breaks, lost consume races, and every tier of the fallback chain.

use dispenser_core::{
    config::{
        DispenserConfig, FallbackConfig, FallbackPreference, MatchMode, OutcomeClass,
        PrizeConfig, SpecialCombo, SymbolConfig,
    },
    dispenser::Dispenser,
    evaluate::resolve_symbols,
    planner::{PlanTier, QuotaLedger, SpinPlanner},
    rng::RngBank,
};
use std::{collections::HashMap, sync::Arc};

fn prize(id: &str, outcome: OutcomeClass, daily_max: u32) -> PrizeConfig {
    PrizeConfig { id: id.into(), label: id.into(), outcome, daily_max, special: None }
}

fn combo(id: &str, symbols: &[&str], daily_max: u32) -> PrizeConfig {
    PrizeConfig {
        id: id.into(),
        label: id.into(),
        outcome: OutcomeClass::FixedCombination,
        daily_max,
        special: Some(SpecialCombo {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            match_mode: MatchMode::AnyOrder,
        }),
    }
}

fn machine(reels: &[&[&str]], prizes: Vec<PrizeConfig>) -> DispenserConfig {
    let mut symbols: Vec<String> = reels.iter().flat_map(|r| r.iter().map(|s| s.to_string())).collect();
    symbols.sort();
    symbols.dedup();
    DispenserConfig {
        symbols: symbols
            .into_iter()
            .map(|id| SymbolConfig { name: id.clone(), id, asset_path: String::new(), weight: 1.0 })
            .collect(),
        reels: reels.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect(),
        prizes,
        ..DispenserConfig::default_test()
    }
}

/// In-memory ledger with per-prize remaining counts.
struct MapLedger {
    remaining: parking_lot::Mutex<HashMap<String, u32>>,
    /// Prizes whose consume always loses the race.
    contested: Vec<String>,
}

impl MapLedger {
    fn new(entries: &[(&str, u32)]) -> Self {
        Self {
            remaining: parking_lot::Mutex::new(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
            contested: Vec::new(),
        }
    }
}

impl QuotaLedger for MapLedger {
    fn remaining(&self, prize_id: &str) -> u32 {
        self.remaining.lock().get(prize_id).copied().unwrap_or(0)
    }

    fn consume(&self, prize_id: &str, n: u32) -> bool {
        if self.contested.iter().any(|c| c == prize_id) {
            return false;
        }
        let mut map = self.remaining.lock();
        match map.get_mut(prize_id) {
            Some(left) if *left >= n => {
                *left -= n;
                true
            }
            _ => false,
        }
    }
}

#[test]
fn triple_cherry_scenario() {
    let dispenser = Dispenser::build_test(DispenserConfig::default_test(), 0xC0FFEE).unwrap();

    let first = dispenser.spin();
    assert_eq!(first.prize_id(), Some("triple-cherry"));
    assert_eq!(first.outcome, OutcomeClass::TripleMatch);
    assert_eq!(first.tier, PlanTier::Quota);
    assert_eq!(
        dispenser.visible_symbols(&first).unwrap(),
        vec!["cherry", "cherry", "cherry"]
    );
    assert_eq!(dispenser.visible_outcome(&first), Some(OutcomeClass::TripleMatch));
    assert_eq!(dispenser.remaining("triple-cherry"), 0);

    let second = dispenser.spin();
    assert_eq!(second.prize, None);
    assert_eq!(second.tier, PlanTier::Fallback, "fallback prefers pair-match");
    assert_eq!(second.outcome, OutcomeClass::PairMatch);
    assert_eq!(dispenser.remaining("triple-cherry"), 0);
}

#[test]
fn higher_class_wins_when_both_feasible() {
    let cfg = machine(
        &[&["bell", "bar", "seven"], &["bar", "seven", "bell"], &["seven", "bell", "bar"]],
        vec![
            prize("pair", OutcomeClass::PairMatch, 10),
            prize("triple", OutcomeClass::TripleMatch, 10),
            combo("combo", &["bell", "bar", "seven"], 10),
        ],
    );
    let planner = SpinPlanner::new(Arc::new(cfg));
    let ledger = MapLedger::new(&[("pair", 10), ("triple", 10), ("combo", 10)]);
    let bank = RngBank::new(3);

    let plan = planner.plan(&ledger, &mut bank.for_spin(0));
    assert_eq!(plan.prize_id(), Some("combo"));

    ledger.remaining.lock().insert("combo".into(), 0);
    let plan = planner.plan(&ledger, &mut bank.for_spin(1));
    assert_eq!(plan.prize_id(), Some("triple"));

    ledger.remaining.lock().insert("triple".into(), 0);
    let plan = planner.plan(&ledger, &mut bank.for_spin(2));
    assert_eq!(plan.prize_id(), Some("pair"));
    assert_eq!(ledger.remaining("pair"), 9);
}

#[test]
fn equal_class_prizes_follow_configuration_order() {
    let cfg = machine(
        &[&["a", "b"], &["a", "b"], &["a", "b"]],
        vec![
            prize("first-pair", OutcomeClass::PairMatch, 1),
            prize("second-pair", OutcomeClass::PairMatch, 1),
        ],
    );
    let planner = SpinPlanner::new(Arc::new(cfg));
    let ledger = MapLedger::new(&[("first-pair", 1), ("second-pair", 1)]);
    let bank = RngBank::new(8);

    assert_eq!(planner.plan(&ledger, &mut bank.for_spin(0)).prize_id(), Some("first-pair"));
    assert_eq!(planner.plan(&ledger, &mut bank.for_spin(1)).prize_id(), Some("second-pair"));
}

#[test]
fn unrealizable_prize_is_skipped_without_consuming() {
    // Combo needs "seven", which no reel carries; triple is realizable.
    let cfg = machine(
        &[&["a", "b"], &["a", "b"], &["a", "c"]],
        vec![combo("combo", &["b", "seven"], 3), prize("triple", OutcomeClass::TripleMatch, 3)],
    );
    let planner = SpinPlanner::new(Arc::new(cfg));
    let ledger = MapLedger::new(&[("combo", 3), ("triple", 3)]);

    let plan = planner.plan(&ledger, &mut RngBank::new(1).for_spin(0));
    assert_eq!(plan.prize_id(), Some("triple"));
    assert_eq!(ledger.remaining("combo"), 3);
    assert_eq!(ledger.remaining("triple"), 2);
}

#[test]
fn lost_consume_race_moves_to_next_candidate() {
    let cfg = machine(
        &[&["a"], &["a"], &["a"]],
        vec![prize("triple", OutcomeClass::TripleMatch, 1), prize("pair", OutcomeClass::PairMatch, 1)],
    );
    let planner = SpinPlanner::new(Arc::new(cfg));
    let mut ledger = MapLedger::new(&[("triple", 1), ("pair", 1)]);
    ledger.contested.push("triple".into());

    let plan = planner.plan(&ledger, &mut RngBank::new(2).for_spin(0));
    assert_eq!(plan.prize_id(), Some("pair"));
    assert_eq!(plan.tier, PlanTier::Quota);
}

#[test]
fn exhausted_quota_with_losers_and_no_pair_fallback_yields_no_win() {
    let mut cfg = machine(
        &[&["a", "b", "c"], &["a", "b", "c"], &["a", "b", "c"]],
        vec![prize("triple", OutcomeClass::TripleMatch, 0)],
    );
    cfg.fallback = FallbackConfig { enabled: true, prefer: FallbackPreference::NoWin };
    let planner = SpinPlanner::new(Arc::new(cfg));
    let ledger = MapLedger::new(&[("triple", 0)]);

    let plan = planner.plan(&ledger, &mut RngBank::new(2).for_spin(0));
    assert_eq!(plan.tier, PlanTier::Loser);
    assert_eq!(plan.outcome, OutcomeClass::NoWin);
    assert_eq!(plan.prize, None);
}

#[test]
fn disabled_fallback_without_losers_uses_last_resort_pair() {
    let mut cfg = machine(&[&["a", "b"], &["a", "c"], &["d"]], vec![]);
    cfg.fallback.enabled = false;
    cfg.allow_losers = false;
    let planner = SpinPlanner::new(Arc::new(cfg));
    let ledger = MapLedger::new(&[]);

    let plan = planner.plan(&ledger, &mut RngBank::new(2).for_spin(0));
    assert_eq!(plan.tier, PlanTier::LastResort);
    assert_eq!(plan.outcome, OutcomeClass::PairMatch);
    let shown = resolve_symbols(planner.layout(), &plan.stops).unwrap();
    assert_eq!(shown, vec!["a", "a", "d"]);
}

#[test]
fn nothing_realizable_degrades_to_zero_stops() {
    let mut cfg = machine(&[&["a", "b"], &["c"], &["d", "e"]], vec![]);
    cfg.allow_losers = false;
    let planner = SpinPlanner::new(Arc::new(cfg));
    let ledger = MapLedger::new(&[]);

    let plan = planner.plan(&ledger, &mut RngBank::new(2).for_spin(0));
    assert_eq!(plan.tier, PlanTier::Degraded);
    assert_eq!(plan.stops, vec![0, 0, 0]);
    assert_eq!(plan.prize, None);
    assert_eq!(plan.outcome, OutcomeClass::PairMatch);
}

#[test]
fn no_pair_layout_with_losers_shows_a_loss() {
    let cfg = machine(&[&["a", "b"], &["c"], &["d", "e"]], vec![]);
    let planner = SpinPlanner::new(Arc::new(cfg));
    let plan = planner.plan(&MapLedger::new(&[]), &mut RngBank::new(2).for_spin(0));
    assert_eq!(plan.tier, PlanTier::Loser);
}

#[test]
fn no_win_prize_is_awarded_from_quota() {
    let cfg = machine(
        &[&["a", "b", "c"], &["a", "b", "c"], &["a", "b", "c"]],
        vec![prize("consolation", OutcomeClass::NoWin, 1)],
    );
    let planner = SpinPlanner::new(Arc::new(cfg));
    let ledger = MapLedger::new(&[("consolation", 1)]);
    let plan = planner.plan(&ledger, &mut RngBank::new(4).for_spin(0));
    assert_eq!(plan.prize_id(), Some("consolation"));
    assert_eq!(plan.outcome, OutcomeClass::NoWin);
    assert_eq!(ledger.remaining("consolation"), 0);
}

#[test]
fn quota_never_overshoots_across_many_spins() {
    let dispenser = Dispenser::build_test(DispenserConfig::default_machine(), 42).unwrap();
    let mut awarded: HashMap<String, u32> = HashMap::new();
    for _ in 0..300 {
        if let Some(id) = dispenser.spin().prize_id() {
            *awarded.entry(id.to_string()).or_insert(0) += 1;
        }
    }
    assert_eq!(awarded.get("p-combo"), Some(&5));
    assert_eq!(awarded.get("p-three"), Some(&20));
    assert_eq!(awarded.get("p-two"), Some(&100));
    for id in ["p-combo", "p-three", "p-two"] {
        assert_eq!(dispenser.remaining(id), 0);
    }
}
