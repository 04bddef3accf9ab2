//! Spin planning. Decides what the reels show for one spin request.
//!
//! TIER ORDER (fixed, documented, never reordered):
//!   1. Quota prizes with remaining > 0, by class priority
//!      (fixed-combination > triple > pair > no-win), ties in config order.
//!      The first one that synthesizes AND consumes wins.
//!   2. Fallback pair-match, if the policy is enabled and prefers it.
//!   3. No-win, if losers are allowed.
//!   4. Pair-match again, unconditionally.
//!   5. All-zero stops, no prize, reported as pair-match.
//!
//! Tier 5 is the deliberate worst case: it keeps plan() infallible on a
//! layout where nothing at all can be synthesized. Only tier 1 consumes quota.

use crate::{
    config::{DispenserConfig, FallbackPreference, OutcomeClass, PrizeConfig},
    quota::QuotaTracker,
    reel_index::ReelLayout,
    rng::SpinRng,
    synth::{synthesize, OutcomeRequest},
    types::StopIndex,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which tier of the chain produced a plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Quota,
    Fallback,
    Loser,
    LastResort,
    Degraded,
}

/// The result handed to presentation. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpinPlan {
    pub stops:   Vec<StopIndex>,
    /// `None` means no quota prize was awarded.
    pub prize:   Option<PrizeConfig>,
    pub outcome: OutcomeClass,
    pub tier:    PlanTier,
}

impl SpinPlan {
    pub fn prize_id(&self) -> Option<&str> {
        self.prize.as_ref().map(|p| p.id.as_str())
    }
}

/// The quota operations the planner needs. QuotaTracker is the production
/// ledger; tests substitute ledgers that lose the consume race.
pub trait QuotaLedger {
    fn remaining(&self, prize_id: &str) -> u32;
    fn consume(&self, prize_id: &str, n: u32) -> bool;
}

impl QuotaLedger for QuotaTracker {
    fn remaining(&self, prize_id: &str) -> u32 {
        QuotaTracker::remaining(self, prize_id)
    }

    fn consume(&self, prize_id: &str, n: u32) -> bool {
        QuotaTracker::consume(self, prize_id, n)
    }
}

pub struct SpinPlanner {
    config: Arc<DispenserConfig>,
    layout: ReelLayout,
}

impl SpinPlanner {
    pub fn new(config: Arc<DispenserConfig>) -> Self {
        let layout = ReelLayout::build(&config.reels);
        Self { config, layout }
    }

    pub fn layout(&self) -> &ReelLayout {
        &self.layout
    }

    pub fn config(&self) -> &DispenserConfig {
        &self.config
    }

    /// Prizes with quota left, highest class first, config order within a class.
    pub fn candidates(&self, quota: &dyn QuotaLedger) -> Vec<&PrizeConfig> {
        let mut available: Vec<&PrizeConfig> = self
            .config
            .prizes
            .iter()
            .filter(|p| quota.remaining(&p.id) > 0)
            .collect();
        // Stable: equal priorities keep configuration order.
        available.sort_by_key(|p| std::cmp::Reverse(p.outcome.priority()));
        available
    }

    pub fn plan(&self, quota: &dyn QuotaLedger, rng: &mut SpinRng) -> SpinPlan {
        for prize in self.candidates(quota) {
            let Some(stops) = synthesize(&self.layout, OutcomeRequest::for_prize(prize), rng) else {
                log::debug!("prize '{}' ({}) not realizable on this layout", prize.id, prize.outcome.name());
                continue;
            };
            if !quota.consume(&prize.id, 1) {
                log::debug!("prize '{}' lost its quota before consume; trying next", prize.id);
                continue;
            }
            return SpinPlan {
                stops,
                prize: Some(prize.clone()),
                outcome: prize.outcome,
                tier: PlanTier::Quota,
            };
        }

        let fallback = self.config.fallback;
        if fallback.enabled && fallback.prefer == FallbackPreference::PairMatch {
            if let Some(plan) = self.unbound(OutcomeRequest::PairMatch, PlanTier::Fallback, rng) {
                return plan;
            }
        }

        if self.config.allow_losers {
            if let Some(plan) = self.unbound(OutcomeRequest::NoWin, PlanTier::Loser, rng) {
                return plan;
            }
        }

        if let Some(plan) = self.unbound(OutcomeRequest::PairMatch, PlanTier::LastResort, rng) {
            return plan;
        }

        log::warn!("no outcome realizable on this layout; returning all-zero stops");
        SpinPlan {
            stops: vec![0; self.layout.reel_count()],
            prize: None,
            outcome: OutcomeClass::PairMatch,
            tier: PlanTier::Degraded,
        }
    }

    fn unbound(&self, request: OutcomeRequest<'_>, tier: PlanTier, rng: &mut SpinRng) -> Option<SpinPlan> {
        let stops = synthesize(&self.layout, request, rng)?;
        log::debug!("no quota prize realized; {tier:?} tier shows {}", request.class().name());
        Some(SpinPlan {
            stops,
            prize: None,
            outcome: request.class(),
            tier,
        })
    }
}
