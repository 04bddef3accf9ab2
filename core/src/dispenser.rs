//! The dispenser: wires configuration, quota, planning and persistence.
//!
//! DATA FLOW (per spin):
//!   1. Draw the spin's RNG stream from the bank (spin number N).
//!   2. Planner reads quota, synthesizes stops, consumes on success.
//!   3. SpinPlanned is published and the spin is queued for the log.
//!   4. The plan is returned; persistence never gates the return.
//!
//! RULES:
//!   - All randomness flows through the RngBank.
//!   - All quota state lives in the one QuotaTracker.
//!   - Persistence failures are logged and published, never returned.

use crate::{
    clock::{SystemClock, WallClock},
    config::{DispenserConfig, OutcomeClass},
    error::DispenserResult,
    evaluate::{classify, combo_sets, resolve_symbols},
    event::{DispenserEvent, EventBus},
    persist::Persister,
    planner::{SpinPlan, SpinPlanner},
    quota::{QuotaState, QuotaTracker},
    reel_index::ReelLayout,
    rng::RngBank,
    scheduler::{DailyResetScheduler, ResetSchedule},
    store::{QuotaStore, SpinRecord},
    types::{SpinNumber, SymbolId},
};
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

pub struct Dispenser {
    config:    Arc<DispenserConfig>,
    planner:   SpinPlanner,
    quota:     Arc<QuotaTracker>,
    rng_bank:  RngBank,
    next_spin: AtomicU64,
    clock:     Arc<dyn WallClock>,
    events:    Arc<EventBus>,
    persister: Option<Arc<Persister>>,
}

impl Dispenser {
    /// Build a fully wired dispenser.
    ///
    /// With a store, the schema is migrated and persisted quota state is
    /// restored first. Every later mutation and spin is written back in
    /// the background.
    pub fn build(
        config: DispenserConfig,
        seed: u64,
        store: Option<QuotaStore>,
        clock: Arc<dyn WallClock>,
    ) -> DispenserResult<Self> {
        let config = Arc::new(config);
        let events = Arc::new(EventBus::new());
        let mut quota = QuotaTracker::new(&config, clock.clone(), events.clone());

        let (persisted, persister) = match store {
            Some(store) => {
                store.migrate()?;
                let state = store.load_quota_state()?;
                let persister = Arc::new(Persister::spawn(store, events.clone())?);
                quota = quota.with_sink(persister.clone());
                (state, Some(persister))
            }
            None => (QuotaState::default(), None),
        };
        quota.restore(persisted);

        log::info!(
            "dispenser ready: {} reels, {} prizes, seed={seed:#x}, persistence={}",
            config.reels.len(),
            config.prizes.len(),
            persister.is_some()
        );

        Ok(Self {
            planner: SpinPlanner::new(config.clone()),
            config,
            quota: Arc::new(quota),
            rng_bank: RngBank::new(seed),
            next_spin: AtomicU64::new(0),
            clock,
            events,
            persister,
        })
    }

    /// In-memory store, host clock. For tests and dry runs.
    pub fn build_test(config: DispenserConfig, seed: u64) -> DispenserResult<Self> {
        Self::build(config, seed, Some(QuotaStore::in_memory()?), Arc::new(SystemClock))
    }

    /// Plan one spin. Never fails: an unrealizable request degrades
    /// through the planner's fallback chain.
    pub fn spin(&self) -> SpinPlan {
        let spin = self.next_spin.fetch_add(1, Ordering::SeqCst);
        let mut rng = self.rng_bank.for_spin(spin);
        let plan = self.planner.plan(self.quota.as_ref(), &mut rng);

        log::debug!(
            "spin={spin} stops={:?} prize={:?} outcome={} tier={:?}",
            plan.stops,
            plan.prize_id(),
            plan.outcome.name(),
            plan.tier
        );

        self.events.publish(DispenserEvent::SpinPlanned {
            spin,
            stops: plan.stops.clone(),
            prize_id: plan.prize_id().map(str::to_string),
            outcome: plan.outcome,
        });
        if let Some(persister) = &self.persister {
            persister.record_spin(SpinRecord::from_plan(spin, &plan, self.clock.now()));
        }
        plan
    }

    /// Manual reset of every prize's daily count.
    pub fn reset_quota(&self) -> DateTime<Utc> {
        self.quota.reset()
    }

    pub fn remaining(&self, prize_id: &str) -> u32 {
        self.quota.remaining(prize_id)
    }

    pub fn quota_snapshot(&self) -> QuotaState {
        self.quota.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<DispenserEvent> {
        self.events.subscribe()
    }

    /// A reset scheduler bound to this dispenser's quota and reset config.
    pub fn scheduler(&self) -> DispenserResult<DailyResetScheduler> {
        let schedule = ResetSchedule::from_config(&self.config.reset)?;
        Ok(DailyResetScheduler::new(schedule, self.quota.clone()))
    }

    /// Symbols the reels show for `plan`.
    pub fn visible_symbols(&self, plan: &SpinPlan) -> Option<Vec<SymbolId>> {
        resolve_symbols(self.planner.layout(), &plan.stops)
    }

    /// Class of what the reels actually show, which can exceed the planned
    /// class when random filling lines up by chance.
    pub fn visible_outcome(&self, plan: &SpinPlan) -> Option<OutcomeClass> {
        let shown = self.visible_symbols(plan)?;
        Some(classify(&shown, &combo_sets(&self.config)))
    }

    pub fn config(&self) -> &DispenserConfig {
        &self.config
    }

    pub fn layout(&self) -> &ReelLayout {
        self.planner.layout()
    }

    pub fn seed(&self) -> u64 {
        self.rng_bank.master_seed()
    }

    pub fn spins_served(&self) -> SpinNumber {
        self.next_spin.load(Ordering::SeqCst)
    }

    pub fn persister(&self) -> Option<&Persister> {
        self.persister.as_deref()
    }

    /// Wait for queued writes. No-op without a store.
    pub fn flush(&self) -> DispenserResult<()> {
        match &self.persister {
            Some(p) => p.flush(),
            None => Ok(()),
        }
    }
}
