//! Daily prize quota tracking.
//!
//! RULE: QuotaState has exactly one owner, the QuotaTracker, and every read
//! or write goes through its mutex. The remaining-check and the increment in
//! consume() happen under one lock acquisition, so concurrent spins and the
//! reset timer never observe a stale count.

use crate::{
    clock::WallClock,
    config::DispenserConfig,
    error::{DispenserError, DispenserResult},
    event::{DispenserEvent, EventBus},
    types::PrizeId,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// Persisted quota counters. Shape matches what the store saves and loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaState {
    /// Prize id → awards today. Absent means zero.
    pub consumed: BTreeMap<PrizeId, u32>,
    pub last_reset: Option<DateTime<Utc>>,
}

impl QuotaState {
    pub fn consumed(&self, prize_id: &str) -> u32 {
        self.consumed.get(prize_id).copied().unwrap_or(0)
    }
}

/// Sees the state after every mutation, while the tracker's lock is held.
/// Implementations must only enqueue; never block or call back into the tracker.
pub trait QuotaSink: Send + Sync {
    fn quota_changed(&self, state: &QuotaState);
}

pub struct QuotaTracker {
    caps:  BTreeMap<PrizeId, u32>,
    state: Mutex<QuotaState>,
    clock: Arc<dyn WallClock>,
    events: Arc<EventBus>,
    sink:  Option<Arc<dyn QuotaSink>>,
}

impl QuotaTracker {
    pub fn new(config: &DispenserConfig, clock: Arc<dyn WallClock>, events: Arc<EventBus>) -> Self {
        let caps = config
            .prizes
            .iter()
            .map(|p| (p.id.clone(), p.daily_max))
            .collect();
        Self {
            caps,
            state: Mutex::new(QuotaState::default()),
            clock,
            events,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn QuotaSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Load persisted counters. Prizes no longer configured are dropped.
    /// Counts above cap are kept; remaining() still floors at zero.
    pub fn restore(&self, persisted: QuotaState) {
        let mut state = self.state.lock();
        state.consumed = persisted
            .consumed
            .into_iter()
            .filter(|(id, n)| {
                let known = self.caps.contains_key(id);
                if !known {
                    log::warn!("quota restore: dropping unknown prize '{id}' (consumed={n})");
                }
                known
            })
            .collect();
        state.last_reset = persisted.last_reset;
        for (id, n) in &state.consumed {
            if *n > self.caps[id] {
                log::warn!("quota restore: prize '{id}' consumed {n} exceeds cap {}", self.caps[id]);
            }
        }
    }

    pub fn cap(&self, prize_id: &str) -> DispenserResult<u32> {
        self.caps
            .get(prize_id)
            .copied()
            .ok_or_else(|| DispenserError::UnknownPrize { prize_id: prize_id.to_string() })
    }

    /// cap − consumed, floored at zero. Unknown prizes have nothing remaining.
    pub fn remaining(&self, prize_id: &str) -> u32 {
        let state = self.state.lock();
        self.remaining_locked(&state, prize_id)
    }

    fn remaining_locked(&self, state: &QuotaState, prize_id: &str) -> u32 {
        let cap = self.caps.get(prize_id).copied().unwrap_or(0);
        cap.saturating_sub(state.consumed(prize_id))
    }

    /// Award `n` units of `prize_id` if that many remain. All or nothing.
    /// Consuming zero succeeds and leaves the state untouched.
    pub fn consume(&self, prize_id: &str, n: u32) -> bool {
        if n == 0 {
            return true;
        }
        let mut state = self.state.lock();
        let remaining = self.remaining_locked(&state, prize_id);
        if remaining < n {
            log::debug!("quota consume refused: prize={prize_id} want={n} remaining={remaining}");
            return false;
        }
        let consumed = state.consumed(prize_id) + n;
        state.consumed.insert(prize_id.to_string(), consumed);
        log::debug!("quota consume: prize={prize_id} consumed={consumed} remaining={}", remaining - n);
        self.events.publish(DispenserEvent::QuotaConsumed {
            prize_id: prize_id.to_string(),
            consumed,
            remaining: remaining - n,
        });
        self.notify(&state);
        true
    }

    /// Zero every counter and stamp the reset time.
    pub fn reset(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.clear_locked(&mut state, now);
        log::info!("quota reset at {}", now.to_rfc3339());
        now
    }

    /// Reset only if `should_reset(now, last_reset)` holds.
    /// Check and reset share one lock acquisition.
    pub fn reset_if<F>(&self, should_reset: F) -> Option<DateTime<Utc>>
    where
        F: FnOnce(DateTime<Utc>, Option<DateTime<Utc>>) -> bool,
    {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if !should_reset(now, state.last_reset) {
            return None;
        }
        self.clear_locked(&mut state, now);
        log::info!("scheduled quota reset at {}", now.to_rfc3339());
        Some(now)
    }

    fn clear_locked(&self, state: &mut QuotaState, now: DateTime<Utc>) {
        state.consumed.clear();
        state.last_reset = Some(now);
        self.events.publish(DispenserEvent::QuotaReset { at: now });
        self.notify(state);
    }

    pub fn last_reset(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_reset
    }

    pub fn snapshot(&self) -> QuotaState {
        self.state.lock().clone()
    }

    /// Prize ids in configuration-independent (sorted) order.
    pub fn prize_ids(&self) -> impl Iterator<Item = &PrizeId> {
        self.caps.keys()
    }

    fn notify(&self, state: &QuotaState) {
        if let Some(sink) = &self.sink {
            sink.quota_changed(state);
        }
    }
}
