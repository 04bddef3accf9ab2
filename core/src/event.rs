//! Outbound notifications for external listeners (UI refresh, audit, logs).
//!
//! RULE: publishing never blocks the spin path. Subscribers get an unbounded
//! channel; a subscriber that hangs up is dropped on the next publish.

use crate::{
    config::OutcomeClass,
    types::{PrizeId, SpinNumber, StopIndex},
};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Every event the dispenser emits.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispenserEvent {
    SpinPlanned {
        spin: SpinNumber,
        stops: Vec<StopIndex>,
        prize_id: Option<PrizeId>,
        outcome: OutcomeClass,
    },
    QuotaConsumed {
        prize_id: PrizeId,
        consumed: u32,
        remaining: u32,
    },
    QuotaReset {
        at: DateTime<Utc>,
    },
    PersistenceFailed {
        what: String,
        error: String,
    },
}

impl DispenserEvent {
    /// Stable name, used in log lines.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SpinPlanned { .. }       => "spin_planned",
            Self::QuotaConsumed { .. }     => "quota_consumed",
            Self::QuotaReset { .. }        => "quota_reset",
            Self::PersistenceFailed { .. } => "persistence_failed",
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<DispenserEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<DispenserEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: DispenserEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        log::trace!("publish {}", event.type_name());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
