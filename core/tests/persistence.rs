//! Persistence tests.
//!
//! Tests cover: quota and last-reset survive a restart, the spin log
//! records every spin, and a failing write is reported without blocking
//! or failing the spin that caused it.

use chrono::{TimeZone, Utc};
use dispenser_core::{
    clock::ManualClock,
    config::{DispenserConfig, OutcomeClass},
    dispenser::Dispenser,
    event::DispenserEvent,
    planner::PlanTier,
    quota::QuotaState,
    store::QuotaStore,
};
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

/// A database file unique to one test, removed on drop.
struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("dispenser-{}.db", uuid::Uuid::new_v4())))
    }

    fn path(&self) -> &str {
        self.0.to_str().expect("utf-8 temp path")
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path()));
        }
    }
}

fn open(db: &TempDb) -> Dispenser {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()));
    let store = QuotaStore::open(db.path()).expect("open store");
    Dispenser::build(DispenserConfig::default_test(), 7, Some(store), clock).expect("build dispenser")
}

#[test]
fn store_round_trips_quota_state() {
    let mut store = QuotaStore::in_memory().unwrap();
    store.migrate().unwrap();
    assert_eq!(store.load_quota_state().unwrap(), QuotaState::default());

    let state = QuotaState {
        consumed: BTreeMap::from([("a".to_string(), 3), ("b".to_string(), 0)]),
        last_reset: Some(Utc.with_ymd_and_hms(2026, 5, 4, 4, 0, 0).unwrap()),
    };
    store.save_quota_state(&state).unwrap();
    assert_eq!(store.load_quota_state().unwrap(), state);

    // A later save replaces, never merges.
    store.save_quota_state(&QuotaState::default()).unwrap();
    assert_eq!(store.load_quota_state().unwrap(), QuotaState::default());
}

#[test]
fn consumed_quota_survives_restart() {
    let db = TempDb::new();
    {
        let dispenser = open(&db);
        assert_eq!(dispenser.spin().prize_id(), Some("triple-cherry"));
        dispenser.flush().unwrap();
    }

    let dispenser = open(&db);
    assert_eq!(dispenser.remaining("triple-cherry"), 0);
    let plan = dispenser.spin();
    assert_eq!(plan.prize, None, "cap already spent before the restart");
}

#[test]
fn reset_survives_restart() {
    let db = TempDb::new();
    let reset_at = {
        let dispenser = open(&db);
        dispenser.spin();
        let at = dispenser.reset_quota();
        dispenser.flush().unwrap();
        at
    };

    let dispenser = open(&db);
    assert_eq!(dispenser.remaining("triple-cherry"), 1);
    assert_eq!(dispenser.quota_snapshot().last_reset, Some(reset_at));
}

#[test]
fn every_spin_is_logged() {
    let dispenser = Dispenser::build_test(DispenserConfig::default_test(), 3).unwrap();
    for _ in 0..5 {
        dispenser.spin();
    }
    let persister = dispenser.persister().expect("build_test persists");
    assert_eq!(persister.with_store(|s| s.spin_count()).unwrap().unwrap(), 5);
    assert_eq!(persister.with_store(|s| s.awarded_count("triple-cherry")).unwrap().unwrap(), 1);

    let recent = persister.with_store(|s| s.recent_spins(2)).unwrap().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].spin, 4);
    assert_eq!(recent[1].spin, 3);
    assert_eq!(recent[0].prize_id, None);
    assert_eq!(recent[0].outcome, OutcomeClass::PairMatch);
    assert_eq!(recent[0].tier, PlanTier::Fallback);
}

#[test]
fn failed_write_is_reported_and_spin_still_returns() {
    let db = TempDb::new();
    let dispenser = open(&db);
    let rx = dispenser.subscribe();

    // Break the spin log behind the dispenser's back.
    let conn = rusqlite::Connection::open(db.path()).unwrap();
    conn.execute_batch("DROP TABLE spin_log;").unwrap();

    let plan = dispenser.spin();
    assert_eq!(plan.prize_id(), Some("triple-cherry"));
    dispenser.flush().unwrap();

    // flush() returns after the failed write, so its event is already queued.
    let failure = rx.try_iter().find_map(|e| match e {
        DispenserEvent::PersistenceFailed { what, .. } => Some(what),
        _ => None,
    });
    assert_eq!(failure.as_deref(), Some("spin"));

    // In-memory quota stays authoritative.
    assert_eq!(dispenser.remaining("triple-cherry"), 0);
}
