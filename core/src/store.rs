//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The dispenser never waits on it; writes arrive through the Persister.

use crate::{
    config::OutcomeClass,
    error::{DispenserError, DispenserResult},
    planner::{PlanTier, SpinPlan},
    quota::QuotaState,
    types::{PrizeId, SpinNumber, StopIndex},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

const LAST_RESET_KEY: &str = "last_reset";

/// One row of the spin audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpinRecord {
    pub spin_id:    String,
    pub spin:       SpinNumber,
    pub stops:      Vec<StopIndex>,
    pub prize_id:   Option<PrizeId>,
    pub outcome:    OutcomeClass,
    pub tier:       PlanTier,
    pub created_at: DateTime<Utc>,
}

impl SpinRecord {
    pub fn from_plan(spin: SpinNumber, plan: &SpinPlan, created_at: DateTime<Utc>) -> Self {
        Self {
            spin_id: uuid::Uuid::new_v4().to_string(),
            spin,
            stops: plan.stops.clone(),
            prize_id: plan.prize_id().map(str::to_string),
            outcome: plan.outcome,
            tier: plan.tier,
            created_at,
        }
    }
}

pub struct QuotaStore {
    conn: Connection,
}

impl QuotaStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> DispenserResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DispenserResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DispenserResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_quota.sql"))?;
        Ok(())
    }

    // ── Quota ──────────────────────────────────────────────────

    pub fn load_quota_state(&self) -> DispenserResult<QuotaState> {
        let mut stmt = self.conn.prepare(
            "SELECT prize_id, consumed FROM quota_consumed ORDER BY prize_id ASC",
        )?;
        let consumed: BTreeMap<PrizeId, u32> = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u32))
            })?
            .collect::<Result<_, _>>()?;

        let last_reset: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM quota_meta WHERE key = ?1",
                params![LAST_RESET_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let last_reset = last_reset
            .filter(|s| !s.is_empty())
            .map(|s| parse_timestamp(&s))
            .transpose()?;

        Ok(QuotaState { consumed, last_reset })
    }

    /// Replace the stored counters with `state` in one transaction.
    pub fn save_quota_state(&mut self, state: &QuotaState) -> DispenserResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM quota_consumed", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO quota_consumed (prize_id, consumed) VALUES (?1, ?2)",
            )?;
            for (prize_id, consumed) in &state.consumed {
                insert.execute(params![prize_id, *consumed as i64])?;
            }
        }
        match state.last_reset {
            Some(at) => {
                tx.execute(
                    "INSERT OR REPLACE INTO quota_meta (key, value) VALUES (?1, ?2)",
                    params![LAST_RESET_KEY, at.to_rfc3339()],
                )?;
            }
            None => {
                tx.execute("DELETE FROM quota_meta WHERE key = ?1", params![LAST_RESET_KEY])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── Spin log ───────────────────────────────────────────────

    pub fn append_spin(&self, record: &SpinRecord) -> DispenserResult<()> {
        self.conn.execute(
            "INSERT INTO spin_log (spin_id, spin, stops, prize_id, outcome, tier, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.spin_id,
                record.spin as i64,
                serde_json::to_string(&record.stops)?,
                record.prize_id,
                enum_text(&record.outcome)?,
                enum_text(&record.tier)?,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn spin_count(&self) -> DispenserResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM spin_log", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn awarded_count(&self, prize_id: &str) -> DispenserResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM spin_log WHERE prize_id = ?1",
            params![prize_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Most recent spins, newest first.
    pub fn recent_spins(&self, limit: usize) -> DispenserResult<Vec<SpinRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT spin_id, spin, stops, prize_id, outcome, tier, created_at
             FROM spin_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(spin_id, spin, stops, prize_id, outcome, tier, created_at)| {
                Ok(SpinRecord {
                    spin_id,
                    spin: spin as u64,
                    stops: serde_json::from_str(&stops)?,
                    prize_id,
                    outcome: enum_from_text(outcome)?,
                    tier: enum_from_text(tier)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}

fn parse_timestamp(raw: &str) -> DispenserResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DispenserError::Other(anyhow::anyhow!("bad timestamp '{raw}': {e}")))
}

/// Unit enum variant as its bare serde name (no JSON quotes in the column).
fn enum_text<T: Serialize>(value: &T) -> DispenserResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn enum_from_text<T: DeserializeOwned>(raw: String) -> DispenserResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(raw))?)
}
