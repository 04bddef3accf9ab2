//! Daily quota reset, driven by wall-clock polling.
//!
//! A reset fires when the local hour:minute equals the configured target and
//! the last reset was not on the same local calendar day. Polling only sees
//! the target minute while the process is running; a day whose minute passed
//! while the process was down gets no reset unless `catch_up_missed` is set,
//! in which case the first poll after the target time fires instead.

use crate::{
    clock::ResetZone,
    config::ResetConfig,
    error::DispenserResult,
    quota::QuotaTracker,
};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::{
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    pub hour:     u32,
    pub minute:   u32,
    pub zone:     ResetZone,
    pub catch_up: bool,
}

impl ResetSchedule {
    pub fn from_config(config: &ResetConfig) -> DispenserResult<Self> {
        let (hour, minute) = config.target()?;
        Ok(Self {
            hour,
            minute,
            zone: ResetZone::parse(&config.timezone)?,
            catch_up: config.catch_up_missed,
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>, last_reset: Option<DateTime<Utc>>) -> bool {
        let today = self.zone.local_date(now);
        if last_reset.is_some_and(|last| self.zone.local_date(last) == today) {
            return false;
        }
        let current = self.zone.hour_minute(now);
        let target = (self.hour, self.minute);
        current == target || (self.catch_up && current > target)
    }
}

pub struct DailyResetScheduler {
    schedule: ResetSchedule,
    quota:    Arc<QuotaTracker>,
}

impl DailyResetScheduler {
    pub fn new(schedule: ResetSchedule, quota: Arc<QuotaTracker>) -> Self {
        Self { schedule, quota }
    }

    /// Check the clock once. Returns the reset time if a reset fired.
    pub fn poll(&self) -> Option<DateTime<Utc>> {
        let schedule = self.schedule;
        self.quota.reset_if(|now, last| schedule.is_due(now, last))
    }

    /// Poll on a background thread every `interval` until the handle is
    /// stopped or dropped. The first poll happens immediately.
    pub fn spawn(self, interval: Duration) -> DispenserResult<SchedulerHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        log::info!(
            "reset scheduler started: target {:02}:{:02} ({:?}), poll every {:?}",
            self.schedule.hour,
            self.schedule.minute,
            self.schedule.zone,
            interval
        );
        let join = std::thread::Builder::new()
            .name("quota-reset".into())
            .spawn(move || loop {
                self.poll();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(SchedulerHandle { stop_tx, join: Some(join) })
    }
}

/// Stops the polling thread on `stop()` or drop.
pub struct SchedulerHandle {
    stop_tx: Sender<()>,
    join:    Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("reset scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
