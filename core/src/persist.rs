//! Background persistence of quota state and the spin log.
//!
//! RULE: callers enqueue and move on. The worker thread owns the store;
//! a failed write is logged and published, never returned to the spin path.
//! The in-memory QuotaTracker stays authoritative for the running session.

use crate::{
    error::{DispenserError, DispenserResult},
    event::{DispenserEvent, EventBus},
    quota::{QuotaSink, QuotaState},
    store::{QuotaStore, SpinRecord},
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::{sync::Arc, thread::JoinHandle};

type StoreJob = Box<dyn FnOnce(&mut QuotaStore) + Send>;

enum PersistCommand {
    SaveQuota(QuotaState),
    RecordSpin(SpinRecord),
    Run(StoreJob),
    Shutdown,
}

pub struct Persister {
    tx:   Sender<PersistCommand>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Persister {
    /// Start the writer thread. `store` must already be migrated.
    pub fn spawn(store: QuotaStore, events: Arc<EventBus>) -> DispenserResult<Self> {
        let (tx, rx) = unbounded();
        let join = std::thread::Builder::new()
            .name("quota-persist".into())
            .spawn(move || worker(store, rx, events))?;
        Ok(Self { tx, join: Mutex::new(Some(join)) })
    }

    pub fn save_quota(&self, state: QuotaState) {
        self.enqueue(PersistCommand::SaveQuota(state));
    }

    pub fn record_spin(&self, record: SpinRecord) {
        self.enqueue(PersistCommand::RecordSpin(record));
    }

    /// Run `f` against the store on the worker thread, after every write
    /// queued before it, and wait for the result.
    pub fn with_store<R, F>(&self, f: F) -> DispenserResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut QuotaStore) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        let job: StoreJob = Box::new(move |store| {
            let _ = reply_tx.send(f(store));
        });
        self.tx
            .send(PersistCommand::Run(job))
            .map_err(|_| DispenserError::PersistenceClosed)?;
        reply_rx.recv().map_err(|_| DispenserError::PersistenceClosed)
    }

    /// Block until every write queued so far has been attempted.
    pub fn flush(&self) -> DispenserResult<()> {
        self.with_store(|_| ())
    }

    fn enqueue(&self, command: PersistCommand) {
        if self.tx.send(command).is_err() {
            log::error!("persistence worker is gone; dropping write");
        }
    }
}

impl QuotaSink for Persister {
    fn quota_changed(&self, state: &QuotaState) {
        self.save_quota(state.clone());
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        let _ = self.tx.send(PersistCommand::Shutdown);
        if let Some(join) = self.join.lock().take() {
            if join.join().is_err() {
                log::error!("persistence worker panicked");
            }
        }
    }
}

fn worker(mut store: QuotaStore, rx: Receiver<PersistCommand>, events: Arc<EventBus>) {
    log::debug!("persistence worker started");
    for command in rx {
        let (what, result) = match command {
            PersistCommand::SaveQuota(state) => ("quota", store.save_quota_state(&state)),
            PersistCommand::RecordSpin(record) => ("spin", store.append_spin(&record)),
            PersistCommand::Run(job) => {
                job(&mut store);
                continue;
            }
            PersistCommand::Shutdown => break,
        };
        if let Err(e) = result {
            log::error!("failed to persist {what}: {e}");
            events.publish(DispenserEvent::PersistenceFailed {
                what: what.to_string(),
                error: e.to_string(),
            });
        }
    }
    log::debug!("persistence worker stopped");
}
