//! # Engine - cache browsing session
//!
//! Ties the [`container`] reader and the [`mapper`] index together into one
//! explicit [`Session`]: the visible record collection, the hash index, the
//! list of hidden blank records, a single lock guarding all three, and a
//! cancellation flag shared with background workers.
//!
//! ## Data flow
//!
//! ```text
//! paths ──► open.rs ──► ContainerReader::parse ──► RecordSet
//!                                                   │
//!                    blank.rs ◄── hide blank ───────┤
//!                                                   │
//!                    index.rs ──► HashMapper ◄──────┤
//!                                   │               │
//!   (hash, path) ──► resolve ───────┘               │
//!                                                   │
//!                    verify.rs ──► checksums ◄──────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                   |
//! |--------------|-----------------------------------------------------------|
//! | `lib.rs`     | `Session` struct, state, cancel flag, snapshots, `Debug`  |
//! | `open`       | `open_paths()`, directory expansion, `BatchReport`        |
//! | `verify`     | `verify()` over a selection, `VerifyReport`               |
//! | `index`      | `build_index()`, `resolve()`, `remove()`, `rename()`      |
//! | `blank`      | `set_hide_blank()`, the hidden blank list                 |
//! | `worker`     | `spawn()`, bounded `wait()`, `shutdown()`                 |
//!
//! ## Locking
//!
//! Long operations (open, verify, index, remove) hold the operation lock
//! from start to finish, parsing included, so at most one runs at a time.
//! Every read or write of records also takes the state lock, which is only
//! held briefly and always after the operation lock. Snapshots such as
//! [`Session::records`] therefore stay available while a worker parses.
//!
//! ## Cancellation
//!
//! [`Session::cancel`] raises a flag that long operations poll per file, per
//! record and per container. A cancelled operation returns early without
//! error and keeps whatever it already attached. The flag is lowered when the
//! outermost long operation on the handle finishes, never when one starts,
//! so a request made just before an operation begins still stops it.
//!
//! Workers get a flag of their own from [`Session::spawn`]. It is raised by
//! [`Worker::cancel`] or [`Session::shutdown`] and stays raised for the rest
//! of the worker's life.

mod blank;
mod index;
mod open;
mod verify;
mod worker;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::Config;
use container::{CacheEntryRecord, RecordId, RecordSet};
use mapper::HashMapper;
use parking_lot::{Mutex, MutexGuard};

pub use blank::BlankEntryNode;
pub use mapper::IndexReport;
pub use open::{expand_paths, BatchReport, FileFailure};
pub use verify::{Selection, VerifyReport};
pub use worker::Worker;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    raised: Arc<AtomicBool>,
    one_shot: bool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that finishing an operation does not lower.
    pub fn one_shot() -> Self {
        Self {
            raised: Arc::default(),
            one_shot: true,
        }
    }

    pub fn cancel(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    fn settle(&self) {
        if !self.one_shot {
            self.reset();
        }
    }
}

/// Held for the duration of one long operation.
pub(crate) struct Operation<'a> {
    _serial: MutexGuard<'a, ()>,
    cancel: &'a CancelFlag,
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        self.cancel.settle();
    }
}

/// Everything guarded by the session lock.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) records: RecordSet,
    pub(crate) mapper: HashMapper,
    pub(crate) blanks: Vec<BlankEntryNode>,
    pub(crate) hide_blank: bool,
}

/// Counters for the `stats` view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub records: usize,
    pub hidden_blanks: usize,
    pub indexed_hashes: usize,
    /// Distinct containers still referenced by visible records.
    pub containers: usize,
    pub verified: usize,
    pub mismatched: usize,
}

/// A browsing session over any number of cache containers.
///
/// Cloning is cheap and yields another handle to the same session; this is
/// how [`Session::spawn`] hands the session to a worker thread.
#[derive(Clone)]
pub struct Session {
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) operations: Arc<Mutex<()>>,
    pub(crate) cancel: CancelFlag,
    pub(crate) config: Arc<Config>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Session")
            .field("records", &stats.records)
            .field("hidden_blanks", &stats.hidden_blanks)
            .field("indexed_hashes", &stats.indexed_hashes)
            .field("containers", &stats.containers)
            .field("verified", &stats.verified)
            .field("mismatched", &stats.mismatched)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Session {
    /// Creates an empty session. Blank hiding starts out as configured.
    pub fn new(config: Config) -> Self {
        let state = SessionState {
            hide_blank: config.hide_blank,
            ..SessionState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            operations: Arc::new(Mutex::new(())),
            cancel: CancelFlag::new(),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Asks the long operation running on this handle, or the next one to
    /// start, to stop. Spawned workers are cancelled through their
    /// [`Worker`] instead.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A handle to the session's cancellation flag.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Copies out the visible records in id order.
    #[must_use]
    pub fn records(&self) -> Vec<(RecordId, CacheEntryRecord)> {
        let st = self.state.lock();
        st.records.iter().map(|(id, r)| (id, r.clone())).collect()
    }

    /// Copies out one visible record.
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<CacheEntryRecord> {
        self.state.lock().records.get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let st = self.state.lock();
        let containers: HashSet<*const container::SharedContainerInfo> = st
            .records
            .iter()
            .map(|(_, r)| Arc::as_ptr(&r.container))
            .collect();
        SessionStats {
            records: st.records.len(),
            hidden_blanks: st.blanks.len(),
            indexed_hashes: st.mapper.len(),
            containers: containers.len(),
            verified: st.records.iter().filter(|(_, r)| r.is_verified()).count(),
            mismatched: st.records.iter().filter(|(_, r)| r.has_mismatch()).count(),
        }
    }

    /// Waits for any running long operation, then holds off others until
    /// the returned guard drops.
    pub(crate) fn begin_operation(&self) -> Operation<'_> {
        Operation {
            _serial: self.operations.lock(),
            cancel: &self.cancel,
        }
    }

    /// Drops every record, hidden blank and index entry.
    pub fn clear(&self) {
        let _op = self.operations.lock();
        let mut st = self.state.lock();
        st.mapper.clear();
        st.records.clear();
        st.blanks.clear();
    }
}

#[cfg(test)]
mod tests;
