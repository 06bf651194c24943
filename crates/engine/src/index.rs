//! Index maintenance and the record edits that go through it.

use anyhow::{bail, Result};
use container::RecordId;
use mapper::IndexReport;
use tracing::{debug, warn};

use crate::Session;

impl Session {
    /// Links every not-yet-indexed visible record into the hash index.
    pub fn build_index(&self) -> IndexReport {
        let _op = self.begin_operation();
        self.index_locked()
    }

    pub(crate) fn index_locked(&self) -> IndexReport {
        let mut st = self.state.lock();
        let st = &mut *st;
        st.mapper.build_index(&mut st.records)
    }

    /// Renames every visible record whose hash is `hash` to `path`. Returns
    /// the number renamed.
    pub fn resolve(&self, hash: u64, path: &str) -> usize {
        let mut st = self.state.lock();
        let st = &mut *st;
        st.mapper.resolve_hash(hash, path, &mut st.records)
    }

    /// Record ids indexed under `hash`, head of the chain first.
    #[must_use]
    pub fn lookup(&self, hash: u64) -> Vec<RecordId> {
        self.state.lock().mapper.chain(hash)
    }

    /// Removes records from the session (never from the container file).
    /// Returns how many of `ids` were present, hidden blanks included.
    pub fn remove(&self, ids: &[RecordId]) -> usize {
        let _op = self.operations.lock();
        let mut st = self.state.lock();
        let mut removed = 0;

        for &id in ids {
            if let Some(rec) = st.records.remove(id) {
                if rec.is_indexed() {
                    if let Err(e) = st.mapper.remove_record(id, rec.hash) {
                        warn!(record = %id, error = %e, "removed record was not in the index");
                    }
                }
                removed += 1;
            } else if let Some(pos) = st.blanks.iter().position(|n| n.id == id) {
                st.blanks.remove(pos);
                removed += 1;
            }
        }

        debug!(requested = ids.len(), removed, "records removed");
        removed
    }

    /// Changes the display name of a visible record.
    ///
    /// # Errors
    ///
    /// Fails if `id` is not a visible record.
    pub fn rename(&self, id: RecordId, name: &str) -> Result<()> {
        let mut st = self.state.lock();
        match st.records.get_mut(id) {
            Some(rec) => {
                rec.name = name.to_string();
                Ok(())
            }
            None => bail!("no visible record {}", id),
        }
    }
}
