//! Hiding of zero-length records.

use container::{CacheEntryRecord, EntryFlags, RecordId};
use tracing::{debug, warn};

use crate::Session;

/// A blank record held outside the visible collection.
#[derive(Debug, Clone)]
pub struct BlankEntryNode {
    /// The id the record had, and gets back when restored.
    pub id: RecordId,
    pub record: CacheEntryRecord,
}

impl Session {
    #[must_use]
    pub fn hide_blank(&self) -> bool {
        self.state.lock().hide_blank
    }

    /// Turns blank hiding on or off and returns how many records moved.
    ///
    /// Hiding unlinks each blank record from the index and moves it to the
    /// hidden list. Showing puts every hidden record back under its original
    /// id, unindexed; the next [`Session::build_index`] picks them up.
    pub fn set_hide_blank(&self, hide: bool) -> usize {
        let _op = self.operations.lock();
        let mut st = self.state.lock();
        st.hide_blank = hide;

        let moved = if hide {
            let blank_ids: Vec<RecordId> = st
                .records
                .iter()
                .filter(|(_, r)| r.is_blank())
                .map(|(id, _)| id)
                .collect();
            for &id in &blank_ids {
                let Some(mut record) = st.records.remove(id) else {
                    continue;
                };
                if record.is_indexed() {
                    if let Err(e) = st.mapper.remove_record(id, record.hash) {
                        warn!(record = %id, error = %e, "hidden record was not in the index");
                    }
                    record.flags.remove(EntryFlags::INDEXED);
                }
                st.blanks.push(BlankEntryNode { id, record });
            }
            blank_ids.len()
        } else {
            let hidden = std::mem::take(&mut st.blanks);
            let n = hidden.len();
            for node in hidden {
                st.records.restore(node.id, node.record);
            }
            n
        };

        debug!(hide, moved, "blank hiding changed");
        moved
    }

    /// Ids of the hidden blank records.
    #[must_use]
    pub fn hidden_blanks(&self) -> Vec<RecordId> {
        self.state.lock().blanks.iter().map(|n| n.id).collect()
    }
}
