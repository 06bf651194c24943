//! # Mapper - hash to record index
//!
//! Maps a 64-bit content hash to every visible record carrying it. Each tree
//! node holds the head of a singly linked **collision chain**; a second
//! record with the same hash is linked directly after the head rather than
//! rejected.
//!
//! ```text
//!   RbTree<u64, CollisionChainNode>
//!
//!   0x1f.. -> [#3] -> [#9] -> [#4]      (#3 first indexed, #4 second, #9 third)
//!   0x7a.. -> [#1]
//! ```
//!
//! The mapper only stores [`RecordId`]s. Record data stays in the caller's
//! [`RecordSet`]; operations that touch records take it as an argument.

use std::fmt;

use container::{EntryFlags, RecordId, RecordSet};
use rbtree::{IndexError, RbTree};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by mapper operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapperError {
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The hash is not indexed, or its chain does not hold the record.
    #[error("record {id} is not indexed under hash {hash:016x}")]
    KeyNotFound { hash: u64, id: RecordId },
}

/// One link of a collision chain.
///
/// Chains can be as long as a container has records, so dropping and
/// formatting walk the links in a loop.
pub struct CollisionChainNode {
    pub record: RecordId,
    pub next: Option<Box<CollisionChainNode>>,
}

impl CollisionChainNode {
    fn new(record: RecordId) -> Self {
        Self { record, next: None }
    }

    /// Links `record` directly after this node.
    fn link_after(&mut self, record: RecordId) {
        let next = self.next.take();
        self.next = Some(Box::new(CollisionChainNode { record, next }));
    }

    /// Iterates the chain from this node on.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { cur: Some(self) }
    }

    /// Unlinks the first node after this one that holds `id`.
    fn unlink_after(&mut self, id: RecordId) -> bool {
        let mut cur = self;
        loop {
            match cur.next.as_deref() {
                None => return false,
                Some(next) if next.record == id => {
                    if let Some(mut target) = cur.next.take() {
                        cur.next = target.next.take();
                    }
                    return true;
                }
                Some(_) => {}
            }
            match cur.next.as_deref_mut() {
                Some(next) => cur = next,
                None => return false,
            }
        }
    }
}

impl Drop for CollisionChainNode {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut node) = next {
            next = node.next.take();
        }
    }
}

impl fmt::Debug for CollisionChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over the record ids of one chain.
pub struct ChainIter<'a> {
    cur: Option<&'a CollisionChainNode>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = RecordId;

    fn next(&mut self) -> Option<RecordId> {
        let node = self.cur?;
        self.cur = node.next.as_deref();
        Some(node.record)
    }
}

/// Outcome of [`HashMapper::build_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Records that started a new chain.
    pub inserted: usize,
    /// Records linked into an existing chain.
    pub linked: usize,
    /// Records left unindexed because the index could not grow.
    pub skipped: usize,
    /// Records that were already indexed.
    pub already_indexed: usize,
}

impl IndexReport {
    #[must_use]
    pub fn indexed(&self) -> usize {
        self.inserted + self.linked
    }
}

/// Collision-chained index over content hashes.
#[derive(Debug, Default)]
pub struct HashMapper {
    tree: RbTree<u64, CollisionChainNode>,
}

impl HashMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    #[must_use]
    pub fn contains(&self, hash: u64) -> bool {
        self.tree.contains_key(&hash)
    }

    /// Indexes every record in `records` not yet flagged `INDEXED`.
    ///
    /// A record whose insert fails for lack of memory stays unflagged, so a
    /// later call retries it.
    pub fn build_index(&mut self, records: &mut RecordSet) -> IndexReport {
        let mut report = IndexReport::default();

        for (id, rec) in records.iter_mut() {
            if rec.is_indexed() {
                report.already_indexed += 1;
                continue;
            }
            if let Some(head) = self.tree.get_mut(&rec.hash) {
                head.link_after(id);
                rec.flags.insert(EntryFlags::INDEXED);
                report.linked += 1;
                continue;
            }
            match self.tree.insert(rec.hash, CollisionChainNode::new(id)) {
                Ok(_) => {
                    rec.flags.insert(EntryFlags::INDEXED);
                    report.inserted += 1;
                }
                Err(e) => {
                    warn!(record = %id, hash = rec.hash, error = %e, "record left unindexed");
                    report.skipped += 1;
                }
            }
        }

        debug!(
            inserted = report.inserted,
            linked = report.linked,
            skipped = report.skipped,
            hashes = self.tree.len(),
            "index built"
        );
        report
    }

    /// Renames every record chained under `hash` to `observed_path`.
    ///
    /// Returns the number of records renamed; `0` when the hash is unknown.
    pub fn resolve_hash(&self, hash: u64, observed_path: &str, records: &mut RecordSet) -> usize {
        let Some(head) = self.tree.get(&hash) else {
            return 0;
        };
        let mut matched = 0;
        for id in head.iter() {
            if let Some(rec) = records.get_mut(id) {
                rec.name = observed_path.to_string();
                matched += 1;
            }
        }
        if matched > 0 {
            debug!(hash, matched, "hash resolved");
        }
        matched
    }

    /// Unlinks `id` from the chain under `hash`.
    ///
    /// Removing the head promotes the next link; removing the last link
    /// drops the hash from the index.
    ///
    /// # Errors
    ///
    /// [`MapperError::KeyNotFound`] if the hash is unknown or its chain does
    /// not contain `id`.
    pub fn remove_record(&mut self, id: RecordId, hash: u64) -> Result<(), MapperError> {
        let not_found = MapperError::KeyNotFound { hash, id };
        let loc = self.tree.find(&hash).ok_or_else(|| not_found.clone())?;
        let head = self.tree.value_mut(loc).ok_or_else(|| not_found.clone())?;

        if head.record == id {
            match head.next.take() {
                Some(next) => *head = *next,
                None => {
                    self.tree.remove(loc)?;
                }
            }
            return Ok(());
        }

        if head.unlink_after(id) {
            Ok(())
        } else {
            Err(not_found)
        }
    }

    /// Record ids chained under `hash`, head first.
    #[must_use]
    pub fn chain(&self, hash: u64) -> Vec<RecordId> {
        self.tree
            .get(&hash)
            .map(|head| head.iter().collect())
            .unwrap_or_default()
    }

    /// Drops the whole index. Records keep their `INDEXED` flag; callers
    /// that rebuild should clear it first with [`HashMapper::reset`].
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Drops the index and clears `INDEXED` on every record in `records`.
    pub fn reset(&mut self, records: &mut RecordSet) {
        self.tree.clear();
        for (_, rec) in records.iter_mut() {
            rec.flags.remove(EntryFlags::INDEXED);
        }
    }
}

#[cfg(test)]
mod tests;
