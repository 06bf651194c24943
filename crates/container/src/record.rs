//! Parsed record model: flags, the shared per-container descriptor, and the
//! visible record collection.

use bitflags::bitflags;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::format::{ContentType, Schema};

bitflags! {
    /// Per-record state: detected content type plus index and verification
    /// bookkeeping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u32 {
        const BITMAP = 1 << 0;
        const JPEG = 1 << 1;
        const PNG = 1 << 2;
        /// Linked into the hash index.
        const INDEXED = 1 << 3;
        /// Both checksums have been computed.
        const VERIFIED = 1 << 4;
        const HEADER_MISMATCH = 1 << 5;
        const PAYLOAD_MISMATCH = 1 << 6;

        const CONTENT_TYPE = Self::BITMAP.bits() | Self::JPEG.bits() | Self::PNG.bits();
    }
}

impl EntryFlags {
    #[must_use]
    pub fn content_type(self) -> ContentType {
        if self.contains(EntryFlags::BITMAP) {
            ContentType::Bitmap
        } else if self.contains(EntryFlags::JPEG) {
            ContentType::Jpeg
        } else if self.contains(EntryFlags::PNG) {
            ContentType::Png
        } else {
            ContentType::Unknown
        }
    }

    pub fn set_content_type(&mut self, ty: ContentType) {
        self.remove(EntryFlags::CONTENT_TYPE);
        match ty {
            ContentType::Unknown => {}
            ContentType::Bitmap => self.insert(EntryFlags::BITMAP),
            ContentType::Jpeg => self.insert(EntryFlags::JPEG),
            ContentType::Png => self.insert(EntryFlags::PNG),
        }
    }
}

/// Metadata shared by every record parsed from one container file.
///
/// Records hold it through an `Arc`; the descriptor goes away with the last
/// record that references it.
#[derive(Debug, PartialEq, Eq)]
pub struct SharedContainerInfo {
    path: PathBuf,
    version: u32,
    type_tag: u32,
    schema: Schema,
    first_record_offset: u64,
}

impl SharedContainerInfo {
    pub fn new(
        path: PathBuf,
        version: u32,
        type_tag: u32,
        schema: Schema,
        first_record_offset: u64,
    ) -> Self {
        Self {
            path,
            version,
            type_tag,
            schema,
            first_record_offset,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn type_tag(&self) -> u32 {
        self.type_tag
    }

    #[must_use]
    pub fn schema(&self) -> Schema {
        self.schema
    }

    #[must_use]
    pub fn first_record_offset(&self) -> u64 {
        self.first_record_offset
    }

    /// Number of live handles, i.e. records still referencing this container.
    #[must_use]
    pub fn live_records(self: &Arc<Self>) -> usize {
        Arc::strong_count(self)
    }
}

/// One image entry recovered from a container.
#[derive(Debug, Clone)]
pub struct CacheEntryRecord {
    /// Content hash; the index key.
    pub hash: u64,
    pub stored_data_checksum: u64,
    pub stored_header_checksum: u64,
    /// Equal to the stored value until verification runs.
    pub computed_data_checksum: u64,
    /// Equal to the stored value until verification runs.
    pub computed_header_checksum: u64,
    /// Display name. Renaming never touches the container.
    pub name: String,
    pub header_offset: u64,
    pub payload_offset: u64,
    pub payload_len: u32,
    pub dimensions: Option<(u32, u32)>,
    pub extension_hint: Option<String>,
    pub flags: EntryFlags,
    pub container: Arc<SharedContainerInfo>,
}

impl CacheEntryRecord {
    #[must_use]
    pub fn schema(&self) -> Schema {
        self.container.schema()
    }

    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.flags.content_type()
    }

    /// A record without payload bytes.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.payload_len == 0
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.flags.contains(EntryFlags::INDEXED)
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.flags.contains(EntryFlags::VERIFIED)
    }

    #[must_use]
    pub fn has_mismatch(&self) -> bool {
        self.flags
            .intersects(EntryFlags::HEADER_MISMATCH | EntryFlags::PAYLOAD_MISMATCH)
    }
}

/// Stable identifier of a record within a [`RecordSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The visible record collection, iterated in insertion (parse) order.
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    records: BTreeMap<RecordId, CacheEntryRecord>,
    next_id: u64,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record under a fresh id.
    pub fn insert(&mut self, record: CacheEntryRecord) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        self.records.insert(id, record);
        id
    }

    /// Puts a record back under an id it was previously given. Returns the
    /// record that held the id, if any.
    pub fn restore(&mut self, id: RecordId, record: CacheEntryRecord) -> Option<CacheEntryRecord> {
        self.next_id = self.next_id.max(id.0 + 1);
        self.records.insert(id, record)
    }

    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&CacheEntryRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut CacheEntryRecord> {
        self.records.get_mut(&id)
    }

    pub fn remove(&mut self, id: RecordId) -> Option<CacheEntryRecord> {
        self.records.remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &CacheEntryRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RecordId, &mut CacheEntryRecord)> {
        self.records.iter_mut().map(|(id, r)| (*id, r))
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record. Ids are not reused.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
