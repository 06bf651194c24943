//! # Container - cache database reader
//!
//! Reads `CMMM` thumbnail cache containers: a small file header followed by
//! variable-length image records packed back to back. The reader is built to
//! survive damaged files:
//!
//! - a record with a bad magic is skipped by scanning forward for the next
//!   `CMMM` tag;
//! - a record whose content hash is zero marks the end of valid data and is
//!   skipped rather than reported;
//! - a record whose declared size runs past the end of the file ends the walk
//!   but keeps every record decoded before it.
//!
//! ## Version history
//!
//! | Version | Name  | Record header | Extra fields                     |
//! |---------|-------|---------------|----------------------------------|
//! | `0x14`  | Vista | 56 B          | inline 4-unit extension hint     |
//! | `0x15`  | 7     | 48 B          |                                  |
//! | `0x1A`+ | 8-10  | 56 B          | width, height                    |
//!
//! Version `0x1C` also shifts the first record from offset 24 to 28.
//!
//! ## Example
//!
//! ```rust,no_run
//! use container::{parse_container, verify_in_file};
//!
//! let mut parsed = parse_container("thumbcache_256.db").unwrap();
//! for rec in &mut parsed.records {
//!     let outcome = verify_in_file(rec).unwrap();
//!     println!("{:016x} {} ok={}", rec.hash, rec.name, outcome.is_ok());
//! }
//! ```

mod format;
mod reader;
mod record;
mod verify;

#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;

use std::io;

use thiserror::Error;

pub use format::{
    has_magic, read_file_header, sniff, ContentType, FileHeader, RecordHeader, Schema,
    BMP_SIGNATURE, CONTAINER_MAGIC, FILE_HEADER_BYTES, FIRST_RECORD_OFFSET,
    FIRST_RECORD_OFFSET_EXTENDED, JPEG_SIGNATURE, PNG_SIGNATURE, SNIFF_BYTES, VERSION_10,
    VERSION_7, VERSION_8, VERSION_8_1, VERSION_8_V2, VERSION_8_V3, VERSION_VISTA,
};
pub use reader::{
    parse_container, scan_memory, ContainerReader, ParsedContainer, Termination, MAX_NAME_UNITS,
    SCAN_CHUNK_BYTES,
};
pub use record::{CacheEntryRecord, EntryFlags, RecordId, RecordSet, SharedContainerInfo};
pub use verify::{verify_in_file, verify_record, VerificationOutcome};

/// Errors raised while reading a container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Short file or wrong file magic.
    #[error("not a cache container")]
    NotAContainer,

    /// File magic is fine but the version is not one we can lay out.
    #[error("unsupported container version {0:#x}")]
    UnsupportedSchema(u32),

    /// A record's size or offsets run past the end of the file.
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },
}

impl ContainerError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        ContainerError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }
}
