//! Per-record checksum verification.
//!
//! Re-reads the header bytes and the sampled payload bytes of a record from
//! its container and compares them against the checksums stored in the
//! header. Results are cached on the record; a record that already carries
//! [`EntryFlags::VERIFIED`] is not read again.

use checksum::{header_checksum, payload_checksum_from};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};

use crate::record::{CacheEntryRecord, EntryFlags};

/// Result of verifying one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub header_ok: bool,
    pub payload_ok: bool,
    /// The record had been verified before; flags were reported as cached.
    pub skipped: bool,
}

impl VerificationOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.header_ok && self.payload_ok
    }

    fn from_flags(flags: EntryFlags) -> Self {
        Self {
            header_ok: !flags.contains(EntryFlags::HEADER_MISMATCH),
            payload_ok: !flags.contains(EntryFlags::PAYLOAD_MISMATCH),
            skipped: true,
        }
    }
}

/// Verifies `record` against the container bytes in `r`.
///
/// On success both computed checksums are stored on the record, the mismatch
/// flags are set or cleared, and `VERIFIED` is set.
///
/// # Errors
///
/// Propagates I/O errors (including `UnexpectedEof` when the container has
/// shrunk). The record is left untouched in that case.
pub fn verify_record<R: Read + Seek>(
    r: &mut R,
    record: &mut CacheEntryRecord,
) -> io::Result<VerificationOutcome> {
    if record.is_verified() {
        return Ok(VerificationOutcome::from_flags(record.flags));
    }

    let mut header = vec![0u8; record.schema().checksummed_len()];
    r.seek(SeekFrom::Start(record.header_offset))?;
    r.read_exact(&mut header)?;
    let header_crc = header_checksum(&header);
    let data_crc = payload_checksum_from(r, record.payload_offset, u64::from(record.payload_len))?;

    record.computed_header_checksum = header_crc;
    record.computed_data_checksum = data_crc;

    let header_ok = header_crc == record.stored_header_checksum;
    let payload_ok = data_crc == record.stored_data_checksum;
    record.flags.set(EntryFlags::HEADER_MISMATCH, !header_ok);
    record.flags.set(EntryFlags::PAYLOAD_MISMATCH, !payload_ok);
    record.flags.insert(EntryFlags::VERIFIED);

    Ok(VerificationOutcome {
        header_ok,
        payload_ok,
        skipped: false,
    })
}

/// Opens the record's container by path and verifies it.
pub fn verify_in_file(record: &mut CacheEntryRecord) -> io::Result<VerificationOutcome> {
    if record.is_verified() {
        return Ok(VerificationOutcome::from_flags(record.flags));
    }
    let f = File::open(record.container.path())?;
    verify_record(&mut BufReader::new(f), record)
}
