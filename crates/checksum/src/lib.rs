//! # Checksum - CRC-64 record verification
//!
//! Cache containers protect every record with two 64-bit checksums: one over
//! the record header and one over the payload. Both use the same table-driven
//! CRC-64 fold (reflected polynomial `0x95AC9329AC4BC9B5`), differing only in
//! seed and in which bytes are fed to it.
//!
//! ## Header rule
//!
//! ```text
//! header_checksum = crc64(header bytes before the checksum field, seed = !0)
//! ```
//!
//! ## Payload rule
//!
//! ```text
//! len <= 1024:  crc64(payload, 0)
//! len  > 1024:  A = crc64(payload[..1024], 0)
//!               B = fold of payload[1024 + 400*i .. +4] for every 400-byte
//!                   chunk i of the tail (partial last chunk: up to 4 bytes)
//!               A ^ B
//! ```
//!
//! The payload rule samples only four bytes per 400 past the first KiB, so
//! [`payload_checksum_from`] seeks over the rest instead of reading it.
//!
//! ## Example
//!
//! ```rust
//! use checksum::{crc64, payload_checksum};
//!
//! let data = b"thumbnail";
//! assert_eq!(payload_checksum(data), crc64(data, 0));
//! ```

use std::io::{self, Read, Seek, SeekFrom};

/// Reflected form of the CRC-64 polynomial used by the container format.
pub const POLY: u64 = 0x95AC_9329_AC4B_C9B5;

/// Seed for header checksums.
pub const HEADER_SEED: u64 = u64::MAX;

/// Seed for payload checksums (both the leading region and the sample fold).
pub const PAYLOAD_SEED: u64 = 0;

/// Payloads up to this length are hashed in full.
pub const LEADING_REGION: usize = 1024;

/// Distance between sampled positions in the trailing region.
pub const SAMPLE_STRIDE: usize = 400;

/// Bytes taken from the start of each trailing chunk.
pub const SAMPLE_WIDTH: usize = 4;

static TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Folds `data` into `seed`. No inversion is applied on either end.
#[must_use]
pub fn crc64(data: &[u8], seed: u64) -> u64 {
    data.iter().fold(seed, |crc, &b| {
        TABLE[((crc ^ u64::from(b)) & 0xFF) as usize] ^ (crc >> 8)
    })
}

/// Checksum of the header bytes preceding the stored header checksum.
#[must_use]
pub fn header_checksum(header: &[u8]) -> u64 {
    crc64(header, HEADER_SEED)
}

/// Payload checksum of an in-memory buffer.
#[must_use]
pub fn payload_checksum(payload: &[u8]) -> u64 {
    if payload.len() <= LEADING_REGION {
        return crc64(payload, PAYLOAD_SEED);
    }
    let (lead, tail) = payload.split_at(LEADING_REGION);
    let sampled = tail
        .chunks(SAMPLE_STRIDE)
        .fold(PAYLOAD_SEED, |acc, chunk| {
            crc64(&chunk[..chunk.len().min(SAMPLE_WIDTH)], acc)
        });
    crc64(lead, PAYLOAD_SEED) ^ sampled
}

/// Payload checksum read straight from a container.
///
/// Seeks to `offset` and reads only the bytes the payload rule samples.
/// Leaves the reader positioned after the last sampled byte.
///
/// # Errors
///
/// Returns `UnexpectedEof` if the payload runs past the end of the stream.
pub fn payload_checksum_from<R: Read + Seek>(r: &mut R, offset: u64, len: u64) -> io::Result<u64> {
    r.seek(SeekFrom::Start(offset))?;

    let lead_len = len.min(LEADING_REGION as u64) as usize;
    let mut lead = vec![0u8; lead_len];
    r.read_exact(&mut lead)?;
    let lead_crc = crc64(&lead, PAYLOAD_SEED);
    if len <= LEADING_REGION as u64 {
        return Ok(lead_crc);
    }

    let tail_start = offset + LEADING_REGION as u64;
    let tail_len = len - LEADING_REGION as u64;
    let mut acc = PAYLOAD_SEED;
    let mut sample = [0u8; SAMPLE_WIDTH];
    let mut pos = 0u64;
    while pos < tail_len {
        let take = (tail_len - pos).min(SAMPLE_WIDTH as u64) as usize;
        r.seek(SeekFrom::Start(tail_start + pos))?;
        r.read_exact(&mut sample[..take])?;
        acc = crc64(&sample[..take], acc);
        pos += SAMPLE_STRIDE as u64;
    }

    Ok(lead_crc ^ acc)
}

#[cfg(test)]
mod tests;
