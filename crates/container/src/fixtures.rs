//! In-memory container builder for tests.
//!
//! Produces well-formed container bytes with correct checksums; tests then
//! flip bytes to simulate corruption. Only compiled for tests or with the
//! `test-util` feature.

use byteorder::{LittleEndian, WriteBytesExt};
use checksum::{header_checksum, payload_checksum};

use crate::format::{Schema, CONTAINER_MAGIC, FIRST_RECORD_OFFSET, FIRST_RECORD_OFFSET_EXTENDED, VERSION_8_V2};

/// One record to emit.
#[derive(Debug, Clone, Default)]
pub struct RecordSpec {
    pub hash: u64,
    pub name: String,
    pub payload: Vec<u8>,
    pub padding: usize,
    /// Written into the Vista extension slot (at most 4 units).
    pub extension: Option<String>,
    /// Written for 8+ schemas; `(0, 0)` when `None`.
    pub dimensions: Option<(u32, u32)>,
}

impl RecordSpec {
    pub fn new(hash: u64, name: &str, payload: &[u8]) -> Self {
        Self {
            hash,
            name: name.to_string(),
            payload: payload.to_vec(),
            ..Self::default()
        }
    }

    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn extension(mut self, ext: &str) -> Self {
        self.extension = Some(ext.to_string());
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }
}

/// Built container bytes plus the header offset of each emitted record.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub bytes: Vec<u8>,
    pub offsets: Vec<u64>,
}

impl Fixture {
    /// Overwrites the magic of the `n`-th record.
    pub fn corrupt_magic(&mut self, n: usize) {
        let at = self.offsets[n] as usize;
        self.bytes[at..at + 4].copy_from_slice(b"XXXX");
    }

    /// Flips one byte at an absolute offset.
    pub fn flip(&mut self, at: u64) {
        self.bytes[at as usize] ^= 0xFF;
    }
}

/// Builds container files record by record.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    version: u32,
    type_tag: u32,
    schema: Schema,
    bytes: Vec<u8>,
    offsets: Vec<u64>,
}

impl ContainerBuilder {
    /// Starts a container with the given version.
    ///
    /// # Panics
    ///
    /// Panics if `version` is not a known schema version.
    pub fn new(version: u32) -> Self {
        let schema = Schema::from_version(version).expect("fixture version must be known");
        let first = if version == VERSION_8_V2 {
            FIRST_RECORD_OFFSET_EXTENDED
        } else {
            FIRST_RECORD_OFFSET
        };
        let mut bytes = Vec::with_capacity(4096);
        bytes.extend_from_slice(&CONTAINER_MAGIC);
        bytes.write_u32::<LittleEndian>(version).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.resize(first as usize, 0);
        Self {
            version,
            type_tag: 0,
            schema,
            bytes,
            offsets: Vec::new(),
        }
    }

    pub fn type_tag(mut self, tag: u32) -> Self {
        self.type_tag = tag;
        self.bytes[8..12].copy_from_slice(&tag.to_le_bytes());
        self
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Appends a record with correct header and data checksums.
    pub fn record(mut self, spec: RecordSpec) -> Self {
        let name_bytes: Vec<u8> = spec
            .name
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let header_len = self.schema.header_len();
        let size = header_len + name_bytes.len() + spec.padding + spec.payload.len();

        let mut h = Vec::with_capacity(header_len);
        h.extend_from_slice(&CONTAINER_MAGIC);
        h.write_u32::<LittleEndian>(size as u32).unwrap();
        h.write_u64::<LittleEndian>(spec.hash).unwrap();
        if self.schema == Schema::Vista {
            let mut units = [0u16; 4];
            if let Some(ref ext) = spec.extension {
                for (slot, u) in units.iter_mut().zip(ext.encode_utf16()) {
                    *slot = u;
                }
            }
            for u in units {
                h.write_u16::<LittleEndian>(u).unwrap();
            }
        }
        h.write_u32::<LittleEndian>(name_bytes.len() as u32).unwrap();
        h.write_u32::<LittleEndian>(spec.padding as u32).unwrap();
        h.write_u32::<LittleEndian>(spec.payload.len() as u32).unwrap();
        if self.schema == Schema::Eight {
            let (w, ht) = spec.dimensions.unwrap_or((0, 0));
            h.write_u32::<LittleEndian>(w).unwrap();
            h.write_u32::<LittleEndian>(ht).unwrap();
        }
        h.write_u32::<LittleEndian>(0).unwrap();
        h.write_u64::<LittleEndian>(payload_checksum(&spec.payload)).unwrap();
        let header_crc = header_checksum(&h);
        h.write_u64::<LittleEndian>(header_crc).unwrap();
        debug_assert_eq!(h.len(), header_len);

        self.offsets.push(self.bytes.len() as u64);
        self.bytes.extend_from_slice(&h);
        self.bytes.extend_from_slice(&name_bytes);
        self.bytes.resize(self.bytes.len() + spec.padding, 0);
        self.bytes.extend_from_slice(&spec.payload);
        self
    }

    /// Appends raw bytes (garbage, trailing free space, ...).
    pub fn raw(mut self, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn build(self) -> Fixture {
        Fixture {
            bytes: self.bytes,
            offsets: self.offsets,
        }
    }
}

/// A small JPEG-looking payload.
pub fn jpeg_payload(len: usize) -> Vec<u8> {
    let mut p = vec![0xFF, 0xD8, 0xFF, 0xE0];
    p.extend((0..len.saturating_sub(4)).map(|i| (i % 253) as u8));
    p
}

/// A small PNG-looking payload.
pub fn png_payload(len: usize) -> Vec<u8> {
    let mut p = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    p.extend((0..len.saturating_sub(8)).map(|i| (i % 241) as u8));
    p
}

/// A small bitmap-looking payload.
pub fn bmp_payload(len: usize) -> Vec<u8> {
    let mut p = b"BM".to_vec();
    p.extend((0..len.saturating_sub(2)).map(|i| (i % 239) as u8));
    p
}
