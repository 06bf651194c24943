//! Container binary format: constants, schema selection and header decoding.
//!
//! ## File header (12 bytes)
//!
//! ```text
//! [magic: "CMMM"][version: u32 LE][type: u32 LE]
//! ```
//!
//! The first record starts at offset 24, or 28 for version `0x1C` which
//! carries one extra reserved header field.
//!
//! ## Record header
//!
//! The version selects one of three fixed layouts:
//!
//! ```text
//! Vista (56 B): magic | size | hash | ext[4 x u16] | name_len | pad_len | data_len
//!               | reserved | data_crc | header_crc
//! 7     (48 B): magic | size | hash | name_len | pad_len | data_len
//!               | reserved | data_crc | header_crc
//! 8+    (56 B): magic | size | hash | name_len | pad_len | data_len | width | height
//!               | reserved | data_crc | header_crc
//! ```
//!
//! `size` is u32, `hash` and both checksums are u64, everything else u32.
//! The header checksum covers every byte before it.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

use crate::ContainerError;

/// Magic tag opening both the file header and every record header.
pub const CONTAINER_MAGIC: [u8; 4] = *b"CMMM";

/// Size of the fixed file header: magic + version + type.
pub const FILE_HEADER_BYTES: usize = 4 + 4 + 4;

/// Offset of the first record for every version except [`VERSION_8_V2`].
pub const FIRST_RECORD_OFFSET: u64 = 24;

/// Offset of the first record for [`VERSION_8_V2`].
pub const FIRST_RECORD_OFFSET_EXTENDED: u64 = 28;

pub const VERSION_VISTA: u32 = 0x14;
pub const VERSION_7: u32 = 0x15;
pub const VERSION_8: u32 = 0x1A;
pub const VERSION_8_V2: u32 = 0x1C;
pub const VERSION_8_V3: u32 = 0x1E;
pub const VERSION_8_1: u32 = 0x1F;
pub const VERSION_10: u32 = 0x20;

/// Bytes read from the start of a payload to detect its content type.
pub const SNIFF_BYTES: usize = 8;

pub const BMP_SIGNATURE: &[u8] = b"BM";
pub const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];
pub const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Record header layout, selected by the container version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// Carries a 4-unit UTF-16 extension hint after the hash.
    Vista,
    Seven,
    /// Carries image width and height after the payload length.
    Eight,
}

impl Schema {
    /// Maps a container version to its record layout, or `None` if the
    /// version is not one of the known values.
    #[must_use]
    pub fn from_version(version: u32) -> Option<Self> {
        match version {
            VERSION_VISTA => Some(Schema::Vista),
            VERSION_7 => Some(Schema::Seven),
            VERSION_8 | VERSION_8_V2 | VERSION_8_V3 | VERSION_8_1 | VERSION_10 => {
                Some(Schema::Eight)
            }
            _ => None,
        }
    }

    /// Full record header size in bytes.
    #[must_use]
    pub fn header_len(self) -> usize {
        match self {
            Schema::Vista => 56,
            Schema::Seven => 48,
            Schema::Eight => 56,
        }
    }

    /// Bytes covered by the header checksum (everything before it).
    #[must_use]
    pub fn checksummed_len(self) -> usize {
        self.header_len() - 8
    }
}

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub type_tag: u32,
    pub schema: Schema,
}

impl FileHeader {
    #[must_use]
    pub fn first_record_offset(&self) -> u64 {
        if self.version == VERSION_8_V2 {
            FIRST_RECORD_OFFSET_EXTENDED
        } else {
            FIRST_RECORD_OFFSET
        }
    }
}

/// Reads and validates the 12-byte file header from the current position.
///
/// # Errors
///
/// - [`ContainerError::NotAContainer`] on a short read or wrong magic.
/// - [`ContainerError::UnsupportedSchema`] on an unknown version.
pub fn read_file_header<R: Read>(r: &mut R) -> Result<FileHeader, ContainerError> {
    let mut buf = [0u8; FILE_HEADER_BYTES];
    match r.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(ContainerError::NotAContainer)
        }
        Err(e) => return Err(ContainerError::Io(e)),
    }
    if !has_magic(&buf) {
        return Err(ContainerError::NotAContainer);
    }

    let mut br = &buf[4..];
    let version = br.read_u32::<LittleEndian>()?;
    let type_tag = br.read_u32::<LittleEndian>()?;
    let schema = Schema::from_version(version).ok_or(ContainerError::UnsupportedSchema(version))?;

    Ok(FileHeader {
        version,
        type_tag,
        schema,
    })
}

/// `true` if `buf` starts with [`CONTAINER_MAGIC`].
#[must_use]
pub fn has_magic(buf: &[u8]) -> bool {
    buf.len() >= CONTAINER_MAGIC.len() && buf[..CONTAINER_MAGIC.len()] == CONTAINER_MAGIC
}

/// Decoded record header. Field presence follows the [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Total record size: header + name + padding + payload.
    pub size: u32,
    pub hash: u64,
    /// Vista only; trailing NULs stripped, `None` when blank.
    pub extension: Option<String>,
    /// Filename length in bytes (UTF-16LE).
    pub filename_len: u32,
    pub padding_len: u32,
    pub payload_len: u32,
    /// 8+ only.
    pub dimensions: Option<(u32, u32)>,
    pub reserved: u32,
    pub data_checksum: u64,
    pub header_checksum: u64,
}

impl RecordHeader {
    /// Decodes a header whose magic has already been checked.
    ///
    /// `buf` must hold at least [`Schema::header_len`] bytes.
    pub fn decode(schema: Schema, buf: &[u8]) -> io::Result<Self> {
        if buf.len() < schema.header_len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "record header shorter than schema layout",
            ));
        }

        let mut br = &buf[CONTAINER_MAGIC.len()..];
        let size = br.read_u32::<LittleEndian>()?;
        let hash = br.read_u64::<LittleEndian>()?;

        let extension = if schema == Schema::Vista {
            let mut units = [0u16; 4];
            br.read_u16_into::<LittleEndian>(&mut units)?;
            decode_utf16_trimmed(&units)
        } else {
            None
        };

        let filename_len = br.read_u32::<LittleEndian>()?;
        let padding_len = br.read_u32::<LittleEndian>()?;
        let payload_len = br.read_u32::<LittleEndian>()?;

        let dimensions = if schema == Schema::Eight {
            let width = br.read_u32::<LittleEndian>()?;
            let height = br.read_u32::<LittleEndian>()?;
            Some((width, height))
        } else {
            None
        };

        let reserved = br.read_u32::<LittleEndian>()?;
        let data_checksum = br.read_u64::<LittleEndian>()?;
        let header_checksum = br.read_u64::<LittleEndian>()?;

        Ok(Self {
            size,
            hash,
            extension,
            filename_len,
            padding_len,
            payload_len,
            dimensions,
            reserved,
            data_checksum,
            header_checksum,
        })
    }
}

/// Content type detected from payload signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    Unknown,
    Bitmap,
    Jpeg,
    Png,
}

impl ContentType {
    /// Extension written onto the display name for a detected type.
    #[must_use]
    pub fn extension(self) -> Option<&'static str> {
        match self {
            ContentType::Unknown => None,
            ContentType::Bitmap => Some("bmp"),
            ContentType::Jpeg => Some("jpg"),
            ContentType::Png => Some("png"),
        }
    }
}

/// Matches the leading payload bytes against bitmap, JPEG and PNG
/// signatures, in that order.
#[must_use]
pub fn sniff(head: &[u8]) -> ContentType {
    if head.starts_with(BMP_SIGNATURE) {
        ContentType::Bitmap
    } else if head.starts_with(JPEG_SIGNATURE) {
        ContentType::Jpeg
    } else if head.starts_with(PNG_SIGNATURE) {
        ContentType::Png
    } else {
        ContentType::Unknown
    }
}

/// Decodes UTF-16 units up to the first NUL; `None` if nothing remains.
pub(crate) fn decode_utf16_trimmed(units: &[u16]) -> Option<String> {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&units[..end]))
}
