use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::format::{
    decode_utf16_trimmed, has_magic, read_file_header, sniff, FileHeader, RecordHeader,
    CONTAINER_MAGIC, SNIFF_BYTES,
};
use crate::record::{CacheEntryRecord, EntryFlags, SharedContainerInfo};
use crate::ContainerError;

/// Longest filename kept, in UTF-16 code units. Longer names are truncated
/// and the rest of the declared bytes skipped.
pub const MAX_NAME_UNITS: usize = 1024;

/// Window size used by the resync scan.
pub const SCAN_CHUNK_BYTES: usize = 4096;

/// Why a container walk stopped.
#[derive(Debug)]
pub enum Termination {
    /// Ran out of bytes, or no further record magic was found.
    Eof,
    /// The cancellation callback asked to stop.
    Cancelled,
    /// A structural error ended the walk. Records decoded before it are kept.
    Aborted(ContainerError),
}

impl Termination {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Termination::Aborted(_))
    }
}

/// Everything recovered from one container.
#[derive(Debug)]
pub struct ParsedContainer {
    pub records: Vec<CacheEntryRecord>,
    /// Created on the first decoded record; `None` if there were none.
    pub info: Option<Arc<SharedContainerInfo>>,
    pub termination: Termination,
    /// Number of times the walk had to scan for the next record magic.
    pub resyncs: usize,
    /// Zero-hash records skipped as end-of-valid-data markers.
    pub sentinels: usize,
}

enum Step {
    Record(CacheEntryRecord, u64),
    Skip(u64),
    End,
}

/// Sequential reader for one container file.
///
/// Generic over any `Read + Seek`, so tests can feed it a `Cursor<Vec<u8>>`.
pub struct ContainerReader<R: Read + Seek> {
    rdr: BufReader<R>,
    path: PathBuf,
    file_len: u64,
    /// Logical position of `rdr`; `None` after a failed read.
    at: Option<u64>,
}

impl ContainerReader<File> {
    /// Opens a container file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ContainerReader<File>, ContainerError> {
        let f = File::open(path.as_ref())?;
        ContainerReader::from_reader(f, path.as_ref())
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Wraps an existing reader. `path` is recorded on the shared descriptor
    /// so records can be re-read for verification later.
    pub fn from_reader<P: Into<PathBuf>>(mut reader: R, path: P) -> Result<Self, ContainerError> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            rdr: BufReader::new(reader),
            path: path.into(),
            file_len,
            at: None,
        })
    }

    #[must_use]
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Walks the container from its header to the end.
    ///
    /// `cancelled` is polled before every record; returning `true` stops the
    /// walk with [`Termination::Cancelled`].
    ///
    /// # Termination
    ///
    /// - **Bad record magic** -> scan forward for the next `CMMM` and resume;
    ///   nothing found means [`Termination::Eof`].
    /// - **Zero hash** -> skipped as an end-of-valid-data marker.
    /// - **Size or payload past end of file, truncated header** ->
    ///   [`Termination::Aborted`] with [`ContainerError::CorruptRecord`].
    ///
    /// # Errors
    ///
    /// Only a bad file header fails the call: [`ContainerError::NotAContainer`]
    /// or [`ContainerError::UnsupportedSchema`] (or an I/O error reading it).
    pub fn parse<F: Fn() -> bool>(&mut self, cancelled: F) -> Result<ParsedContainer, ContainerError> {
        self.at = None;
        self.seek_to(0)?;
        let header = read_file_header(&mut self.rdr);
        self.at = None;
        let header = header?;
        debug!(
            path = %self.path.display(),
            version = header.version,
            schema = ?header.schema,
            "container header accepted"
        );

        let mut out = ParsedContainer {
            records: Vec::new(),
            info: None,
            termination: Termination::Eof,
            resyncs: 0,
            sentinels: 0,
        };
        let mut pos = header.first_record_offset();

        loop {
            if cancelled() {
                out.termination = Termination::Cancelled;
                break;
            }
            match self.step(&header, pos, &mut out) {
                Ok(Step::Record(record, next)) => {
                    out.records.push(record);
                    pos = next;
                }
                Ok(Step::Skip(next)) => pos = next,
                Ok(Step::End) => break,
                Err(e) => {
                    warn!(path = %self.path.display(), offset = pos, error = %e, "container walk aborted");
                    out.termination = Termination::Aborted(e);
                    break;
                }
            }
        }

        debug!(
            path = %self.path.display(),
            records = out.records.len(),
            resyncs = out.resyncs,
            sentinels = out.sentinels,
            "container walk finished"
        );
        Ok(out)
    }

    fn step(&mut self, header: &FileHeader, pos: u64, out: &mut ParsedContainer) -> Result<Step, ContainerError> {
        if pos >= self.file_len {
            return Ok(Step::End);
        }

        let schema = header.schema;
        let header_len = schema.header_len();
        let avail = (self.file_len - pos).min(header_len as u64) as usize;
        let mut buf = vec![0u8; header_len];
        self.seek_to(pos)?;
        self.fill(&mut buf[..avail])?;

        if !has_magic(&buf[..avail]) {
            return match self.resync(pos + 1)? {
                Some(next) => {
                    warn!(path = %self.path.display(), offset = pos, resumed_at = next, "bad record magic, resynced");
                    out.resyncs += 1;
                    Ok(Step::Skip(next))
                }
                None => {
                    debug!(path = %self.path.display(), offset = pos, "no record magic before end of file");
                    Ok(Step::End)
                }
            };
        }

        if avail < header_len {
            return Err(ContainerError::corrupt(pos, "truncated record header"));
        }

        let rh = RecordHeader::decode(schema, &buf)?;
        let size = u64::from(rh.size);
        if size < header_len as u64 {
            return Err(ContainerError::corrupt(pos, format!("record size {} smaller than header", size)));
        }
        if pos + size > self.file_len {
            return Err(ContainerError::corrupt(pos, format!("record size {} runs past end of file", size)));
        }

        if rh.hash == 0 {
            debug!(path = %self.path.display(), offset = pos, "zero-hash record marks end of valid data");
            out.sentinels += 1;
            return Ok(Step::Skip(pos + size));
        }

        let record = self.read_record(header, pos, &rh, &mut out.info)?;
        Ok(Step::Record(record, pos + size))
    }

    /// Decodes name and payload head of a record whose header is valid. The
    /// reader sits right after the header.
    fn read_record(
        &mut self,
        header: &FileHeader,
        pos: u64,
        rh: &RecordHeader,
        info: &mut Option<Arc<SharedContainerInfo>>,
    ) -> Result<CacheEntryRecord, ContainerError> {
        let name_offset = pos + header.schema.header_len() as u64;
        let payload_offset = name_offset + u64::from(rh.filename_len) + u64::from(rh.padding_len);
        let payload_len = u64::from(rh.payload_len);
        if payload_offset + payload_len > self.file_len {
            return Err(ContainerError::corrupt(
                pos,
                format!("payload {}+{} runs past end of file", payload_offset, payload_len),
            ));
        }

        let declared_units = (rh.filename_len / 2) as usize;
        let kept_units = declared_units.min(MAX_NAME_UNITS);
        if kept_units < declared_units {
            debug!(offset = pos, declared_units, "filename truncated");
        }
        let mut raw = vec![0u8; kept_units * 2];
        self.fill(&mut raw)?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let mut name = decode_utf16_trimmed(&units).unwrap_or_else(|| format!("{:016x}", rh.hash));

        // skip any excess name bytes and the padding in one go
        self.seek_to(payload_offset)?;

        let mut flags = EntryFlags::empty();
        if payload_len > 0 {
            let mut head = [0u8; SNIFF_BYTES];
            let take = (payload_len as usize).min(SNIFF_BYTES);
            self.fill(&mut head[..take])?;
            let ty = sniff(&head[..take]);
            flags.set_content_type(ty);
            match (ty.extension(), rh.extension.as_deref()) {
                (Some(ext), _) => name = replace_extension(&name, ext),
                (None, Some(hint)) => name = replace_extension(&name, hint),
                (None, None) => {}
            }
        } else if let Some(hint) = rh.extension.as_deref() {
            name = replace_extension(&name, hint);
        }

        let container = info
            .get_or_insert_with(|| {
                Arc::new(SharedContainerInfo::new(
                    self.path.clone(),
                    header.version,
                    header.type_tag,
                    header.schema,
                    header.first_record_offset(),
                ))
            })
            .clone();

        Ok(CacheEntryRecord {
            hash: rh.hash,
            stored_data_checksum: rh.data_checksum,
            stored_header_checksum: rh.header_checksum,
            computed_data_checksum: rh.data_checksum,
            computed_header_checksum: rh.header_checksum,
            name,
            header_offset: pos,
            payload_offset,
            payload_len: rh.payload_len,
            dimensions: rh.dimensions,
            extension_hint: rh.extension.clone(),
            flags,
            container,
        })
    }

    /// Moves to `target`, keeping the read buffer when the move stays
    /// inside it.
    fn seek_to(&mut self, target: u64) -> io::Result<()> {
        match self.at {
            Some(at) if at == target => {}
            Some(at) => {
                let delta = if target > at {
                    (target - at) as i64
                } else {
                    -((at - target) as i64)
                };
                self.rdr.seek_relative(delta)?;
            }
            None => {
                self.rdr.seek(SeekFrom::Start(target))?;
            }
        }
        self.at = Some(target);
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<()> {
        match self.rdr.read_exact(buf) {
            Ok(()) => {
                self.at = self.at.map(|at| at + buf.len() as u64);
                Ok(())
            }
            Err(e) => {
                self.at = None;
                Err(e)
            }
        }
    }

    /// Scans forward from `from` for the next record magic, in fixed-size
    /// windows overlapping by `magic.len() - 1` bytes.
    fn resync(&mut self, from: u64) -> Result<Option<u64>, ContainerError> {
        let overlap = CONTAINER_MAGIC.len() - 1;
        let mut window = vec![0u8; SCAN_CHUNK_BYTES];
        let mut start = from;

        while start < self.file_len {
            let len = (self.file_len - start).min(SCAN_CHUNK_BYTES as u64) as usize;
            self.seek_to(start)?;
            self.fill(&mut window[..len])?;
            if let Some(i) = scan_memory(&window[..len], &CONTAINER_MAGIC) {
                return Ok(Some(start + i as u64));
            }
            if start + len as u64 >= self.file_len {
                break;
            }
            start += (len - overlap) as u64;
        }
        Ok(None)
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
#[must_use]
pub fn scan_memory(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Opens and walks one container file, never cancelled.
pub fn parse_container<P: AsRef<Path>>(path: P) -> Result<ParsedContainer, ContainerError> {
    ContainerReader::open(path)?.parse(|| false)
}

/// Replaces whatever follows the last `.` of `name` with `ext`, or appends
/// `.ext` when there is none.
pub(crate) fn replace_extension(name: &str, ext: &str) -> String {
    let stem = match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    };
    format!("{}.{}", stem, ext)
}
