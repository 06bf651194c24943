//! Batch open: expands the input paths, parses each container in turn and
//! attaches the recovered records. A failure in one file is recorded and the
//! batch moves on.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use container::{ContainerReader, ParsedContainer, RecordId, Termination};
use mapper::IndexReport;
use tracing::{debug, info, warn};

use crate::blank::BlankEntryNode;
use crate::verify::{Selection, VerifyReport};
use crate::Session;

const CACHE_PREFIXES: [&str; 2] = ["thumbcache_", "iconcache_"];
const CACHE_SUFFIX: &str = ".db";

/// One file that could not be read, or was only read in part.
pub struct FileFailure {
    pub path: PathBuf,
    pub error: anyhow::Error,
    /// Records recovered before the error; `0` when the file never opened.
    pub records_kept: usize,
}

impl fmt::Debug for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFailure")
            .field("path", &self.path)
            .field("error", &format_args!("{:#}", self.error))
            .field("records_kept", &self.records_kept)
            .finish()
    }
}

/// Outcome of [`Session::open_paths`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Container files the batch tried to read.
    pub files: usize,
    /// Ids of the records added, hidden blanks included.
    pub added: Vec<RecordId>,
    /// Blank records moved straight to the hidden list.
    pub hidden_blanks: usize,
    pub resyncs: usize,
    pub sentinels: usize,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
    /// Present when the index was built after the batch.
    pub index: Option<IndexReport>,
    /// Present when the new records were verified after the batch.
    pub verify: Option<VerifyReport>,
}

impl BatchReport {
    #[must_use]
    pub fn records_added(&self) -> usize {
        self.added.len()
    }
}

/// Expands `paths` into the list of container files to read.
///
/// Files are taken as given. A directory contributes its regular files
/// named `thumbcache_*.db` or `iconcache_*.db`, sorted by name. A directory
/// that cannot be listed is reported as a failure.
pub fn expand_paths<P: AsRef<Path>>(paths: &[P]) -> (Vec<PathBuf>, Vec<FileFailure>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();

    for p in paths {
        let p = p.as_ref();
        if !p.is_dir() {
            files.push(p.to_path_buf());
            continue;
        }
        match list_cache_files(p) {
            Ok(mut found) => {
                debug!(dir = %p.display(), found = found.len(), "directory expanded");
                files.append(&mut found);
            }
            Err(error) => failures.push(FileFailure {
                path: p.to_path_buf(),
                error,
                records_kept: 0,
            }),
        }
    }
    (files, failures)
}

fn list_cache_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_cache_file_name(p))
        .collect();
    found.sort();
    Ok(found)
}

fn is_cache_file_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| {
            let lower = n.to_ascii_lowercase();
            lower.ends_with(CACHE_SUFFIX) && CACHE_PREFIXES.iter().any(|pre| lower.starts_with(pre))
        })
        .unwrap_or(false)
}

impl Session {
    /// Opens every container named by `paths` (files or directories) and
    /// attaches the recovered records.
    ///
    /// After the batch, blank records are hidden if hiding is on, the index
    /// is built if `auto_index` is set and the new records are verified if
    /// `auto_verify` is set. Neither follow-up runs after a cancelled batch.
    pub fn open_paths<P: AsRef<Path>>(&self, paths: &[P]) -> BatchReport {
        let _op = self.begin_operation();

        let (files, failures) = expand_paths(paths);
        let mut report = BatchReport {
            failures,
            ..BatchReport::default()
        };

        for path in files {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.files += 1;

            let parsed = match self.parse_one(&path) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(path = %path.display(), error = %format!("{:#}", error), "container skipped");
                    report.failures.push(FileFailure {
                        path,
                        error,
                        records_kept: 0,
                    });
                    continue;
                }
            };

            report.resyncs += parsed.resyncs;
            report.sentinels += parsed.sentinels;
            let ParsedContainer {
                records,
                termination,
                ..
            } = parsed;
            let kept = records.len();
            self.attach(records, &mut report);

            match termination {
                Termination::Eof => {}
                Termination::Cancelled => {
                    report.cancelled = true;
                    break;
                }
                Termination::Aborted(e) => {
                    let error = anyhow::Error::new(e).context(format!("reading {}", path.display()));
                    report.failures.push(FileFailure {
                        path,
                        error,
                        records_kept: kept,
                    });
                }
            }
        }

        if !report.cancelled {
            if self.config.auto_index {
                report.index = Some(self.index_locked());
            }
            if self.config.auto_verify && !report.added.is_empty() {
                report.verify = Some(self.verify_locked(Selection::Ids(report.added.clone())));
            }
        }

        info!(
            files = report.files,
            records = report.added.len(),
            hidden_blanks = report.hidden_blanks,
            resyncs = report.resyncs,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "batch open finished"
        );
        report
    }

    fn parse_one(&self, path: &Path) -> Result<ParsedContainer> {
        let cancel = self.cancel.clone();
        let parsed = ContainerReader::open(path)
            .with_context(|| format!("opening {}", path.display()))?
            .parse(|| cancel.is_cancelled())
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(parsed)
    }

    fn attach(&self, records: Vec<container::CacheEntryRecord>, report: &mut BatchReport) {
        let mut st = self.state.lock();
        for rec in records {
            let hide = st.hide_blank && rec.is_blank();
            let id = st.records.insert(rec);
            report.added.push(id);
            if hide {
                if let Some(record) = st.records.remove(id) {
                    st.blanks.push(BlankEntryNode { id, record });
                    report.hidden_blanks += 1;
                }
            }
        }
    }
}
