//! Verification over a selection of visible records.
//!
//! Records are visited in id order, which is parse order, so consecutive
//! records usually share a container and the open file handle is reused
//! until the container changes.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use container::{verify_record, RecordId};
use tracing::{debug, info, warn};

use crate::Session;

/// Which records to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Ids(Vec<RecordId>),
}

/// Outcome of [`Session::verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Records with a verification outcome, cached ones included.
    pub checked: usize,
    /// Records served from an earlier verification.
    pub skipped: usize,
    pub header_mismatches: usize,
    pub payload_mismatches: usize,
    /// Records whose container could not be re-read; left unverified.
    pub failed: usize,
    pub cancelled: bool,
}

impl VerifyReport {
    #[must_use]
    pub fn mismatches(&self) -> usize {
        self.header_mismatches + self.payload_mismatches
    }
}

impl Session {
    /// Verifies the selected visible records. Unknown ids are ignored.
    pub fn verify(&self, selection: Selection) -> VerifyReport {
        let _op = self.begin_operation();
        self.verify_locked(selection)
    }

    /// [`Session::verify`] for a caller already holding the operation lock.
    pub(crate) fn verify_locked(&self, selection: Selection) -> VerifyReport {
        let mut report = VerifyReport::default();
        let mut st = self.state.lock();

        let ids = match selection {
            Selection::All => st.records.ids(),
            Selection::Ids(mut ids) => {
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        };

        let mut open: Option<(PathBuf, BufReader<File>)> = None;

        for id in ids {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(rec) = st.records.get_mut(id) else {
                continue;
            };

            let outcome = if rec.is_verified() {
                container::verify_in_file(rec)
            } else {
                let path = rec.container.path();
                if open.as_ref().map(|(p, _)| p.as_path()) != Some(path) {
                    open = match File::open(path) {
                        Ok(f) => Some((path.to_path_buf(), BufReader::new(f))),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "container could not be reopened");
                            None
                        }
                    };
                }
                match open.as_mut() {
                    Some((_, rdr)) => verify_record(rdr, rec),
                    None => {
                        report.failed += 1;
                        continue;
                    }
                }
            };

            match outcome {
                Ok(outcome) => {
                    report.checked += 1;
                    report.skipped += usize::from(outcome.skipped);
                    report.header_mismatches += usize::from(!outcome.header_ok);
                    report.payload_mismatches += usize::from(!outcome.payload_ok);
                    if !outcome.is_ok() && !outcome.skipped {
                        debug!(record = %id, name = %rec.name, header_ok = outcome.header_ok, payload_ok = outcome.payload_ok, "checksum mismatch");
                    }
                }
                Err(e) => {
                    warn!(record = %id, error = %e, "record could not be verified");
                    report.failed += 1;
                }
            }
        }

        info!(
            checked = report.checked,
            skipped = report.skipped,
            header_mismatches = report.header_mismatches,
            payload_mismatches = report.payload_mismatches,
            failed = report.failed,
            cancelled = report.cancelled,
            "verification finished"
        );
        report
    }
}
