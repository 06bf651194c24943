//! Plain-text rendering of session data for stdout.

use container::{CacheEntryRecord, ContentType, RecordId};
use engine::{BatchReport, IndexReport, VerifyReport};

pub fn content_label(ty: ContentType) -> &'static str {
    match ty {
        ContentType::Unknown => "-",
        ContentType::Bitmap => "bmp",
        ContentType::Jpeg => "jpeg",
        ContentType::Png => "png",
    }
}

/// One `LIST` line: id, hash, type, payload length, name, then flags.
pub fn record_line(id: RecordId, rec: &CacheEntryRecord) -> String {
    let mut line = format!(
        "{} {:016x} {} {} {}",
        id,
        rec.hash,
        content_label(rec.content_type()),
        rec.payload_len,
        rec.name
    );
    if let Some((w, h)) = rec.dimensions {
        line.push_str(&format!(" {}x{}", w, h));
    }
    let mut tags = Vec::new();
    if rec.is_indexed() {
        tags.push("indexed");
    }
    if rec.is_verified() {
        tags.push(if rec.has_mismatch() { "BAD" } else { "ok" });
    }
    if rec.flags.contains(container::EntryFlags::HEADER_MISMATCH) {
        tags.push("header-mismatch");
    }
    if rec.flags.contains(container::EntryFlags::PAYLOAD_MISMATCH) {
        tags.push("payload-mismatch");
    }
    if !tags.is_empty() {
        line.push_str(&format!(" [{}]", tags.join(",")));
    }
    line
}

pub fn batch_summary(r: &BatchReport) -> String {
    let mut out = format!(
        "OK files={} records={} hidden={} resyncs={} sentinels={} failures={}",
        r.files,
        r.records_added(),
        r.hidden_blanks,
        r.resyncs,
        r.sentinels,
        r.failures.len()
    );
    if r.cancelled {
        out.push_str(" (cancelled)");
    }
    for f in &r.failures {
        out.push_str(&format!("\nERR {}: {:#}", f.path.display(), f.error));
        if f.records_kept > 0 {
            out.push_str(&format!(" ({} records kept)", f.records_kept));
        }
    }
    if let Some(ref ix) = r.index {
        out.push('\n');
        out.push_str(&index_summary(ix));
    }
    if let Some(ref v) = r.verify {
        out.push('\n');
        out.push_str(&verify_summary(v));
    }
    out
}

pub fn index_summary(r: &IndexReport) -> String {
    format!(
        "OK indexed inserted={} linked={} skipped={}",
        r.inserted, r.linked, r.skipped
    )
}

pub fn verify_summary(r: &VerifyReport) -> String {
    let mut out = format!(
        "OK verified checked={} skipped={} header_mismatches={} payload_mismatches={} failed={}",
        r.checked, r.skipped, r.header_mismatches, r.payload_mismatches, r.failed
    );
    if r.cancelled {
        out.push_str(" (cancelled)");
    }
    out
}

/// Parses `#12` or `12`.
pub fn parse_id(s: &str) -> Option<RecordId> {
    s.strip_prefix('#').unwrap_or(s).parse().ok().map(RecordId)
}

/// Parses a hex hash with or without a `0x` prefix.
pub fn parse_hash(s: &str) -> Option<u64> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16).ok()
}

pub fn parse_switch(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
