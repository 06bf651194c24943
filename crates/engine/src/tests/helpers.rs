use crate::Session;
use config::Config;
use container::fixtures::{bmp_payload, jpeg_payload, png_payload, ContainerBuilder, Fixture, RecordSpec};
use container::VERSION_7;
use std::fs;
use std::path::{Path, PathBuf};

pub const HASH_SHARED: u64 = 0x10;
pub const HASH_PNG: u64 = 0x20;
pub const HASH_BLANK: u64 = 0x30;

/// Four records: two sharing a hash, one PNG, one blank.
pub fn sample_fixture() -> Fixture {
    ContainerBuilder::new(VERSION_7)
        .record(RecordSpec::new(HASH_SHARED, "alpha", &jpeg_payload(300)))
        .record(RecordSpec::new(HASH_PNG, "beta", &png_payload(64)))
        .record(RecordSpec::new(HASH_SHARED, "gamma", &bmp_payload(50)))
        .record(RecordSpec::new(HASH_BLANK, "empty", b""))
        .build()
}

pub fn write_fixture(dir: &Path, name: &str, fx: &Fixture) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, &fx.bytes).unwrap();
    path
}

/// A session that neither indexes nor verifies on open.
pub fn manual_session() -> Session {
    Session::new(Config {
        auto_index: false,
        ..Config::default()
    })
}

pub fn names(session: &Session) -> Vec<String> {
    session.records().into_iter().map(|(_, r)| r.name).collect()
}
