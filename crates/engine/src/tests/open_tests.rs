use super::helpers::*;
use crate::*;
use config::Config;
use container::fixtures::{jpeg_payload, ContainerBuilder, RecordSpec};
use container::{ContentType, VERSION_10};
use std::fs;
use tempfile::tempdir;

// --------------------- Single files ---------------------

#[test]
fn opens_one_container() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_96.db", &sample_fixture());
    let session = Session::default();

    let report = session.open_paths(&[&path]);
    assert_eq!(report.files, 1);
    assert_eq!(report.records_added(), 4);
    assert!(report.failures.is_empty());
    assert!(!report.cancelled);
    assert_eq!(
        names(&session),
        vec!["alpha.jpg", "beta.png", "gamma.bmp", "empty"]
    );

    let index = report.index.expect("indexed on open by default");
    assert_eq!(index.inserted, 3);
    assert_eq!(index.linked, 1);
    assert!(report.verify.is_none());
}

#[test]
fn records_keep_container_details() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_96.db", &sample_fixture());
    let session = manual_session();
    session.open_paths(&[&path]);

    let records = session.records();
    let (_, beta) = &records[1];
    assert_eq!(beta.content_type(), ContentType::Png);
    assert_eq!(beta.container.path(), path.as_path());
    assert!(!beta.is_indexed());
}

#[test]
fn missing_file_is_reported_and_batch_continues() {
    let dir = tempdir().unwrap();
    let good = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let missing = dir.path().join("thumbcache_gone.db");
    let session = manual_session();

    let report = session.open_paths(&[missing.clone(), good]);
    assert_eq!(report.files, 2);
    assert_eq!(report.records_added(), 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, missing);
    assert_eq!(report.failures[0].records_kept, 0);
}

#[test]
fn non_container_is_reported() {
    let dir = tempdir().unwrap();
    let bogus = dir.path().join("thumbcache_idx.db");
    fs::write(&bogus, b"IMMM\x20\x00\x00\x00junkjunkjunk").unwrap();
    let session = manual_session();

    let report = session.open_paths(&[&bogus]);
    assert_eq!(report.failures.len(), 1);
    let msg = format!("{:#}", report.failures[0].error);
    assert!(msg.contains("not a cache container"), "{}", msg);
    assert!(session.is_empty());
}

#[test]
fn truncated_container_keeps_leading_records() {
    let dir = tempdir().unwrap();
    let fx = sample_fixture();
    let cut = fx.offsets[2] as usize + 10;
    let path = dir.path().join("thumbcache_256.db");
    fs::write(&path, &fx.bytes[..cut]).unwrap();
    let session = manual_session();

    let report = session.open_paths(&[&path]);
    assert_eq!(report.records_added(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].records_kept, 2);
    assert_eq!(names(&session), vec!["alpha.jpg", "beta.png"]);
}

#[test]
fn resyncs_and_sentinels_are_summed() {
    let dir = tempdir().unwrap();
    let mut fx = ContainerBuilder::new(VERSION_10)
        .record(RecordSpec::new(1, "a", &jpeg_payload(20)))
        .record(RecordSpec::new(2, "b", &jpeg_payload(20)))
        .record(RecordSpec::new(0, "z", &jpeg_payload(20)))
        .record(RecordSpec::new(3, "c", &jpeg_payload(20)))
        .build();
    fx.corrupt_magic(1);
    let path = write_fixture(dir.path(), "thumbcache_1024.db", &fx);
    let session = manual_session();

    let report = session.open_paths(&[&path]);
    assert_eq!(report.resyncs, 1);
    assert_eq!(report.sentinels, 1);
    assert_eq!(names(&session), vec!["a.jpg", "c.jpg"]);
}

// --------------------- Directories ---------------------

#[test]
fn directory_expands_to_cache_files_in_order() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    write_fixture(dir.path(), "iconcache_16.db", &sample_fixture());
    write_fixture(dir.path(), "notes.db", &sample_fixture());
    fs::write(dir.path().join("thumbcache_32.txt"), b"x").unwrap();
    fs::create_dir(dir.path().join("thumbcache_sub.db")).unwrap();

    let (files, failures) = expand_paths(&[dir.path()]);
    assert!(failures.is_empty());
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["iconcache_16.db", "thumbcache_32.db"]);
}

#[test]
fn opening_a_directory_reads_every_container() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    write_fixture(dir.path(), "thumbcache_96.db", &sample_fixture());
    let session = manual_session();

    let report = session.open_paths(&[dir.path()]);
    assert_eq!(report.files, 2);
    assert_eq!(report.records_added(), 8);
    assert_eq!(session.stats().containers, 2);
}

// --------------------- Follow-ups ---------------------

#[test]
fn configured_hiding_moves_blanks_on_open() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = Session::new(Config {
        hide_blank: true,
        ..Config::default()
    });

    let report = session.open_paths(&[&path]);
    assert_eq!(report.records_added(), 4);
    assert_eq!(report.hidden_blanks, 1);
    assert_eq!(session.len(), 3);
    assert_eq!(session.hidden_blanks(), vec![report.added[3]]);
    assert!(session.lookup(HASH_BLANK).is_empty());
}

#[test]
fn configured_verification_runs_on_new_records() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = Session::new(Config {
        auto_verify: true,
        ..Config::default()
    });

    let report = session.open_paths(&[&path]);
    let verify = report.verify.expect("verified on open");
    assert_eq!(verify.checked, 4);
    assert_eq!(verify.mismatches(), 0);
    assert_eq!(session.stats().verified, 4);
}

#[test]
fn cancel_before_a_batch_stops_it_then_lowers() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = manual_session();

    session.cancel();
    let report = session.open_paths(&[&path]);
    assert!(report.cancelled);
    assert_eq!(report.records_added(), 0);
    assert!(!session.is_cancelled());

    let report = session.open_paths(&[&path]);
    assert!(!report.cancelled);
    assert_eq!(report.records_added(), 4);
}

#[test]
fn container_descriptor_lives_as_long_as_its_records() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = manual_session();
    let report = session.open_paths(&[&path]);

    let info = session.record(report.added[0]).unwrap().container;
    // four records in the session + this handle
    assert_eq!(info.live_records(), 5);
    session.remove(&report.added[..2]);
    assert_eq!(info.live_records(), 3);
    session.clear();
    assert_eq!(info.live_records(), 1);
    assert_eq!(session.stats().containers, 0);
}
