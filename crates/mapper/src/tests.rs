use crate::*;
use container::fixtures::{jpeg_payload, png_payload, ContainerBuilder, RecordSpec};
use container::{ContainerReader, VERSION_7};
use std::io::Cursor;

/// Parses a container whose records carry `hashes`, in order.
fn record_set(hashes: &[u64]) -> (RecordSet, Vec<RecordId>) {
    let mut b = ContainerBuilder::new(VERSION_7);
    for (i, &h) in hashes.iter().enumerate() {
        b = b.record(RecordSpec::new(h, &format!("r{}", i), &jpeg_payload(16)));
    }
    let parsed = ContainerReader::from_reader(Cursor::new(b.build().bytes), "mem.db")
        .unwrap()
        .parse(|| false)
        .unwrap();
    let mut set = RecordSet::new();
    let ids = parsed.records.into_iter().map(|r| set.insert(r)).collect();
    (set, ids)
}

// -------------------- build_index --------------------

#[test]
fn distinct_hashes_each_get_a_chain() {
    let (mut set, ids) = record_set(&[1, 2, 3]);
    let mut m = HashMapper::new();
    let report = m.build_index(&mut set);

    assert_eq!(report.inserted, 3);
    assert_eq!(report.linked, 0);
    assert_eq!(report.indexed(), 3);
    assert_eq!(m.len(), 3);
    assert_eq!(m.chain(2), vec![ids[1]]);
    assert!(set.iter().all(|(_, r)| r.is_indexed()));
}

#[test]
fn collisions_link_after_the_head() {
    let (mut set, ids) = record_set(&[7, 7, 5, 7]);
    let mut m = HashMapper::new();
    let report = m.build_index(&mut set);

    assert_eq!(report.inserted, 2);
    assert_eq!(report.linked, 2);
    assert_eq!(m.len(), 2);
    assert_eq!(m.chain(7), vec![ids[0], ids[3], ids[1]]);
}

#[test]
fn rebuilding_skips_indexed_records() {
    let (mut set, _) = record_set(&[1, 2]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);

    let (extra, _) = record_set(&[2]);
    for (_, r) in extra.iter() {
        set.insert(r.clone());
    }
    let report = m.build_index(&mut set);
    assert_eq!(report.already_indexed, 2);
    assert_eq!(report.linked, 1);
    assert_eq!(m.chain(2).len(), 2);
}

#[test]
fn reset_allows_a_full_rebuild() {
    let (mut set, _) = record_set(&[1, 1, 2]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);
    m.reset(&mut set);

    assert!(m.is_empty());
    assert!(set.iter().all(|(_, r)| !r.is_indexed()));
    assert_eq!(m.build_index(&mut set).indexed(), 3);
}

// -------------------- resolve_hash --------------------

#[test]
fn resolve_renames_every_colliding_record() {
    let fx = ContainerBuilder::new(VERSION_7)
        .record(RecordSpec::new(0xabc, "left", &jpeg_payload(40)))
        .record(RecordSpec::new(0xabc, "right", &png_payload(40)))
        .record(RecordSpec::new(0xdef, "other", &png_payload(40)))
        .build();
    let parsed = ContainerReader::from_reader(Cursor::new(fx.bytes), "mem.db")
        .unwrap()
        .parse(|| false)
        .unwrap();
    let mut set = RecordSet::new();
    let ids: Vec<RecordId> = parsed.records.into_iter().map(|r| set.insert(r)).collect();

    let mut m = HashMapper::new();
    m.build_index(&mut set);
    let n = m.resolve_hash(0xabc, r"C:\Users\me\Pictures\cat.jpg", &mut set);

    assert_eq!(n, 2);
    assert_eq!(set.get(ids[0]).unwrap().name, r"C:\Users\me\Pictures\cat.jpg");
    assert_eq!(set.get(ids[1]).unwrap().name, r"C:\Users\me\Pictures\cat.jpg");
    assert_eq!(set.get(ids[2]).unwrap().name, "other.png");
}

#[test]
fn resolve_unknown_hash_matches_nothing() {
    let (mut set, _) = record_set(&[1]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);
    assert_eq!(m.resolve_hash(99, "x", &mut set), 0);
}

#[test]
fn resolve_skips_ids_no_longer_visible() {
    let (mut set, ids) = record_set(&[4, 4]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);
    set.remove(ids[1]);
    assert_eq!(m.resolve_hash(4, "seen", &mut set), 1);
}

// -------------------- remove_record --------------------

#[test]
fn removing_the_head_promotes_the_next_link() {
    let (mut set, ids) = record_set(&[3, 3, 3]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);
    assert_eq!(m.chain(3), vec![ids[0], ids[2], ids[1]]);

    m.remove_record(ids[0], 3).unwrap();
    assert_eq!(m.chain(3), vec![ids[2], ids[1]]);
    assert_eq!(m.len(), 1);
}

#[test]
fn removing_a_middle_link_keeps_the_rest() {
    let (mut set, ids) = record_set(&[3, 3, 3]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);

    m.remove_record(ids[2], 3).unwrap();
    assert_eq!(m.chain(3), vec![ids[0], ids[1]]);
    m.remove_record(ids[1], 3).unwrap();
    assert_eq!(m.chain(3), vec![ids[0]]);
}

#[test]
fn removing_the_last_link_drops_the_hash() {
    let (mut set, ids) = record_set(&[8, 9]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);

    m.remove_record(ids[0], 8).unwrap();
    assert!(!m.contains(8));
    assert!(m.chain(8).is_empty());
    assert_eq!(m.len(), 1);
}

#[test]
fn removing_unknown_entries_fails() {
    let (mut set, ids) = record_set(&[8, 8]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);

    assert_eq!(
        m.remove_record(ids[0], 1),
        Err(MapperError::KeyNotFound { hash: 1, id: ids[0] })
    );
    let stray = RecordId(1000);
    assert_eq!(
        m.remove_record(stray, 8),
        Err(MapperError::KeyNotFound { hash: 8, id: stray })
    );
    assert_eq!(m.chain(8).len(), 2);
}

#[test]
fn clear_empties_the_index() {
    let (mut set, _) = record_set(&[1, 2, 3]);
    let mut m = HashMapper::new();
    m.build_index(&mut set);
    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.resolve_hash(1, "x", &mut set), 0);
}

#[test]
fn many_collisions_and_hashes() {
    let hashes: Vec<u64> = (0..2000u64).map(|i| 1 + i % 50).collect();
    let (mut set, ids) = record_set(&hashes);
    let mut m = HashMapper::new();
    let report = m.build_index(&mut set);
    assert_eq!(report.inserted, 50);
    assert_eq!(report.linked, 1950);

    for (i, id) in ids.iter().enumerate().filter(|(i, _)| i % 3 == 0) {
        m.remove_record(*id, hashes[i]).unwrap();
    }
    let remaining: usize = (1..=50).map(|h| m.chain(h).len()).sum();
    assert_eq!(remaining, 2000 - (0..2000).filter(|i| i % 3 == 0).count());
}

#[test]
fn long_chains_do_not_exhaust_the_stack() {
    const LINKS: usize = 200_000;

    let worker = std::thread::Builder::new()
        .name("long-chain".to_string())
        .spawn(|| {
            let (one, _) = record_set(&[7]);
            let rec = one.iter().next().map(|(_, r)| r.clone()).unwrap();
            let mut set = RecordSet::new();
            let ids: Vec<RecordId> = (0..LINKS).map(|_| set.insert(rec.clone())).collect();

            let mut m = HashMapper::new();
            let report = m.build_index(&mut set);
            assert_eq!(report.inserted, 1);
            assert_eq!(report.linked, LINKS - 1);

            // ids[1] was linked first, so it sits at the tail
            m.remove_record(ids[1], 7).unwrap();
            assert_eq!(m.chain(7).len(), LINKS - 1);
            m.remove_record(ids[0], 7).unwrap();
            assert_eq!(m.chain(7)[0], ids[LINKS - 1]);

            m.clear();
            assert!(m.is_empty());

            m.build_index(&mut set);
            m.reset(&mut set);
            m.build_index(&mut set);
            drop(m);
        })
        .unwrap();
    worker.join().unwrap();
}
