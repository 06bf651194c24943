use super::helpers::*;
use crate::*;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const LONG: Duration = Duration::from_secs(10);

#[test]
fn worker_returns_the_operation_result() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = Session::default();

    let mut worker = session
        .spawn("open", move |s| s.open_paths(&[&path]))
        .unwrap();
    let report = worker.wait(LONG).unwrap().expect("finished in time");
    assert_eq!(report.records_added(), 4);
    assert_eq!(session.len(), 4);
    assert!(worker.is_finished());
}

#[test]
fn wait_times_out_then_shutdown_cancels() {
    let session = Session::default();
    let mut worker = session
        .spawn("spin", |s| {
            let mut spins = 0u32;
            while !s.is_cancelled() {
                thread::sleep(Duration::from_millis(2));
                spins += 1;
            }
            spins
        })
        .unwrap();

    assert!(worker.wait(Duration::from_millis(20)).unwrap().is_none());
    assert!(session.shutdown(worker, LONG).is_some());
    // the worker's flag is its own
    assert!(!session.is_cancelled());
}

#[test]
fn shutdown_right_after_spawn_stops_the_batch() {
    let dir = tempdir().unwrap();
    let paths: Vec<_> = (0..300)
        .map(|i| write_fixture(dir.path(), &format!("thumbcache_{}.db", i), &sample_fixture()))
        .collect();
    let session = Session::default();

    let worker = session
        .spawn("open", move |s| s.open_paths(&paths[..]))
        .unwrap();
    let report = session.shutdown(worker, LONG).expect("stopped in time");
    assert!(report.cancelled);
    assert!(report.files < 300);
    assert!(report.index.is_none());
    assert!(!session.is_cancelled());
}

#[test]
fn cancelled_worker_stays_cancelled_across_operations() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = manual_session();
    session.open_paths(&[&path]);

    let (go_tx, go_rx) = crossbeam_channel::bounded::<()>(0);
    let mut worker = session
        .spawn("twice", move |s| {
            let _ = go_rx.recv();
            let first = s.verify(Selection::All);
            let second = s.open_paths(&[&path]);
            (first, second)
        })
        .unwrap();
    worker.cancel();
    go_tx.send(()).unwrap();

    let (first, second) = worker.wait(LONG).unwrap().unwrap();
    assert!(first.cancelled);
    assert_eq!(first.checked, 0);
    assert!(second.cancelled);
    assert_eq!(session.len(), 4);
}

#[test]
fn foreground_operations_wait_for_the_worker() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = manual_session();

    let (held_tx, held_rx) = crossbeam_channel::bounded::<()>(0);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let mut worker = session
        .spawn("hold", move |s| {
            let _op = s.begin_operation();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
    held_rx.recv().unwrap();

    // a cancel on the foreground handle does not reach the worker
    session.cancel();
    let fg = session.clone();
    let foreground = thread::spawn(move || fg.open_paths(&[&path]));
    thread::sleep(Duration::from_millis(50));
    assert!(!foreground.is_finished());
    assert!(!worker.is_cancelled());

    release_tx.send(()).unwrap();
    worker.wait(LONG).unwrap().unwrap();
    let report = foreground.join().unwrap();
    assert!(report.cancelled);
    assert!(!session.is_cancelled());
}

#[test]
fn shutdown_gives_up_on_a_stuck_worker() {
    let session = Session::default();
    let worker = session
        .spawn("stuck", |_| thread::sleep(Duration::from_millis(500)))
        .unwrap();
    assert!(session.shutdown(worker, Duration::from_millis(10)).is_none());
}

#[test]
fn panicking_worker_reports_an_error() {
    let session = Session::default();
    let mut worker = session
        .spawn("boom", |_| -> u32 { panic!("boom") })
        .unwrap();
    assert!(worker.wait(LONG).is_err());
}

#[test]
fn worker_sees_the_same_session() {
    let dir = tempdir().unwrap();
    let path = write_fixture(dir.path(), "thumbcache_32.db", &sample_fixture());
    let session = manual_session();
    session.open_paths(&[&path]);

    let mut worker = session
        .spawn("verify", |s| s.verify(Selection::All))
        .unwrap();
    let report = worker.wait(LONG).unwrap().unwrap();
    assert_eq!(report.checked, 4);
    assert_eq!(session.stats().verified, 4);
}
