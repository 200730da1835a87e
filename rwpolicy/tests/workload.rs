use std::sync::Arc;
use std::time::{Duration, Instant};

use rwpolicy::starvation::{Starvation, StarvationOptions};
use rwpolicy::workload::{Workload, WorkloadOptions};
use rwpolicy::{Policy, RwPolicyCell, SortedList};

fn small(threads: u64, policy: Policy) -> WorkloadOptions {
    WorkloadOptions {
        threads,
        policy,
        initial_keys: 100,
        operations: 1_000,
        search_fraction: 0.5,
        insert_fraction: 0.3,
        key_space: 65_536,
        seed: 0x1eaf,
    }
}

#[test]
fn four_writer_preference_threads() {
    let start = Instant::now();
    let workload = Workload::new(small(4, Policy::WriterPreference)).unwrap();
    assert_eq!(100, workload.populate());
    let report = workload.run().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(1_000, report.total());
    assert_eq!(100, report.initial_len);
    assert!(report.final_len <= 100 + 300);
    assert!(report.counters.insert <= 1_000);
    assert_eq!(
        report.initial_len as u64 + report.counters.inserted - report.counters.deleted,
        report.final_len as u64
    );
    assert!(report.elapsed > 0.0);
}

#[test]
fn remainder_operations_are_dropped() {
    let workload = Workload::new(small(3, Policy::ReaderPreference)).unwrap();
    workload.populate();
    let report = workload.run().unwrap();
    assert_eq!(999, report.total());
    let c = report.counters;
    assert_eq!(999, c.member + c.insert + c.delete);
    assert!(c.inserted <= c.insert);
    assert!(c.deleted <= c.delete);
}

#[test]
fn list_stays_sorted_after_run() {
    for policy in [Policy::ReaderPreference, Policy::WriterPreference] {
        let workload = Workload::new(WorkloadOptions {
            operations: 20_000,
            key_space: 512,
            ..small(8, policy)
        })
        .unwrap();
        workload.populate();
        workload.run().unwrap();
        let list = workload.list().read();
        let keys: Vec<u64> = list.iter().collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| *k < 512));
        assert_eq!(keys.len(), list.len());
    }
}

#[test]
fn search_only_leaves_list_untouched() {
    let workload = Workload::new(WorkloadOptions {
        search_fraction: 1.0,
        insert_fraction: 0.0,
        ..small(4, Policy::WriterPreference)
    })
    .unwrap();
    workload.populate();
    let before: Vec<u64> = workload.list().read().iter().collect();
    let report = workload.run().unwrap();
    let after: Vec<u64> = workload.list().read().iter().collect();
    assert_eq!(before, after);
    assert_eq!(1_000, report.counters.member);
    assert_eq!(0, report.counters.insert + report.counters.delete);
}

#[test]
fn concurrent_disjoint_inserts_are_not_lost() {
    for policy in [Policy::ReaderPreference, Policy::WriterPreference] {
        let list = Arc::new(RwPolicyCell::new(policy, SortedList::new()));
        let mut threads = Vec::new();
        for idx in 0..4u64 {
            let l = Arc::clone(&list);
            threads.push(std::thread::spawn(move || {
                for key in (idx * 250)..((idx + 1) * 250) {
                    assert!(l.write().insert(key));
                    assert!(l.read().member(key));
                }
            }));
        }
        for thread in threads.into_iter() {
            thread.join().unwrap();
        }
        let list = list.read();
        assert_eq!(1_000, list.len());
        assert!((0..1_000).all(|key| list.member(key)));
        assert_eq!((0..1_000).collect::<Vec<u64>>(), list.iter().collect::<Vec<_>>());
    }
}

#[test]
fn insert_and_delete_are_idempotent_under_the_lock() {
    let list = RwPolicyCell::new(Policy::WriterPreference, SortedList::new());
    assert!(list.write().insert(17));
    assert!(!list.write().insert(17));
    assert_eq!(1, list.read().len());
    assert!(list.write().delete(17));
    assert!(!list.write().delete(17));
    assert!(list.read().is_empty());
}

#[test]
fn starvation_writes_land_in_the_counter() {
    for policy in [Policy::ReaderPreference, Policy::WriterPreference] {
        let report = Starvation::new(StarvationOptions {
            readers: 2,
            writers: 2,
            iterations: 3,
            read_hold_micros: 200,
            write_hold_micros: 300,
            policy,
        })
        .unwrap()
        .run()
        .unwrap();
        assert_eq!(policy, report.policy);
        assert_eq!(6, report.reads);
        assert_eq!(6, report.writes);
        assert_eq!(6, report.final_value);
        assert!(report.reader_hold_secs > 0.0);
        assert!(report.writer_hold_secs > 0.0);
        let shares = report.reader_share() + report.writer_share();
        assert!((shares - 1.0).abs() < 1e-9);
    }
}
