// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity, pairing and timing of invocation records.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use trackwise::{Duration, InvocationRecord, Tracker, TrackerOptions};

fn recorder(tracker: &Tracker) -> Arc<Mutex<Vec<InvocationRecord>>> {
    let records = Arc::new(Mutex::new(Vec::new()));
    let r = records.clone();
    let _ = tracker.on_invoked(move |record| r.lock().unwrap().push(record.clone()));
    records
}

#[test]
fn ids_are_unique_across_threads() {
    let tracker = Tracker::new(TrackerOptions::new().name("unique"));
    let records = recorder(&tracker);
    let work = Arc::new(tracker.track("work", |n: u32| -> Result<u32, ()> { Ok(n) }));

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let work = work.clone();
            std::thread::spawn(move || {
                for n in 0..50 {
                    let _ = work.call(t * 100 + n);
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let records = records.lock().unwrap();
    let ids: HashSet<&str> = records
        .iter()
        .filter(|r| r.is_started())
        .map(|r| r.key.id())
        .collect();
    assert_eq!(ids.len(), 200);
    let indices: HashSet<u64> = records.iter().map(|r| r.key.index()).collect();
    assert_eq!(indices, (0..200).collect());
}

#[test]
fn every_call_pairs_started_with_one_terminal() {
    let tracker = Tracker::default();
    let records = recorder(&tracker);
    let flaky = tracker.track("flaky", |n: u32| -> Result<u32, String> {
        match n % 3 {
            0 => Ok(n),
            1 => Err(format!("{n} rejected")),
            _ => panic!("{n} exploded"),
        }
    });
    for n in 0..9 {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| flaky.call(n)));
    }

    let records = records.lock().unwrap();
    let mut by_key: HashMap<&str, Vec<&InvocationRecord>> = HashMap::new();
    for record in records.iter() {
        by_key.entry(record.key.id()).or_default().push(record);
    }
    assert_eq!(by_key.len(), 9);
    for (id, phases) in by_key {
        assert_eq!(phases.len(), 2, "{id}");
        assert!(phases[0].is_started(), "{id}");
        assert!(phases[1].is_terminal(), "{id}");
    }
    let errored = records.iter().filter(|r| r.is_errored()).count();
    assert_eq!(errored, 6);
}

#[test]
fn durations_are_reported_for_terminals() {
    let tracker = Tracker::default();
    let records = recorder(&tracker);
    let sleepy = tracker.track("sleepy", |ms: u64| {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    });
    sleepy.call(0);
    sleepy.call(5);

    let records = records.lock().unwrap();
    let durations: Vec<Duration> = records.iter().filter_map(|r| r.duration()).collect();
    assert_eq!(durations.len(), 2);
    assert!(durations.iter().all(|d| *d >= Duration::ZERO));
    assert!(durations[1] >= Duration::from_millis(5));
    assert!(records.iter().filter(|r| r.is_started()).all(|r| r.duration().is_none()));
}

#[test]
fn listener_panics_do_not_reach_the_caller() {
    let tracker = Tracker::default();
    let _ = tracker.on_started(|_| panic!("listener bug"));
    let seen = recorder(&tracker);
    let work = tracker.track("work", |n: u32| -> Result<u32, ()> { Ok(n + 1) });
    assert_eq!(work.call(1), Ok(2));
    assert_eq!(seen.lock().unwrap().len(), 2);
}
