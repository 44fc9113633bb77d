// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot waiting and in-flight accounting.

use futures::FutureExt;
use futures::channel::oneshot;
use std::sync::{Arc, Mutex};
use trackwise::{Coordinator, CoordinatorOptions, Settlement};

type Job = Result<u32, String>;

fn gate() -> (oneshot::Sender<Job>, impl std::future::Future<Output = Job>) {
    let (tx, rx) = oneshot::channel::<Job>();
    (
        tx,
        rx.map(|r| r.unwrap_or_else(|_| Err("dropped".to_string()))),
    )
}

#[test]
fn wait_covers_only_its_snapshot() {
    let coordinator = Coordinator::new(CoordinatorOptions::new().name("jobs"));
    let settled = Arc::new(Mutex::new(Vec::<Settlement>::new()));
    let s = settled.clone();
    let _ = coordinator.on_settled(move |settlement| s.lock().unwrap().push(settlement.clone()));

    let mut senders = Vec::new();
    let mut jobs = Vec::new();
    for n in 0..3 {
        let (tx, job) = gate();
        senders.push(tx);
        jobs.push(coordinator.track(job, Some(format!("job-{n}").as_str())));
    }
    assert_eq!(coordinator.size(), 3);

    let mut wait = Box::pin(coordinator.wait());
    let (late_tx, late_job) = gate();
    let late = coordinator.track_with(move || late_job, Some("late"));
    assert_eq!(coordinator.size(), 4);

    let mut jobs = futures::future::join_all(jobs);
    for (n, tx) in senders.into_iter().enumerate() {
        assert!(wait.as_mut().now_or_never().is_none());
        tx.send(Ok(n as u32)).unwrap();
        let _ = (&mut jobs).now_or_never();
        assert_eq!(coordinator.size(), 4 - (n + 1));
    }
    // every snapshot member settled; `late` is still in flight
    assert!(wait.as_mut().now_or_never().is_some());
    assert_eq!(coordinator.size(), 1);
    assert_eq!(settled.lock().unwrap().len(), 3);

    late_tx.send(Err("late failure".to_string())).unwrap();
    assert_eq!(
        futures::executor::block_on(late),
        Err("late failure".to_string())
    );
    assert_eq!(coordinator.size(), 0);
    let settled = settled.lock().unwrap();
    assert_eq!(settled[3].label.as_deref(), Some("late"));
    assert!(settled[3].failed);
}

#[test]
fn abandoned_operations_block_their_wait() {
    let coordinator = Coordinator::default();
    let (_tx, job) = gate();
    drop(coordinator.track(job, Some("abandoned")));
    assert_eq!(coordinator.size(), 1);
    assert!(coordinator.wait().now_or_never().is_none());

    let fresh = Coordinator::default();
    assert!(fresh.wait().now_or_never().is_some());
}
