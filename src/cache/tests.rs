// SPDX-License-Identifier: MIT OR Apache-2.0

use super::*;
use futures::FutureExt;
use futures::channel::oneshot;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

type Answer = Result<u32, String>;

/// A supplier whose operation settles when the returned sender fires.
fn gated(
    calls: &Arc<AtomicUsize>,
) -> (
    oneshot::Sender<Answer>,
    impl FnOnce() -> futures::future::BoxFuture<'static, Answer>,
) {
    let (tx, rx) = oneshot::channel::<Answer>();
    let calls = calls.clone();
    let supplier = move || {
        calls.fetch_add(1, Ordering::SeqCst);
        rx.map(|r| r.unwrap_or_else(|_| Err("canceled".to_string())))
            .boxed()
    };
    (tx, supplier)
}

#[test]
fn transient_shares_in_flight_work() {
    let cache: TransientCache<Answer> = TransientCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, supplier) = gated(&calls);
    let first = cache.track("user:1", supplier);
    let (_unused, second_supplier) = gated(&calls);
    let second = cache.track("user:1", second_supplier);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.has("user:1"));
    assert_eq!(cache.size(), 1);

    tx.send(Ok(7)).unwrap();
    assert_eq!(futures::executor::block_on(first), Ok(7));
    assert_eq!(futures::executor::block_on(second), Ok(7));
    assert!(!cache.has("user:1"));
    assert!(cache.is_empty());
    assert_eq!(cache.size(), 0);

    let (tx, supplier) = gated(&calls);
    let third = cache.track("user:1", supplier);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    tx.send(Err("gone".to_string())).unwrap();
    assert_eq!(futures::executor::block_on(third), Err("gone".to_string()));
    assert!(!cache.has("user:1"));
}

#[test]
fn transient_evicts_after_supplier_panic() {
    let cache: TransientCache<Answer> = TransientCache::default();
    let handle = cache.track("boom", || -> futures::future::Ready<Answer> {
        panic!("supplier failed")
    });
    assert!(cache.has("boom"));
    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        futures::executor::block_on(handle)
    }));
    assert!(caught.is_err());
    assert!(!cache.has("boom"));
    assert_eq!(cache.size(), 0);
}

#[test]
fn persistent_keeps_settled_outcomes() {
    let cache: PersistentCache<Answer> = PersistentCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, supplier) = gated(&calls);
    let first = cache.track("config", supplier);
    tx.send(Ok(1)).unwrap();
    assert_eq!(futures::executor::block_on(first), Ok(1));
    assert_eq!(cache.size(), 0);

    let (_tx, supplier) = gated(&calls);
    let again = cache.track("config", supplier);
    assert_eq!(futures::executor::block_on(again), Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(cache.forget("config"));
    assert!(!cache.forget("config"));
    let (tx, supplier) = gated(&calls);
    let fresh = cache.track("config", supplier);
    tx.send(Ok(2)).unwrap();
    assert_eq!(futures::executor::block_on(fresh), Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn persistent_keeps_failures_by_default() {
    let cache: PersistentCache<Answer> = PersistentCache::default();
    assert!(!cache.forgets_on_rejection());
    let failed = cache.track("db", || async { Err::<u32, String>("refused".into()) });
    assert!(futures::executor::block_on(failed).is_err());
    assert!(cache.has("db"));

    let retry = cache.track("db", || async { Ok::<u32, String>(5) });
    assert_eq!(
        futures::executor::block_on(retry),
        Err("refused".to_string())
    );
}

#[test]
fn persistent_can_forget_failures() {
    let cache: PersistentCache<Answer> =
        PersistentCache::new(PersistentCacheOptions::new().forget_on_rejection(true));
    let failed = cache.track("db", || async { Err::<u32, String>("refused".into()) });
    assert!(futures::executor::block_on(failed).is_err());
    assert!(!cache.has("db"));

    let ok = cache.track("db", || async { Ok::<u32, String>(5) });
    assert_eq!(futures::executor::block_on(ok), Ok(5));
    assert!(cache.has("db"));
}

#[test]
fn clear_evicts_everything() {
    let cache: PersistentCache<Answer> = PersistentCache::default();
    for id in ["a", "b", "c"] {
        let _ = futures::executor::block_on(cache.track(id, || async { Ok::<u32, String>(0) }));
    }
    assert_eq!(cache.len(), 3);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn stale_settlement_keeps_newer_entry() {
    let cache: PersistentCache<Answer> =
        PersistentCache::new(PersistentCacheOptions::new().forget_on_rejection(true));
    let calls = Arc::new(AtomicUsize::new(0));
    let (old_tx, supplier) = gated(&calls);
    let old = cache.track("k", supplier);
    assert!(cache.forget("k"));

    let (new_tx, supplier) = gated(&calls);
    let new = cache.track("k", supplier);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    old_tx.send(Err("late failure".to_string())).unwrap();
    assert!(futures::executor::block_on(old).is_err());
    assert!(cache.has("k"));

    new_tx.send(Ok(3)).unwrap();
    assert_eq!(futures::executor::block_on(new), Ok(3));
}

#[test]
fn caches_forward_coordinator_state() {
    let cache: TransientCache<Answer> = TransientCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let settled = Arc::new(AtomicUsize::new(0));
    let s = settled.clone();
    let _ = cache.on_settled(move |settlement| {
        assert_eq!(settlement.label.as_deref(), Some("job"));
        s.fetch_add(1, Ordering::SeqCst);
    });

    let (tx, supplier) = gated(&calls);
    let job = cache.track("job", supplier);
    let mut wait = Box::pin(cache.wait());
    assert!(wait.as_mut().now_or_never().is_none());
    assert_eq!(cache.coordinator().size(), 1);

    tx.send(Ok(0)).unwrap();
    let _ = futures::executor::block_on(job);
    assert!(wait.as_mut().now_or_never().is_some());
    assert_eq!(settled.load(Ordering::SeqCst), 1);
}

#[test]
fn supplier_may_use_its_own_cache() {
    let cache: Arc<TransientCache<Answer>> = Arc::new(TransientCache::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let nested = Arc::new(Mutex::new(Vec::new()));
    let supplier = {
        let cache = cache.clone();
        let calls = calls.clone();
        let nested = nested.clone();
        move || {
            assert!(cache.has("profile"));
            let (_unused, again) = gated(&calls);
            let same = cache.track("profile", again);
            let other = cache.track("avatar", || async { Ok::<u32, String>(2) });
            nested.lock().unwrap().extend([same, other]);
            async { Ok::<u32, String>(1) }
        }
    };

    let profile = cache.track("profile", supplier);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.size(), 2);

    assert_eq!(futures::executor::block_on(profile), Ok(1));
    let nested = std::mem::take(&mut *nested.lock().unwrap());
    assert_eq!(
        futures::executor::block_on(futures::future::join_all(nested)),
        vec![Ok(1), Ok(2)]
    );
    assert!(cache.is_empty());
    assert_eq!(cache.size(), 0);
}

#[derive(Debug)]
struct Config {
    retries: u32,
}

#[test]
fn caches_hold_shared_values() {
    let cache: PersistentCache<Arc<Config>> = PersistentCache::default();
    let settled = Arc::new(Mutex::new(Vec::new()));
    let s = settled.clone();
    let _ = cache.on_settled(move |settlement| s.lock().unwrap().push(settlement.clone()));

    let first = futures::executor::block_on(
        cache.track("config", || async { Arc::new(Config { retries: 3 }) }),
    );
    let second = futures::executor::block_on(
        cache.track("config", || async { Arc::new(Config { retries: 9 }) }),
    );
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.retries, 3);

    let settled = settled.lock().unwrap();
    assert_eq!(settled.len(), 1);
    assert!(!settled[0].failed);
    let kept = settled[0].result.downcast_ref::<Arc<Config>>().unwrap();
    assert!(Arc::ptr_eq(kept, &first));
}
