// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parent attribution when two tracked asynchronous chains interleave on one thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use test_executors::async_test;
use trackwise::{
    CallStack, InvocationKey, InvocationRecord, Phase, PlainStack, ScopedStack, Tracker,
    TrackerOptions,
};

/// Returns `Pending` once so the other branch of a `join!` runs in between.
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

fn yield_now() -> YieldNow {
    YieldNow(false)
}

fn recorder(tracker: &Tracker) -> Arc<Mutex<Vec<InvocationRecord>>> {
    let records = Arc::new(Mutex::new(Vec::new()));
    let r = records.clone();
    let _ = tracker.on_started(move |record| r.lock().unwrap().push(record.clone()));
    records
}

/// Runs chains 1 and 2 concurrently.  Each chain makes a nested tracked call, suspends,
/// and makes another.  Returns every `started` record.
async fn interleave(stack: Arc<dyn CallStack>) -> Vec<InvocationRecord> {
    let tracker = Tracker::new(TrackerOptions::new().name("interleave").stack(stack));
    let records = recorder(&tracker);
    let step = tracker.track("step", |_chain: u32| -> Result<(), ()> { Ok(()) });
    let chain = tracker.track_async("chain", move |id: u32| {
        let step = step.clone();
        async move {
            step.call(id)?;
            yield_now().await;
            step.call(id)?;
            yield_now().await;
            step.call(id)
        }
    });

    let (a, b) = futures::join!(chain.call(1), chain.call(2));
    assert_eq!((a, b), (Ok(()), Ok(())));
    let records = records.lock().unwrap().clone();
    records
}

/// Steps whose parent is not the chain they were called from.
fn misattributed(records: &[InvocationRecord]) -> Vec<String> {
    let chain_of = |key: &InvocationKey| {
        records
            .iter()
            .find(|r| &r.key == key && r.key.operation() == "chain")
            .and_then(|r| r.args.clone())
    };
    records
        .iter()
        .filter(|r| r.key.operation() == "step")
        .filter(|r| r.parent.as_ref().and_then(&chain_of) != r.args)
        .map(|r| r.key.id().to_string())
        .collect()
}

#[async_test]
async fn scoped_stack_keeps_chains_apart() {
    let stack: Arc<dyn CallStack> = Arc::new(ScopedStack::new());
    let records = interleave(stack.clone()).await;

    let steps = records.iter().filter(|r| r.key.operation() == "step").count();
    assert_eq!(steps, 6);
    assert_eq!(misattributed(&records), Vec::<String>::new());
    let chains: Vec<&InvocationRecord> = records
        .iter()
        .filter(|r| r.key.operation() == "chain")
        .collect();
    assert!(chains.iter().all(|r| r.parent.is_none()));
    assert_eq!(stack.peek(), None);
}

#[async_test]
async fn plain_stack_mixes_chains_up() {
    let stack: Arc<dyn CallStack> = Arc::new(PlainStack::new());
    let records = interleave(stack.clone()).await;

    // the second chain starts while the first one's key is still pushed
    let second = records
        .iter()
        .find(|r| r.key.operation() == "chain" && r.key.index() == 1)
        .unwrap();
    assert!(second.parent.is_some());
    assert!(!misattributed(&records).is_empty());
    assert_eq!(stack.peek(), None);
}

#[async_test]
async fn concurrent_fetches_are_independent() {
    let tracker = Tracker::new(TrackerOptions::new().name("users"));
    let records = Arc::new(Mutex::new(Vec::new()));
    let r = records.clone();
    let _ = tracker.on_invoked(move |record| r.lock().unwrap().push(record.clone()));

    let fetch_user = tracker.track_async("fetchUser", |id: &'static str| async move {
        yield_now().await;
        Ok::<String, String>(format!("user {id}"))
    });
    let (a, b) = futures::join!(fetch_user.call("42"), fetch_user.call("43"));
    assert_eq!(a, Ok("user 42".to_string()));
    assert_eq!(b, Ok("user 43".to_string()));

    let records = records.lock().unwrap();
    let started: Vec<&InvocationRecord> = records.iter().filter(|r| r.is_started()).collect();
    assert_eq!(started.len(), 2);
    assert_eq!(started[0].key.index(), 0);
    assert_eq!(started[0].args.as_deref(), Some("\"42\""));
    assert_eq!(started[1].key.index(), 1);
    assert_eq!(started[1].args.as_deref(), Some("\"43\""));
    assert!(started.iter().all(|r| r.parent.is_none()));

    for start in &started {
        let terminals: Vec<&InvocationRecord> = records
            .iter()
            .filter(|r| r.key == start.key && r.is_terminal())
            .collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(
            terminals[0].phase,
            Phase::Completed {
                was_async: true,
                ..
            }
        ));
    }
}
