use futures_task::noop_waker_ref;
use scheme_simulator::{race, CancelToken, ConnectionId, Registry, Tracker, UntilStopped, Winner};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync;

#[test]
fn basic_flow() {
    let mut cx = Context::from_waker(noop_waker_ref());
    let tracker = Tracker::new();
    let mut drained = tracker.drained();

    assert!(tracker.is_running());
    assert!(!tracker.is_stopping());

    {
        let _guard = tracker.track();
        assert_eq!(tracker.outstanding(), 1);
        assert!(tracker.stop());
        assert!(tracker.is_stopping());
        assert!(!tracker.is_running());
        assert_eq!(Poll::Pending, Pin::new(&mut drained).poll(&mut cx));
    }
    assert_eq!(tracker.outstanding(), 0);
    assert_eq!(Pin::new(&mut drained).poll(&mut cx), Poll::Ready(()));
}

#[test]
fn not_drained_while_running() {
    let mut cx = Context::from_waker(noop_waker_ref());
    let tracker = Tracker::new();
    let mut drained = tracker.drained();
    let mut stopping = tracker.stopping();

    assert_eq!(tracker.outstanding(), 0);
    assert_eq!(Pin::new(&mut drained).poll(&mut cx), Poll::Pending);
    assert_eq!(Pin::new(&mut stopping).poll(&mut cx), Poll::Pending);

    assert!(tracker.stop());
    assert!(!tracker.stop(), "second stop should report it was already underway");
    assert_eq!(Pin::new(&mut stopping).poll(&mut cx), Poll::Ready(()));
    assert_eq!(Pin::new(&mut drained).poll(&mut cx), Poll::Ready(()));
}

#[tokio::test]
async fn drain_or_grace_period() {
    let (tx, rx) = sync::oneshot::channel::<()>();

    let tracker = Tracker::new();
    let _guard = tracker.track();

    tracker.stop();
    assert_eq!(tracker.outstanding(), 1);
    let grace = async move {
        let _ = rx.await;
    };
    let waiting = race(tracker.drained(), grace);
    tx.send(()).unwrap();
    assert_eq!(waiting.await, Winner::Second(()));
}

#[tokio::test]
async fn drained_before_grace_period() {
    let tracker = Tracker::new();
    let guard = tracker.track();
    let stop = tracker.stop_after(async {});

    let finish = async move {
        tokio::task::yield_now().await;
        drop(guard);
    };
    let (_, ()) = tokio::join!(stop, finish);

    let waiting = race(tracker.drained(), std::future::pending::<()>());
    assert_eq!(waiting.await, Winner::First(()));
}

#[tokio::test]
async fn race_prefers_first_when_both_ready() {
    let winner = race(async { 1 }, async { 2 }).await;
    assert_eq!(winner, Winner::First(1));
}

#[tokio::test]
async fn cancel_token_fires_once() {
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    let waiter = tokio::spawn(async move {
        clone.cancelled().await;
        clone.is_cancelled()
    });
    tokio::task::yield_now().await;

    assert!(token.cancel());
    assert!(!token.cancel());
    assert!(waiter.await.unwrap());
    // Already-cancelled tokens complete immediately.
    token.cancelled().await;
}

#[test]
fn registry_cancel_all_keeps_entries() {
    let registry = Arc::new(Registry::new());
    let first = registry.register();
    let second = registry.register();
    assert!(first.id() < second.id());
    assert_eq!(registry.len(), 2);

    assert_eq!(registry.cancel_all(), 2);
    assert!(first.token().is_cancelled());
    assert!(second.token().is_cancelled());
    assert_eq!(registry.len(), 2);

    // Firing again does not cancel anything twice.
    assert_eq!(registry.cancel_all(), 0);

    let id = first.id();
    drop(first);
    assert!(!registry.contains(id));
    assert!(registry.contains(second.id()));
    drop(second);
    assert!(registry.is_empty());
}

#[test]
fn registry_insert_remove() {
    let registry = Registry::new();
    let id = ConnectionId::next();
    let token = CancelToken::new();

    registry.insert(id, token.clone());
    assert!(registry.contains(id));
    let removed = registry.remove(id).expect("entry should be present");
    assert!(registry.remove(id).is_none());

    // Cancelling an unregistered connection is a harmless no-op.
    assert_eq!(registry.cancel_all(), 0);
    assert!(removed.cancel());
    assert!(token.is_cancelled());
}

#[test]
fn connection_ids_are_never_reused() {
    let ids: Vec<ConnectionId> = (0..100).map(|_| ConnectionId::next()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(format!("{}", ConnectionId::next()).chars().next(), Some('#'));
}

#[tokio::test]
async fn until_stopped_stream() {
    use tokio_stream::{wrappers::ReceiverStream, StreamExt};

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    let tracker = Tracker::new();

    let mut stream = UntilStopped::new(tracker.clone(), ReceiverStream::new(rx));

    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();
    tx.send(3).await.unwrap();

    assert_eq!(stream.next().await, Some(1));
    assert_eq!(stream.next().await, Some(2));
    tracker.stop();
    assert_eq!(stream.next().await, None);
    assert!(stream.is_done());
    assert!(tx.is_closed(), "inner stream should have been dropped");
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn until_stopped_wakes_pending_stream() {
    use tokio_stream::{wrappers::ReceiverStream, StreamExt};

    let (_tx, rx) = tokio::sync::mpsc::channel::<u32>(1);
    let tracker = Tracker::new();
    let mut stream = UntilStopped::new(tracker.clone(), ReceiverStream::new(rx));

    let next = tokio::spawn(async move { stream.next().await });
    tokio::task::yield_now().await;
    tracker.stop();
    assert_eq!(next.await.unwrap(), None);
}
