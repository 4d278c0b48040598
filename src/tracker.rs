use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

const MAX_OUTSTANDING: usize = usize::MAX >> 1;
const RUNNING_STATE: usize = !MAX_OUTSTANDING;

/// Tracks whether the server is stopping and how many connections are still being served.
///
/// A `Tracker` is cheap to clone; all clones share the same state. Connections are counted by
/// holding a [`ConnectionGuard`] obtained from [`track`](Tracker::track), and the
/// [`drained`](Tracker::drained) future completes once stop has been initiated and every guard
/// has been dropped.
#[derive(Clone)]
pub struct Tracker(Arc<Inner>);

/// A drop guard counting one outstanding connection.
///
/// While it is alive the [`Tracker`] is not drained. Dropping it, including during a panic,
/// decrements the outstanding count.
pub struct ConnectionGuard(Arc<Inner>);

struct Inner {
    /// The most significant bit is 1 while running and 0 once stop has been initiated. The
    /// remaining bits count outstanding connections, which limits the count to
    /// `usize::MAX >> 1`.
    state: AtomicUsize,
    wakers: Mutex<Vec<Waker>>,
}

/// Future that completes once stop has been initiated.
///
/// Created by [`Tracker::stopping`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Stopping(Arc<Inner>);

/// Future that completes once stop has been initiated and no connections are outstanding.
///
/// Created by [`Tracker::drained`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Drained(Arc<Inner>);

impl Tracker {
    /// Create a new running [`Tracker`] with no outstanding connections.
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            state: AtomicUsize::new(RUNNING_STATE),
            // Only the accept loop, the stop watcher and the shutdown controller wait on this.
            wakers: Mutex::new(Vec::with_capacity(3)),
        }))
    }

    /// Initiate stop.
    ///
    /// Returns `true` if this call initiated it, and `false` if stop was already underway.
    pub fn stop(&self) -> bool {
        self.0.stop()
    }

    /// Return a future that waits for `f` to complete, then initiates stop.
    pub fn stop_after<F: Future>(&self, f: F) -> impl Future<Output = F::Output> {
        let handle = self.clone();
        async move {
            let result = f.await;
            handle.stop();
            result
        }
    }

    /// Return true if stop has been initiated.
    pub fn is_stopping(&self) -> bool {
        self.0.is_stopping()
    }

    /// Return true if stop has not yet been initiated.
    pub fn is_running(&self) -> bool {
        !self.is_stopping()
    }

    /// Return how many connections are currently outstanding.
    ///
    /// This is only a snapshot; other threads may change it at any time.
    pub fn outstanding(&self) -> usize {
        self.0.state.load(Ordering::Acquire) & MAX_OUTSTANDING
    }

    /// Count one more outstanding connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        self.0.start_connection();
        ConnectionGuard(self.0.clone())
    }

    /// Return a future that completes once stop has been initiated.
    pub fn stopping(&self) -> Stopping {
        Stopping(self.0.clone())
    }

    /// Return a future that completes once stop has been initiated and every
    /// [`ConnectionGuard`] has been dropped.
    pub fn drained(&self) -> Drained {
        Drained(self.0.clone())
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker::new()
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("stopping", &self.is_stopping())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl Inner {
    fn stop(&self) -> bool {
        // Clear the "running" flag.
        let previous = self.state.fetch_and(MAX_OUTSTANDING, Ordering::AcqRel);
        self.wake();
        previous & RUNNING_STATE != 0
    }

    fn start_connection(&self) {
        let previous = self.state.fetch_add(1, Ordering::AcqRel);
        assert_ne!(
            previous & MAX_OUTSTANDING,
            MAX_OUTSTANDING,
            "Exceeding maximum number of outstanding connections"
        );
    }

    fn end_connection(&self) {
        if self.state.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.wake();
        }
    }

    fn wake(&self) {
        let wakers = std::mem::take(&mut *self.lock_wakers());
        for waker in wakers {
            waker.wake();
        }
    }

    fn is_stopping(&self) -> bool {
        (self.state.load(Ordering::Acquire) & RUNNING_STATE) == 0
    }

    fn is_drained(&self) -> bool {
        self.state.load(Ordering::Acquire) == 0
    }

    fn lock_wakers(&self) -> std::sync::MutexGuard<'_, Vec<Waker>> {
        self.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_waker(&self, cx: &mut Context<'_>) {
        let mut wakers = self.lock_wakers();
        if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
            wakers.push(cx.waker().clone());
        }
    }

    /// Register the current task and then re-check `ready`, so a state change between the two
    /// is never missed.
    fn poll_until(&self, cx: &mut Context<'_>, ready: impl Fn(&Self) -> bool) -> Poll<()> {
        if ready(self) {
            return Poll::Ready(());
        }
        self.add_waker(cx);
        if ready(self) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Tracker {
    pub(crate) fn poll_stopping(&self, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_until(cx, Inner::is_stopping)
    }
}

impl Future for Stopping {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_until(cx, Inner::is_stopping)
    }
}

impl Future for Drained {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_until(cx, Inner::is_drained)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.end_connection();
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConnectionGuard")
    }
}
