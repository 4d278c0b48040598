use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

/// A one-shot cancellation signal for the request in flight on a single connection.
///
/// Clones share the same signal. Cancelling is idempotent: only the first call to
/// [`cancel`](CancelToken::cancel) has any effect, and cancelling a token nobody is waiting on
/// is harmless.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<Inner>);

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

/// Future that completes once a [`CancelToken`] has been cancelled.
///
/// Created by [`CancelToken::cancelled`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Cancelled<'a> {
    token: &'a CancelToken,
}

impl CancelToken {
    /// Create a new token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking everything waiting in [`cancelled`](CancelToken::cancelled).
    ///
    /// Returns `true` if this call cancelled the token, and `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.0.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let wakers = std::mem::take(&mut *self.0.lock_wakers());
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Return true if the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Return a future that completes once the token is cancelled.
    pub fn cancelled(&self) -> Cancelled<'_> {
        Cancelled { token: self }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Inner {
    fn lock_wakers(&self) -> std::sync::MutexGuard<'_, Vec<Waker>> {
        self.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Future for Cancelled<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let inner = &self.token.0;
        if inner.cancelled.load(Ordering::Acquire) {
            return Poll::Ready(());
        }
        {
            let mut wakers = inner.lock_wakers();
            if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                wakers.push(cx.waker().clone());
            }
        }
        // Re-check so a cancel racing with the registration above is not missed.
        if inner.cancelled.load(Ordering::Acquire) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
