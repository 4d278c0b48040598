use super::Tracker;
use futures_core::stream::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A stream that ends as soon as stop is initiated.
    ///
    /// The first poll after the [`Tracker`] starts stopping returns `None` and drops the wrapped
    /// stream. Wrapping a listener stream this way closes the listening socket, so new connection
    /// attempts are refused from then on. Items already produced are unaffected, but items that
    /// become ready only after stop began are never yielded.
    pub struct UntilStopped<S> {
        tracker: Tracker,
        #[pin]
        stream: Option<S>,
    }
}

impl<S: Stream> UntilStopped<S> {
    /// Wrap `stream` so it ends once `tracker` starts stopping.
    pub fn new(tracker: Tracker, stream: S) -> Self {
        UntilStopped {
            tracker,
            stream: Some(stream),
        }
    }

    /// Return true once the wrapped stream has been dropped.
    pub fn is_done(&self) -> bool {
        self.stream.is_none()
    }
}

impl<S: Stream> Stream for UntilStopped<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if this.stream.is_none() {
            return Poll::Ready(None);
        }
        if this.tracker.poll_stopping(cx).is_ready() {
            this.stream.set(None);
            return Poll::Ready(None);
        }
        match this.stream.as_pin_mut() {
            Some(stream) => stream.poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}
