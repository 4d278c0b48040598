use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Which side of a [`Race`] finished first, along with its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner<A, B> {
    /// The first future completed.
    First(A),
    /// The second future completed.
    Second(B),
}

pin_project! {
    /// Future that waits for whichever of two futures completes first.
    ///
    /// The losing future is dropped along with the `Race`. The first future is always polled
    /// first, so if both are ready on the same poll the first one wins.
    ///
    /// Created by [`race`].
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Race<A, B> {
        #[pin]
        first: A,
        #[pin]
        second: B,
    }
}

/// Wait for an event or a timeout, whichever comes first.
///
/// This is used both to race a simulated processing delay against a cancellation, and to race
/// the end of draining against the grace period.
///
/// # Examples
///
/// ```
/// use scheme_simulator::{race, Winner};
/// use std::future;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let winner = race(future::ready(1), future::pending::<()>()).await;
/// assert_eq!(winner, Winner::First(1));
/// # }
/// ```
pub fn race<A: Future, B: Future>(first: A, second: B) -> Race<A, B> {
    Race { first, second }
}

impl<A: Future, B: Future> Future for Race<A, B> {
    type Output = Winner<A::Output, B::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(a) = this.first.poll(cx) {
            return Poll::Ready(Winner::First(a));
        }
        this.second.poll(cx).map(Winner::Second)
    }
}
