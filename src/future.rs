//! Small future utilities shared by the polling loops of the client.

use crate::cancel::Cancellation;
use futures::future::{self, Either};
use futures_timer::Delay;
use std::future::Future;
use std::time::Duration;

/// Create a new delay that may resolve immediately when delayed for a zero
/// duration.
///
/// This method is used so that unit tests resolve immediately, as the `Delay`
/// future always returns `Poll::Pending` at least once, even with a delay or
/// zero.
pub async fn delay(duration: Duration) {
    if !duration.is_zero() {
        Delay::new(duration).await;
    }
}

/// Resolves to `Some(output)` if the future completes within the timeout and
/// `None` otherwise. A `None` timeout never expires.
pub async fn timeout<F>(duration: Option<Duration>, fut: F) -> Option<F::Output>
where
    F: Future,
{
    let duration = match duration {
        Some(duration) => duration,
        None => return Some(fut.await),
    };

    match future::select(Box::pin(fut), Box::pin(Delay::new(duration))).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

/// Resolves to `Some(output)` if the future completes before cancellation is
/// requested and `None` otherwise. The future is not polled at all if the
/// signal was already cancelled.
pub async fn until_cancelled<F>(cancel: &Cancellation, fut: F) -> Option<F::Output>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return None;
    }

    match future::select(Box::pin(fut), Box::pin(cancel.cancelled())).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}
