use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::future::{Either, select};
use futures_timer::Delay;

/// Run `future` for at most `duration`.
///
/// On expiry the future is dropped, which releases whatever listener guards
/// it owns.
pub(crate) async fn with_timeout<F: Future>(duration: Duration, future: F) -> Option<F::Output> {
    let future = pin!(future);
    match select(future, Delay::new(duration)).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}
