use core::pin::pin;
use core::task::Poll;
use std::thread;
use std::time::{Duration, Instant};

use cassette::Cassette;
use futures::future::{poll_fn, select, Either};

use crate::errors::{Result, TimeoutSnafu};

const POLL_INTERVAL: Duration = Duration::from_micros(10);

/// Polls `done` until it reports completion, fails, or `timeout` passes.
///
/// `done` is re-checked before the deadline, so a transfer that
/// finishes in the last poll interval still counts as finished.
pub fn block_until<F>(operation: &'static str, timeout: Duration, mut done: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let start = Instant::now();

    let finished = pin!(poll_fn(|cx| match done() {
        Ok(false) => {
            cx.waker().wake_by_ref();
            Poll::Pending
        }
        result => Poll::Ready(result.map(drop)),
    }));

    let deadline = pin!(poll_fn(|cx| {
        if start.elapsed() >= timeout {
            Poll::Ready(())
        } else {
            thread::sleep(POLL_INTERVAL);
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }));

    match Cassette::new(select(finished, deadline)).block_on() {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => {
            let waited = start.elapsed();
            log::error!("{} did not finish within {:?}.", operation, waited);
            TimeoutSnafu { operation, waited }.fail()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HardwareFaultSnafu;
    use crate::Ws281xError;

    #[test]
    fn finishes() {
        let mut polls = 0;
        block_until("test", Duration::from_secs(1), || {
            polls += 1;
            Ok(polls == 3)
        })
        .unwrap();
        assert_eq!(polls, 3);
    }

    #[test]
    fn propagates_errors() {
        let err = block_until("test", Duration::from_secs(1), || {
            HardwareFaultSnafu { reason: "boom" }.fail()
        })
        .unwrap_err();
        assert!(matches!(err, Ws281xError::HardwareFault { .. }));
    }

    #[test]
    fn times_out() {
        let err = block_until("transfer", Duration::from_millis(2), || Ok(false)).unwrap_err();
        match err {
            Ws281xError::Timeout { operation, waited } => {
                assert_eq!(operation, "transfer");
                assert!(waited >= Duration::from_millis(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
