//! Resumable operations.
//!
//! An asynchronous reader operation is a synchronous step that may report
//! [`Progress::NeedMoreData`]. [`Continuation::run`] drives the step: it
//! waits for data, rewinds the target to its last snapshot and runs the step
//! again, until the step completes, fails, times out or is cancelled.

use async_trait::async_trait;
use tds_wire::Progress;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::instrumentation::span_names;

/// Something a [`Continuation`] can suspend and resume.
#[async_trait]
pub trait Resumable: Send {
    /// Take a snapshot before the first attempt.
    fn prepare_invocation(&mut self);

    /// Rewind to the snapshot before another attempt.
    fn prepare_continuation(&mut self);

    /// Release the snapshot after the operation finished.
    fn cleanup(&mut self);

    /// Wait until more bytes may be available.
    async fn wait_for_data(&mut self) -> Result<()>;

    /// Give up on the operation after `error` interrupted it.
    fn abandon(&mut self, error: &Error);
}

/// Driver of one suspended operation.
#[derive(Debug)]
pub struct Continuation {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Continuation {
    /// Create a driver that honours `cancel` and the optional `deadline`.
    #[must_use]
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    /// Run `step` against `target` until it completes.
    ///
    /// The caller must have called
    /// [`prepare_invocation`](Resumable::prepare_invocation) before the
    /// first attempt.
    pub async fn run<R, T, F>(&self, target: &mut R, mut step: F) -> Result<T>
    where
        R: Resumable + ?Sized,
        F: FnMut(&mut R) -> Result<Progress<T>> + Send,
        T: Send,
    {
        let mut resumed = false;
        loop {
            if self.cancel.is_cancelled() {
                let error = Error::Cancelled;
                target.abandon(&error);
                return Err(error);
            }
            if resumed {
                target.prepare_continuation();
            }

            match step(target) {
                Ok(Progress::Done(value)) => {
                    target.cleanup();
                    return Ok(value);
                }
                Err(e) => {
                    target.cleanup();
                    return Err(e);
                }
                Ok(Progress::NeedMoreData) => {}
            }

            if let Err(error) = self
                .wait(target)
                .instrument(tracing::debug_span!(span_names::CONTINUATION))
                .await
            {
                target.abandon(&error);
                return Err(error);
            }
            tracing::debug!("resuming operation after more data arrived");
            resumed = true;
        }
    }

    async fn wait<R: Resumable + ?Sized>(&self, target: &mut R) -> Result<()> {
        let wait = async {
            match self.deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, target.wait_for_data()).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::CommandTimeout),
                    }
                }
                None => target.wait_for_data().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            result = wait => result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct Fake {
        events: Vec<&'static str>,
        ready_after: usize,
        waits: usize,
        hang: bool,
    }

    #[async_trait]
    impl Resumable for Fake {
        fn prepare_invocation(&mut self) {
            self.events.push("invoke");
        }

        fn prepare_continuation(&mut self) {
            self.events.push("replay");
        }

        fn cleanup(&mut self) {
            self.events.push("cleanup");
        }

        async fn wait_for_data(&mut self) -> Result<()> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.waits += 1;
            Ok(())
        }

        fn abandon(&mut self, _error: &Error) {
            self.events.push("abandon");
        }
    }

    fn step(fake: &mut Fake) -> Result<Progress<u32>> {
        if fake.waits >= fake.ready_after {
            Ok(Progress::Done(7))
        } else {
            Ok(Progress::NeedMoreData)
        }
    }

    #[tokio::test]
    async fn test_step_is_replayed_until_done() {
        let mut fake = Fake {
            ready_after: 2,
            ..Fake::default()
        };
        fake.prepare_invocation();
        let value = Continuation::new(CancellationToken::new(), None)
            .run(&mut fake, step)
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(fake.events, ["invoke", "replay", "replay", "cleanup"]);
    }

    #[tokio::test]
    async fn test_error_skips_replay() {
        let mut fake = Fake::default();
        let result: Result<()> = Continuation::new(CancellationToken::new(), None)
            .run(&mut fake, |_| Err(Error::NoData))
            .await;
        assert!(matches!(result, Err(Error::NoData)));
        assert_eq!(fake.events, ["cleanup"]);
    }

    #[tokio::test]
    async fn test_deadline_abandons() {
        let mut fake = Fake {
            ready_after: 1,
            hang: true,
            ..Fake::default()
        };
        let deadline = Instant::now() + Duration::from_millis(20);
        let result = Continuation::new(CancellationToken::new(), Some(deadline))
            .run(&mut fake, step)
            .await;
        assert!(matches!(result, Err(Error::CommandTimeout)));
        assert_eq!(fake.events, ["abandon"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let mut fake = Fake::default();
        let result = Continuation::new(token, None).run(&mut fake, step).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(fake.events, ["abandon"]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let token = CancellationToken::new();
        let mut fake = Fake {
            ready_after: 1,
            hang: true,
            ..Fake::default()
        };
        let canceller = token.clone();
        let continuation = Continuation::new(token, None);
        let (result, ()) = tokio::join!(
            continuation.run(&mut fake, step),
            async move {
                tokio::task::yield_now().await;
                canceller.cancel();
            }
        );
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(fake.events, ["abandon"]);
    }
}
