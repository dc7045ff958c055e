//! Request/reply over tell-only mailboxes.
//!
//! [`CorrelatableRef`] keeps a table of pending completions keyed by a
//! caller-chosen correlation id. A request is posted together with a
//! [`ReplyTo`] handle; whoever answers tells the reply to that handle and
//! the matching waiter wakes up.

use crate::error::{Result, SdkError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// A reply that knows which request it answers.
pub trait Correlated {
    fn correlation_id(&self) -> u64;
}

/// Pending completions keyed by correlation id.
pub struct CorrelatableRef<R> {
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<R>>>>,
}

impl<R> Clone for CorrelatableRef<R> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<R> Default for CorrelatableRef<R> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<R> fmt::Debug for CorrelatableRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelatableRef")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl<R: Correlated + Send + 'static> CorrelatableRef<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to pass along with a request.
    pub fn reply_to(&self) -> ReplyTo<R> {
        ReplyTo {
            correlations: self.clone(),
        }
    }

    /// Register a completion for `correlation_id`, post the request and wait
    /// for its reply.
    ///
    /// `post` receives the reply handle and returns `false` when the request
    /// could not be delivered. The wait ends early with
    /// [`SdkError::Cancelled`] when `cancel` resolves or [`stop`](Self::stop)
    /// is called.
    pub async fn post_and_await<F, C>(&self, correlation_id: u64, post: F, cancel: C) -> Result<R>
    where
        F: FnOnce(ReplyTo<R>) -> bool,
        C: Future<Output = ()>,
    {
        let mut waiting = {
            let mut pending = self.pending.lock();
            if pending.contains_key(&correlation_id) {
                return Err(SdkError::Correlation { correlation_id });
            }
            let (tx, rx) = oneshot::channel();
            pending.insert(correlation_id, tx);
            Waiting {
                pending: &self.pending,
                correlation_id,
                rx,
            }
        };

        if !post(self.reply_to()) {
            return Err(SdkError::ChannelClosed(format!(
                "request {} could not be posted",
                correlation_id
            )));
        }

        tokio::select! {
            reply = &mut waiting.rx => reply.map_err(|_| SdkError::Cancelled { correlation_id }),
            _ = cancel => {
                debug!(correlation_id, "request cancelled");
                Err(SdkError::Cancelled { correlation_id })
            }
        }
    }

    /// Complete the waiter matching `reply`; `false` if nobody waits for it.
    pub fn complete(&self, reply: R) -> bool {
        let correlation_id = reply.correlation_id();
        match self.pending.lock().remove(&correlation_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                warn!(correlation_id, "reply without a pending request");
                false
            }
        }
    }

    pub fn is_pending(&self, correlation_id: u64) -> bool {
        self.pending.lock().contains_key(&correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cancel every pending request.
    pub fn stop(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelling pending requests");
        }
    }
}

/// A registered completion. Dropping it, however the wait ended, frees the
/// correlation id unless a newer request has taken it over.
struct Waiting<'a, R> {
    pending: &'a Mutex<HashMap<u64, oneshot::Sender<R>>>,
    correlation_id: u64,
    rx: oneshot::Receiver<R>,
}

impl<R> Drop for Waiting<'_, R> {
    fn drop(&mut self) {
        self.rx.close();
        let mut pending = self.pending.lock();
        if pending
            .get(&self.correlation_id)
            .is_some_and(oneshot::Sender::is_closed)
        {
            pending.remove(&self.correlation_id);
            trace!(correlation_id = self.correlation_id, "abandoned request removed");
        }
    }
}

/// Where a correlated reply goes.
pub struct ReplyTo<R> {
    correlations: CorrelatableRef<R>,
}

impl<R> Clone for ReplyTo<R> {
    fn clone(&self) -> Self {
        Self {
            correlations: self.correlations.clone(),
        }
    }
}

impl<R> fmt::Debug for ReplyTo<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyTo")
    }
}

impl<R: Correlated + Send + 'static> ReplyTo<R> {
    pub fn tell(&self, reply: R) -> bool {
        self.correlations.complete(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Pong {
        id: u64,
        body: &'static str,
    }

    impl Correlated for Pong {
        fn correlation_id(&self) -> u64 {
            self.id
        }
    }

    #[tokio::test]
    async fn test_reply_completes_waiter() {
        let correlations = CorrelatableRef::<Pong>::new();
        let reply = correlations
            .post_and_await(1, |reply_to| reply_to.tell(Pong { id: 1, body: "pong" }), pending())
            .await;
        assert_eq!(reply, Ok(Pong { id: 1, body: "pong" }));
        assert_eq!(correlations.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_correlation_id_is_rejected() {
        let correlations = CorrelatableRef::<Pong>::new();
        let (posted_tx, posted_rx) = oneshot::channel::<ReplyTo<Pong>>();

        let waiter = {
            let correlations = correlations.clone();
            tokio::spawn(async move {
                correlations
                    .post_and_await(7, |reply_to| posted_tx.send(reply_to).is_ok(), pending())
                    .await
            })
        };
        let reply_to = posted_rx.await.unwrap();

        let second = correlations.post_and_await(7, |_| true, pending()).await;
        assert_eq!(second, Err(SdkError::Correlation { correlation_id: 7 }));

        assert!(reply_to.tell(Pong { id: 7, body: "late" }));
        assert_eq!(waiter.await.unwrap(), Ok(Pong { id: 7, body: "late" }));

        // id is free again once completed
        let third = correlations
            .post_and_await(7, |reply_to| reply_to.tell(Pong { id: 7, body: "again" }), pending())
            .await;
        assert_eq!(third.map(|p| p.body), Ok("again"));
    }

    #[tokio::test]
    async fn test_cancellation_future_fails_waiter() {
        let correlations = CorrelatableRef::<Pong>::new();
        let result = correlations.post_and_await(3, |_| true, async {}).await;
        assert_eq!(result, Err(SdkError::Cancelled { correlation_id: 3 }));
        assert!(!correlations.is_pending(3));
    }

    #[tokio::test]
    async fn test_stop_cancels_everything() {
        let correlations = CorrelatableRef::<Pong>::new();
        let (posted_tx, posted_rx) = oneshot::channel::<()>();
        let waiter = {
            let correlations = correlations.clone();
            tokio::spawn(async move {
                correlations
                    .post_and_await(9, |_| posted_tx.send(()).is_ok(), pending())
                    .await
            })
        };
        posted_rx.await.unwrap();
        correlations.stop();
        assert_eq!(
            waiter.await.unwrap(),
            Err(SdkError::Cancelled { correlation_id: 9 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiter_frees_its_id() {
        let correlations = CorrelatableRef::<Pong>::new();
        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            correlations.post_and_await(5, |_| true, pending()),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(correlations.pending_count(), 0);

        let reused = correlations
            .post_and_await(5, |reply_to| reply_to.tell(Pong { id: 5, body: "again" }), pending())
            .await;
        assert_eq!(reused.map(|p| p.body), Ok("again"));
    }

    #[tokio::test]
    async fn test_undeliverable_request() {
        let correlations = CorrelatableRef::<Pong>::new();
        let result = correlations.post_and_await(4, |_| false, pending()).await;
        assert!(matches!(result, Err(SdkError::ChannelClosed(_))));
        assert_eq!(correlations.pending_count(), 0);
        assert!(!correlations.complete(Pong { id: 4, body: "nobody" }));
    }
}
