//! Mailbox handles for the SDK's actors.
//!
//! Every actor owns an unbounded mailbox and processes one message at a
//! time. [`ActorRef`] is the sending side: cheap to clone, compared by
//! identity, and able to tell when the actor behind it has gone away.

use causeway_notify::Recipient;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Sending handle to an actor's mailbox.
pub struct ActorRef<M> {
    id: u64,
    tx: mpsc::UnboundedSender<M>,
}

impl<M> ActorRef<M> {
    /// Create a mailbox and the handle that feeds it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fire-and-forget send; `false` if the mailbox is closed.
    pub fn tell(&self, message: M) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<M: Send + 'static> ActorRef<M> {
    /// Resolves once the actor behind this handle has stopped.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef#{}", self.id)
    }
}

impl<M> Recipient<M> for ActorRef<M> {
    fn tell(&self, message: M) -> bool {
        ActorRef::tell(self, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tell_and_close() {
        let (actor, mut mailbox) = ActorRef::<u32>::channel();
        assert!(actor.tell(7));
        assert_eq!(mailbox.recv().await, Some(7));

        let closed = actor.closed();
        drop(mailbox);
        closed.await;
        assert!(actor.is_closed());
        assert!(!actor.tell(8));
    }

    #[test]
    fn test_identity() {
        let (a, _rx_a) = ActorRef::<()>::channel();
        let (b, _rx_b) = ActorRef::<()>::channel();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
