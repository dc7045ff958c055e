//! Notification channel actor.
//!
//! Runs a [`NotificationChannel`] on its own task so an event log can
//! signal replication readiness without holding any lock.

use crate::actor::ActorRef;
use crate::error::{Result, SdkError};
use causeway_core::DurableEvent;
use causeway_notify::{
    NotificationChannel, NotificationSettings, ReplicationDue, ReplicationRead,
    ReplicationReadFailure, ReplicationReadSuccess, ReplicationWrite,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle targets register for `ReplicationDue` signals.
pub type DueHandle = ActorRef<ReplicationDue>;

pub enum NotificationMessage<P> {
    Updated(Vec<DurableEvent<P>>),
    ReplicationRead(ReplicationRead<P, DueHandle>),
    ReplicationReadSuccess(ReplicationReadSuccess<P>),
    ReplicationReadFailure(ReplicationReadFailure),
    ReplicationWrite(ReplicationWrite<P>),
}

/// Client side of a notification channel actor.
pub struct NotificationChannelRef<P> {
    handle: ActorRef<NotificationMessage<P>>,
}

impl<P> Clone for NotificationChannelRef<P> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<P: Send + 'static> NotificationChannelRef<P> {
    fn tell(&self, message: NotificationMessage<P>) -> Result<()> {
        if self.handle.tell(message) {
            Ok(())
        } else {
            Err(SdkError::ChannelClosed("notification channel".to_string()))
        }
    }

    pub fn updated(&self, events: Vec<DurableEvent<P>>) -> Result<()> {
        self.tell(NotificationMessage::Updated(events))
    }

    pub fn replication_read(&self, read: ReplicationRead<P, DueHandle>) -> Result<()> {
        self.tell(NotificationMessage::ReplicationRead(read))
    }

    pub fn replication_read_success(&self, success: ReplicationReadSuccess<P>) -> Result<()> {
        self.tell(NotificationMessage::ReplicationReadSuccess(success))
    }

    pub fn replication_read_failure(&self, failure: ReplicationReadFailure) -> Result<()> {
        self.tell(NotificationMessage::ReplicationReadFailure(failure))
    }

    pub fn replication_write(&self, write: ReplicationWrite<P>) -> Result<()> {
        self.tell(NotificationMessage::ReplicationWrite(write))
    }
}

/// Spawn a notification channel on the current tokio runtime.
///
/// The task ends once every [`NotificationChannelRef`] is dropped.
pub fn spawn_notification_channel<P>(
    settings: NotificationSettings,
) -> (NotificationChannelRef<P>, JoinHandle<()>)
where
    P: Send + Sync + 'static,
{
    let (handle, mut mailbox) = ActorRef::channel();
    let task = tokio::spawn(async move {
        let mut channel = NotificationChannel::<P, DueHandle>::new(settings);
        info!("notification channel started");
        while let Some(message) = mailbox.recv().await {
            let now = tokio::time::Instant::now().into_std();
            match message {
                NotificationMessage::Updated(events) => {
                    let notified = channel.updated(&events, now);
                    debug!(events = events.len(), notified = notified.len(), "log updated");
                }
                NotificationMessage::ReplicationRead(read) => channel.replication_read(read, now),
                NotificationMessage::ReplicationReadSuccess(success) => {
                    channel.replication_read_success(&success)
                }
                NotificationMessage::ReplicationReadFailure(failure) => {
                    channel.replication_read_failure(&failure)
                }
                NotificationMessage::ReplicationWrite(write) => channel.replication_write(&write),
            }
        }
        info!("notification channel stopped");
    });
    (NotificationChannelRef { handle }, task)
}
