//! Replication availability detection.
//!
//! A [`FailureDetector`] watches one `(endpoint, journal)` replication link.
//! The link owner reports every successful exchange and every failure; the
//! detector publishes [`AvailabilityEvent::Available`] at most once per
//! detection limit, and [`AvailabilityEvent::Unavailable`] whenever a whole
//! detection limit passes without a success.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetectorSettings {
    pub detection_limit: Duration,
}

impl Default for FailureDetectorSettings {
    fn default() -> Self {
        Self {
            detection_limit: Duration::from_secs(60),
        }
    }
}

/// Published availability change of a replication link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AvailabilityEvent {
    Available {
        endpoint_id: String,
        journal_id: String,
    },
    Unavailable {
        endpoint_id: String,
        journal_id: String,
        /// Failures reported since the last availability, oldest first.
        causes: Vec<String>,
    },
}

enum Signal {
    Available,
    Failed(String),
}

/// Handle to a running failure detector. The detector stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct FailureDetector {
    signals: mpsc::UnboundedSender<Signal>,
    events: broadcast::Sender<AvailabilityEvent>,
}

impl FailureDetector {
    pub fn spawn(
        endpoint_id: impl Into<String>,
        journal_id: impl Into<String>,
        settings: FailureDetectorSettings,
    ) -> (Self, JoinHandle<()>) {
        let (signals, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(100);
        let task = tokio::spawn(run(
            endpoint_id.into(),
            journal_id.into(),
            settings.detection_limit,
            rx,
            events.clone(),
        ));
        (Self { signals, events }, task)
    }

    /// A replication exchange succeeded.
    pub fn availability_detected(&self) {
        let _ = self.signals.send(Signal::Available);
    }

    /// A replication exchange failed.
    pub fn failure_detected(&self, cause: impl Into<String>) {
        let _ = self.signals.send(Signal::Failed(cause.into()));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AvailabilityEvent> {
        self.events.subscribe()
    }
}

async fn run(
    endpoint_id: String,
    journal_id: String,
    limit: Duration,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    events: broadcast::Sender<AvailabilityEvent>,
) {
    let mut causes: Vec<String> = Vec::new();
    let mut last_reported: Option<Instant> = None;
    let deadline = sleep_until(Instant::now() + limit);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Some(Signal::Available) => {
                    let now = Instant::now();
                    let due = last_reported.map_or(true, |last| now.duration_since(last) >= limit);
                    if due {
                        debug!(endpoint = %endpoint_id, journal = %journal_id, "replication available");
                        let _ = events.send(AvailabilityEvent::Available {
                            endpoint_id: endpoint_id.clone(),
                            journal_id: journal_id.clone(),
                        });
                        last_reported = Some(now);
                    }
                    deadline.as_mut().reset(now + limit);
                    causes.clear();
                }
                Some(Signal::Failed(cause)) => causes.push(cause),
                None => break,
            },
            _ = &mut deadline => {
                warn!(
                    endpoint = %endpoint_id,
                    journal = %journal_id,
                    limit = ?limit,
                    causes = causes.len(),
                    "replication failure detection limit reached"
                );
                let _ = events.send(AvailabilityEvent::Unavailable {
                    endpoint_id: endpoint_id.clone(),
                    journal_id: journal_id.clone(),
                    causes: std::mem::take(&mut causes),
                });
                deadline.as_mut().reset(Instant::now() + limit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> AvailabilityEvent {
        AvailabilityEvent::Available {
            endpoint_id: "ep".to_string(),
            journal_id: "log".to_string(),
        }
    }

    fn settings() -> FailureDetectorSettings {
        FailureDetectorSettings {
            detection_limit: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_published_once_per_limit() {
        let (detector, _task) = FailureDetector::spawn("ep", "log", settings());
        let mut events = detector.subscribe();

        detector.availability_detected();
        assert_eq!(events.recv().await.unwrap(), available());

        tokio::time::advance(Duration::from_secs(3)).await;
        detector.availability_detected();
        tokio::time::advance(Duration::from_secs(3)).await;
        detector.availability_detected();
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(5)).await;
        detector.availability_detected();
        assert_eq!(events.recv().await.unwrap(), available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_carries_causes_then_rearms() {
        let (detector, _task) = FailureDetector::spawn("ep", "log", settings());
        let mut events = detector.subscribe();

        detector.failure_detected("connection refused");
        detector.failure_detected("timeout");

        assert_eq!(
            events.recv().await.unwrap(),
            AvailabilityEvent::Unavailable {
                endpoint_id: "ep".to_string(),
                journal_id: "log".to_string(),
                causes: vec!["connection refused".to_string(), "timeout".to_string()],
            }
        );

        // no new failures: the next period reports an empty cause list
        assert_eq!(
            events.recv().await.unwrap(),
            AvailabilityEvent::Unavailable {
                endpoint_id: "ep".to_string(),
                journal_id: "log".to_string(),
                causes: vec![],
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_availability_resets_detection() {
        let (detector, _task) = FailureDetector::spawn("ep", "log", settings());
        let mut events = detector.subscribe();

        detector.failure_detected("flaky");
        tokio::time::advance(Duration::from_secs(8)).await;
        detector.availability_detected();
        assert_eq!(events.recv().await.unwrap(), available());

        // 8s + 8s > 10s, but availability pushed the deadline out
        tokio::time::advance(Duration::from_secs(8)).await;
        tokio::task::yield_now().await;
        assert!(events.try_recv().is_err());
    }
}
