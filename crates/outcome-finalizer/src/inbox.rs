//! Single-consumer inbox feeding the coordinator.
//!
//! Notification adapters (embedded game, host callback, secondary relay,
//! revive flow) never act on an outcome themselves; each holds an
//! [`InboxSender`] tagged with its channel and forwards what it receives.
//! One consumer, [`OutcomeInbox::run`], hands every message to the
//! [`FinalizationCoordinator`].
//!
//! Revive notifications are applied inline so they take effect before any
//! outcome received after them. Outcomes run as tracked tasks: a ledger write
//! waiting on wallet approval must not hold back the best-effort persistence
//! of outcomes behind it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::coordinator::{FinalizationCoordinator, ProcessingResult};
use crate::error::FinalizeError;
use crate::outcome::{OutcomeEvent, OutcomeSource};
use crate::revive::ReviveNotification;

type ReplySender = oneshot::Sender<ProcessingResult>;

enum Dispatch {
    Outcome {
        event: OutcomeEvent,
        reply: Option<ReplySender>,
    },
    Raw {
        payload: Value,
        source: OutcomeSource,
        reply: Option<ReplySender>,
    },
    Revive(ReviveNotification),
}

/// Sending half held by one notification channel.
#[derive(Clone)]
pub struct InboxSender {
    tx: mpsc::Sender<Dispatch>,
    source: OutcomeSource,
}

impl InboxSender {
    /// A sender reporting on behalf of another channel.
    pub fn with_source(&self, source: OutcomeSource) -> Self {
        Self {
            tx: self.tx.clone(),
            source,
        }
    }

    pub fn source(&self) -> OutcomeSource {
        self.source
    }

    /// Forward an outcome. The event is stamped with this sender's channel.
    pub async fn report(&self, event: OutcomeEvent) -> Result<(), FinalizeError> {
        self.send(Dispatch::Outcome {
            event: event.with_source(self.source),
            reply: None,
        })
        .await
    }

    /// Forward an outcome and wait for the routing decision.
    pub async fn report_and_wait(
        &self,
        event: OutcomeEvent,
    ) -> Result<ProcessingResult, FinalizeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Dispatch::Outcome {
            event: event.with_source(self.source),
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| FinalizeError::InboxClosed)
    }

    /// Forward an untyped payload; it is parsed by the consumer.
    pub async fn report_raw(&self, payload: Value) -> Result<(), FinalizeError> {
        self.send(Dispatch::Raw {
            payload,
            source: self.source,
            reply: None,
        })
        .await
    }

    /// Forward an untyped payload and wait for the routing decision.
    pub async fn report_raw_and_wait(
        &self,
        payload: Value,
    ) -> Result<ProcessingResult, FinalizeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Dispatch::Raw {
            payload,
            source: self.source,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| FinalizeError::InboxClosed)
    }

    /// Forward a revive purchase.
    pub async fn revive(&self, notification: ReviveNotification) -> Result<(), FinalizeError> {
        self.send(Dispatch::Revive(notification)).await
    }

    async fn send(&self, dispatch: Dispatch) -> Result<(), FinalizeError> {
        self.tx
            .send(dispatch)
            .await
            .map_err(|_| FinalizeError::InboxClosed)
    }
}

/// Receiving half, consumed by [`run`](Self::run).
pub struct OutcomeInbox {
    rx: mpsc::Receiver<Dispatch>,
}

impl OutcomeInbox {
    /// Create an inbox. The returned sender reports as the embedded game;
    /// derive senders for other channels with [`InboxSender::with_source`].
    pub fn channel(capacity: usize) -> (InboxSender, OutcomeInbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            InboxSender {
                tx,
                source: OutcomeSource::EmbeddedGame,
            },
            OutcomeInbox { rx },
        )
    }

    /// Spawn the consumer onto the current runtime.
    pub fn spawn(
        self,
        coordinator: Arc<FinalizationCoordinator>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(coordinator, cancel))
    }

    /// Consume notifications until cancelled or every sender is dropped.
    ///
    /// On exit, messages already queued are still dispatched and in-flight
    /// outcomes are awaited; each is bounded by the lease ttl.
    pub async fn run(mut self, coordinator: Arc<FinalizationCoordinator>, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "outcome task failed");
                    }
                }
                msg = self.rx.recv() => match msg {
                    Some(dispatch) => Self::dispatch(&coordinator, &mut tasks, dispatch),
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Ok(dispatch) = self.rx.try_recv() {
            Self::dispatch(&coordinator, &mut tasks, dispatch);
        }
        let in_flight = tasks.len();
        if in_flight > 0 {
            tracing::debug!(in_flight, "draining in-flight outcomes");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "outcome task failed");
            }
        }
        tracing::debug!("outcome inbox stopped");
    }

    fn dispatch(
        coordinator: &Arc<FinalizationCoordinator>,
        tasks: &mut JoinSet<()>,
        dispatch: Dispatch,
    ) {
        match dispatch {
            Dispatch::Revive(notification) => {
                coordinator.handle_revive(&notification);
            }
            Dispatch::Outcome { event, reply } => {
                let coordinator = Arc::clone(coordinator);
                tasks.spawn(async move {
                    let result = coordinator.handle_outcome(&event).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                });
            }
            Dispatch::Raw {
                payload,
                source,
                reply,
            } => {
                let coordinator = Arc::clone(coordinator);
                tasks.spawn(async move {
                    let result = coordinator.handle_raw(&payload, source).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SkipReason;
    use crate::testing::TestHarness;
    use serde_json::json;

    #[tokio::test]
    async fn report_and_wait_returns_decision() {
        let h = TestHarness::new();
        let (sender, inbox) = OutcomeInbox::channel(8);
        let cancel = CancellationToken::new();
        let consumer = inbox.spawn(h.coordinator.clone(), cancel.clone());

        let result = sender
            .report_and_wait(OutcomeEvent::new("run-1", 120, 8))
            .await
            .unwrap();
        assert!(result.is_submitted());

        let relay = sender.with_source(OutcomeSource::SecondaryRelay);
        assert_eq!(relay.source(), OutcomeSource::SecondaryRelay);
        let again = relay
            .report_and_wait(OutcomeEvent::new("run-1#relay", 120, 8))
            .await
            .unwrap();
        assert_eq!(again, ProcessingResult::Skipped(SkipReason::Terminal));

        cancel.cancel();
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn raw_payloads_are_parsed_by_consumer() {
        let h = TestHarness::new();
        let (sender, inbox) = OutcomeInbox::channel(8);
        let consumer = inbox.spawn(h.coordinator.clone(), CancellationToken::new());

        let host = sender.with_source(OutcomeSource::HostCallback);
        let bad = host
            .report_raw_and_wait(json!({"score": 10}))
            .await
            .unwrap();
        assert_eq!(bad, ProcessingResult::Skipped(SkipReason::Malformed));

        let good = host
            .report_raw_and_wait(json!({"sessionId": "run-2", "score": 60, "jumps": 6}))
            .await
            .unwrap();
        assert!(good.is_submitted());

        drop(sender);
        drop(host);
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn revive_is_applied_before_later_outcomes() {
        let h = TestHarness::new();
        let (sender, inbox) = OutcomeInbox::channel(8);
        let consumer = inbox.spawn(h.coordinator.clone(), CancellationToken::new());

        sender
            .revive(ReviveNotification {
                session_id: "run-1".into(),
                prior_jumps: 5,
                prior_score: Some(100),
            })
            .await
            .unwrap();
        let pre = sender
            .report_and_wait(OutcomeEvent::new("run-1", 100, 5))
            .await
            .unwrap();
        assert_eq!(pre, ProcessingResult::Skipped(SkipReason::PreRevive));

        drop(sender);
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn queued_messages_are_drained_on_cancel() {
        let h = TestHarness::new();
        let (sender, inbox) = OutcomeInbox::channel(8);
        sender.report(OutcomeEvent::new("run-1", 120, 8)).await.unwrap();
        sender.report(OutcomeEvent::new("run-1", 120, 8)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        inbox.run(h.coordinator.clone(), cancel).await;

        assert!(h.coordinator.is_terminal("run-1"));
        assert_eq!(h.ledger.submissions().len(), 1);
        assert!(matches!(
            sender.report(OutcomeEvent::new("run-2", 1, 1)).await,
            Err(FinalizeError::InboxClosed)
        ));
    }
}
