//! Lifecycle events and caller cancellation.
//!
//! One submission publishes into a `watch` channel holding the whole
//! lifecycle so far, so any number of subscribers (including late ones)
//! observe the same `Sent` and the same terminal event.

use futures_util::stream::{self, Stream};
use tokio::sync::watch;

use crate::ConfirmationOutcome;

#[derive(Debug, Clone, Default)]
struct Lifecycle {
    sent: Option<ConfirmationOutcome>,
    terminal: Option<ConfirmationOutcome>,
}

/// Publishing side, owned by the task running the protocol.
pub(crate) struct EventPublisher {
    tx: watch::Sender<Lifecycle>,
}

impl EventPublisher {
    pub(crate) fn sent(&self, event: ConfirmationOutcome) {
        self.tx.send_modify(|state| {
            if state.sent.is_none() && state.terminal.is_none() {
                state.sent = Some(event);
            }
        });
    }

    /// Publish the terminal event. Later calls are ignored.
    pub(crate) fn finish(&self, outcome: ConfirmationOutcome) {
        self.tx.send_modify(|state| {
            if state.terminal.is_none() {
                state.terminal = Some(outcome);
            }
        });
    }
}

/// Fires a [`CancelSignal`].
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving side of a caller cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn pair() -> (CancelTrigger, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelTrigger { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the trigger is dropped
    /// without firing.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Handle on one in-flight submission.
///
/// Dropping the handle does not stop the protocol; use [`cancel`](Self::cancel).
pub struct ConfirmationHandle {
    hash: String,
    events: watch::Receiver<Lifecycle>,
    cancel: CancelTrigger,
}

pub(crate) fn lifecycle_channel(hash: String) -> (EventPublisher, CancelSignal, ConfirmationHandle) {
    let (tx, events) = watch::channel(Lifecycle::default());
    let (cancel, signal) = CancelSignal::pair();
    (
        EventPublisher { tx },
        signal,
        ConfirmationHandle { hash, events, cancel },
    )
}

impl ConfirmationHandle {
    /// Relay hash of the submission, known before it is sent.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// A new subscriber starting from the beginning of the lifecycle.
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            hash: self.hash.clone(),
            events: self.events.clone(),
            sent_delivered: false,
            done: false,
        }
    }

    /// Abandon the order. The race resolves as `Expired` and tears down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The terminal event, once published.
    pub fn try_outcome(&self) -> Option<ConfirmationOutcome> {
        self.events.borrow().terminal.clone()
    }

    /// Wait for the terminal event.
    pub async fn outcome(&self) -> ConfirmationOutcome {
        let mut events = self.events.clone();
        let result = events
            .wait_for(|state| state.terminal.is_some())
            .await
            .ok()
            .and_then(|state| state.terminal.clone());
        result.unwrap_or_else(|| abandoned(&self.hash))
    }
}

fn abandoned(hash: &str) -> ConfirmationOutcome {
    ConfirmationOutcome::Errored {
        hash: hash.to_string(),
        reason: "confirmation task ended without an outcome".to_string(),
    }
}

/// Ordered lifecycle events for one subscriber: optional `Sent`, exactly
/// one terminal event, then the end of the stream.
pub struct EventStream {
    hash: String,
    events: watch::Receiver<Lifecycle>,
    sent_delivered: bool,
    done: bool,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<ConfirmationOutcome> {
        if self.done {
            return None;
        }
        loop {
            let state = self.events.borrow_and_update().clone();
            if !self.sent_delivered {
                if let Some(sent) = state.sent {
                    self.sent_delivered = true;
                    return Some(sent);
                }
            }
            if let Some(terminal) = state.terminal {
                self.sent_delivered = true;
                self.done = true;
                return Some(terminal);
            }
            if self.events.changed().await.is_err() {
                // Publisher gone without a terminal event.
                self.done = true;
                return Some(abandoned(&self.hash));
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ConfirmationOutcome> {
        stream::unfold(self, |mut events| async move {
            let event = events.next().await?;
            Some((event, events))
        })
    }
}
