//! Scripted in-process relay (for testing and offline simulation).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use sigorder_message::SignedOrderEnvelope;

use crate::{PollStatus, RelayApi, SubmissionResult};

/// A relay whose answers are fixed up front.
///
/// Poll answers are consumed in order; once the script runs out every
/// further poll reports `Pending`.
pub struct ScriptedRelay {
    accept: bool,
    reject_status: u16,
    reply_message: Option<String>,
    polls: Mutex<VecDeque<PollStatus>>,
    poll_interval: Duration,
    healthy: AtomicBool,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    submitted: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedRelay {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            reject_status: 0,
            reply_message: Some("ok".into()),
            polls: Mutex::new(VecDeque::new()),
            poll_interval: Duration::from_secs(1),
            healthy: AtomicBool::new(true),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(status: u16, message: &str) -> Self {
        Self {
            accept: false,
            reject_status: status,
            reply_message: Some(message.to_string()),
            ..Self::accepting()
        }
    }

    pub fn with_polls(self, polls: Vec<PollStatus>) -> Self {
        *lock(&self.polls) = polls.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    /// Message hex of every envelope submitted so far.
    pub fn submitted_messages(&self) -> Vec<String> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl RelayApi for ScriptedRelay {
    async fn submit(&self, envelope: &SignedOrderEnvelope) -> SubmissionResult {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.submitted).push(envelope.message_hex.clone());
        SubmissionResult {
            success: self.accept,
            hash: envelope.hash(),
            message: self.reply_message.clone(),
            status: Some(if self.accept { 200 } else { self.reject_status }),
        }
    }

    async fn poll_status(&self, _hash: &str) -> PollStatus {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.polls).pop_front().unwrap_or(PollStatus::Pending)
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
