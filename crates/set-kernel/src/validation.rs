//! Validation queue: the rendezvous between claiming players and the arbiter.
//!
//! A player holding three markers submits a request and suspends on the
//! receiving half of a oneshot channel. The arbiter pops requests in
//! submission order and writes exactly one verdict per request.
//!
//! ```text
//! Player ──submit(actor)──► [ A | B | C ] ──pop()──► Arbiter
//!   ▲                         FIFO, Notify              │
//!   └──────────── oneshot<Verdict> ◄────────────────────┘
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::debug;

use crate::roster::ActorId;

/// The arbiter's answer to a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The three cards formed a set and were removed
    Correct,
    /// The three cards did not form a set
    Incorrect,
    /// The claim changed before it was judged; released without effect
    Requeue,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Verdict::Correct => "correct",
            Verdict::Incorrect => "incorrect",
            Verdict::Requeue => "requeue",
        };
        f.write_str(name)
    }
}

/// A queued claim and the cell its verdict is written to.
#[derive(Debug)]
pub struct ValidationRequest {
    pub actor: ActorId,
    verdict: oneshot::Sender<Verdict>,
}

impl ValidationRequest {
    /// Whether the submitting player has stopped waiting.
    pub fn is_withdrawn(&self) -> bool {
        self.verdict.is_closed()
    }

    /// Write the verdict, waking the submitting player.
    ///
    /// Returns `false` if the player withdrew in the meantime.
    pub fn resolve(self, verdict: Verdict) -> bool {
        self.verdict.send(verdict).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("validation queue is closed")]
    Closed,
    #[error("player {0} already has a pending validation request")]
    AlreadyQueued(ActorId),
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<ValidationRequest>,
    closed: bool,
}

/// FIFO queue of validation requests.
#[derive(Debug, Default)]
pub struct ValidationQueue {
    state: Mutex<QueueState>,
    wake: Notify,
}

impl ValidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a claim for `actor` and wake the arbiter.
    ///
    /// The returned receiver yields the verdict. Dropping it withdraws the
    /// claim.
    pub async fn submit(&self, actor: ActorId) -> Result<oneshot::Receiver<Verdict>, QueueError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed);
        }
        if state.pending.iter().any(|req| req.actor == actor) {
            return Err(QueueError::AlreadyQueued(actor));
        }

        let (tx, rx) = oneshot::channel();
        state.pending.push_back(ValidationRequest { actor, verdict: tx });
        debug!(player = actor, depth = state.pending.len(), "Validation request queued");
        drop(state);

        // notify_one keeps a permit when the arbiter is not waiting yet
        self.wake.notify_one();
        Ok(rx)
    }

    /// Remove `actor`'s pending request, if any.
    pub async fn withdraw(&self, actor: ActorId) -> bool {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|req| req.actor != actor);
        let withdrawn = state.pending.len() != before;
        if withdrawn {
            debug!(player = actor, "Validation request withdrawn");
        }
        withdrawn
    }

    /// Next request in submission order.
    pub async fn pop(&self) -> Option<ValidationRequest> {
        self.state.lock().await.pending.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until a request is submitted (or a stored wake-up is consumed).
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Refuse new requests and release every queued one as [`Verdict::Requeue`].
    ///
    /// Returns the number of requests released.
    pub async fn close(&self) -> usize {
        let mut state = self.state.lock().await;
        state.closed = true;
        let mut released = 0;
        while let Some(request) = state.pending.pop_front() {
            if request.resolve(Verdict::Requeue) {
                released += 1;
            }
        }
        released
    }
}
