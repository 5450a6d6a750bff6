//! PlayerActor: turns a stream of slot choices into marker toggles and claims.
//!
//! ```text
//! Idle ─► AwaitingChoice ─► Applying ─┬─────────────────────────► Idle
//!                                     └─► AwaitingVerdict ─► (Frozen) ─► Idle
//! ```
//!
//! Choices arrive on a bounded queue. A producer that fills it is suspended
//! until the player catches up, so no choice is ever dropped. While the
//! player waits for a verdict or sits out a freeze, its queue keeps filling
//! but nothing is processed.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::board::{Board, Toggle, MAX_MARKERS};
use crate::config::SessionConfig;
use crate::display::{millis, Display};
use crate::roster::{ActorId, FreezeState, Roster};
use crate::validation::{QueueError, ValidationQueue, Verdict};

/// The player no longer accepts choices (its loop has exited).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("player {0} no longer accepts choices")]
pub struct InputClosed(pub ActorId);

/// Producer side of a player's choice queue.
///
/// Cloneable; every clone feeds the same queue.
#[derive(Debug, Clone)]
pub struct ChoiceSender {
    actor: ActorId,
    tx: mpsc::Sender<usize>,
}

impl ChoiceSender {
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Queue a slot choice, waiting while the queue is full.
    pub async fn send(&self, slot: usize) -> Result<(), InputClosed> {
        self.tx.send(slot).await.map_err(|_| InputClosed(self.actor))
    }

    /// Queue a slot choice from a plain OS thread (keyboard readers and the like).
    ///
    /// Blocks the calling thread while the queue is full. Must not be called
    /// from inside the async runtime.
    pub fn blocking_send(&self, slot: usize) -> Result<(), InputClosed> {
        self.tx.blocking_send(slot).map_err(|_| InputClosed(self.actor))
    }
}

/// Everything a player needs from the rest of the session.
#[derive(Clone)]
pub struct PlayerContext {
    pub config: Arc<SessionConfig>,
    pub board: Arc<Board>,
    pub queue: Arc<ValidationQueue>,
    pub roster: Arc<Roster>,
    pub display: Arc<dyn Display>,
    pub shutdown: CancellationToken,
}

/// One participant of the session.
pub struct PlayerActor {
    id: ActorId,
    ctx: PlayerContext,
    choices: mpsc::Receiver<usize>,
}

impl std::fmt::Debug for PlayerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerActor").field("id", &self.id).finish()
    }
}

impl PlayerActor {
    /// Create a player and the sender that feeds its choice queue.
    pub fn new(id: ActorId, ctx: PlayerContext) -> (Self, ChoiceSender) {
        let (tx, rx) = mpsc::channel(ctx.config.choice_queue_capacity);
        let actor = Self {
            id,
            ctx,
            choices: rx,
        };
        (actor, ChoiceSender { actor: id, tx })
    }

    /// Run the player on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Main loop: take one choice at a time until shutdown.
    pub async fn run(mut self) {
        info!(player = self.id, "Player starting");

        loop {
            let slot = tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => break,
                choice = self.choices.recv() => match choice {
                    Some(slot) => slot,
                    None => {
                        debug!(player = self.id, "Choice queue closed");
                        break;
                    }
                },
            };

            if self.apply_choice(slot).await.is_break() {
                break;
            }
        }

        self.ctx.roster.thaw(self.id);
        info!(player = self.id, "Player terminated");
    }

    async fn apply_choice(&mut self, slot: usize) -> ControlFlow<()> {
        match self.ctx.board.toggle_marker(self.id, slot).await {
            Toggle::Placed { count } if count == MAX_MARKERS => self.claim().await,
            Toggle::Placed { .. } | Toggle::Removed { .. } => ControlFlow::Continue(()),
            Toggle::SlotEmpty => {
                trace!(player = self.id, slot, "Slot is empty, choice skipped");
                ControlFlow::Continue(())
            }
            Toggle::LimitReached => {
                trace!(player = self.id, slot, "Marker limit reached, choice skipped");
                ControlFlow::Continue(())
            }
            Toggle::NoSuchSlot | Toggle::UnknownActor => {
                warn!(player = self.id, slot, "Choice outside the board, skipped");
                ControlFlow::Continue(())
            }
        }
    }

    /// Submit the current three markers and suspend until the verdict arrives.
    async fn claim(&mut self) -> ControlFlow<()> {
        let verdict_rx = match self.ctx.queue.submit(self.id).await {
            Ok(rx) => rx,
            Err(QueueError::Closed) => {
                debug!(player = self.id, "Validation closed, leaving");
                return ControlFlow::Break(());
            }
            Err(err @ QueueError::AlreadyQueued(_)) => {
                warn!(player = self.id, error = %err, "Claim not submitted");
                return ControlFlow::Continue(());
            }
        };

        // a verdict already delivered wins over a shutdown that followed it
        let verdict = tokio::select! {
            biased;
            verdict = verdict_rx => match verdict {
                Ok(verdict) => verdict,
                Err(_) => {
                    debug!(player = self.id, "Arbiter gone before verdict");
                    return ControlFlow::Break(());
                }
            },
            _ = self.ctx.shutdown.cancelled() => {
                self.ctx.queue.withdraw(self.id).await;
                debug!(player = self.id, "Terminated while awaiting verdict");
                return ControlFlow::Break(());
            }
        };

        debug!(player = self.id, %verdict, "Verdict received");
        match verdict {
            Verdict::Correct => {
                let score = self.ctx.roster.score(self.id).unwrap_or_default();
                self.ctx.display.set_score(self.id, score);
                self.freeze(self.ctx.config.point_freeze()).await
            }
            Verdict::Incorrect => self.freeze(self.ctx.config.penalty_freeze()).await,
            Verdict::Requeue => ControlFlow::Continue(()),
        }
    }

    /// Sit out a freeze, reporting the remaining time as it counts down.
    ///
    /// The deadline is the one the arbiter recorded in the roster; `fallback`
    /// is only used when no deadline was recorded.
    async fn freeze(&self, fallback: Duration) -> ControlFlow<()> {
        let until = match self.ctx.roster.freeze_state(self.id) {
            Some(FreezeState::FrozenUntil(until)) => until,
            _ => {
                let until = Instant::now() + fallback;
                self.ctx.roster.freeze_until(self.id, until);
                until
            }
        };
        let refresh = self.ctx.config.freeze_refresh();

        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.ctx.display.set_freeze(self.id, millis(remaining));

            tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => {
                    debug!(player = self.id, "Terminated while frozen");
                    return ControlFlow::Break(());
                }
                _ = tokio::time::sleep(remaining.min(refresh)) => {}
            }
        }

        self.ctx.display.set_freeze(self.id, 0);
        self.ctx.roster.thaw(self.id);
        ControlFlow::Continue(())
    }
}
