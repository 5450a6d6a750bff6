//! Arbiter: owns the deck cycle, the turn timer and claim validation.
//!
//! The arbiter is the only holder of the board's [`DealerRights`], so it is
//! the only party that moves cards. Its main cycle:
//!
//! ```text
//! while cards in play still contain a set and no shutdown:
//!     refill board from deck
//!     turn loop:  drain claims ─► timer expired? ─► suspend until
//!                 (claim queued | countdown refresh | deadline | shutdown)
//!     reset countdown display
//!     reshuffle (every board card back to the deck)
//! close validation queue, announce winners, shut every player down
//! ```
//!
//! A correct claim expires the turn at once, so the board is reshuffled
//! right after the queue has been drained.

use std::sync::Arc;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::board::{Board, ClaimJudgement, DealerRights};
use crate::card::{has_set, MatchRule};
use crate::config::SessionConfig;
use crate::display::{millis, Display};
use crate::roster::{ActorId, Roster};
use crate::validation::{ValidationQueue, ValidationRequest, Verdict};

/// Counters collected over a session.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterStats {
    /// Turns started (one per board refill)
    pub turns: usize,
    /// Turns that ended because the timer ran out
    pub timeouts: usize,
    /// Times the board was cleared back into the deck
    pub reshuffles: usize,
    pub correct: usize,
    pub incorrect: usize,
    /// Claims that changed before they were judged
    pub requeued: usize,
    /// Claims whose player left before the verdict
    pub withdrawn: usize,
}

/// What the arbiter hands back when the session is over.
#[derive(Debug, Clone)]
pub struct ArbiterOutcome {
    pub winners: Vec<ActorId>,
    pub stats: ArbiterStats,
}

/// Everything the arbiter needs from the rest of the session.
pub struct ArbiterContext {
    pub config: Arc<SessionConfig>,
    pub rule: Arc<dyn MatchRule>,
    pub board: Arc<Board>,
    pub rights: DealerRights,
    pub queue: Arc<ValidationQueue>,
    pub roster: Arc<Roster>,
    pub display: Arc<dyn Display>,
    pub shutdown: CancellationToken,
}

/// The dealer of the session.
pub struct Arbiter {
    ctx: ArbiterContext,
    rng: ChaCha8Rng,
    /// When the current turn times out
    deadline: Instant,
    /// Set when a correct claim expired the turn early
    reshuffle_requested: bool,
    stats: ArbiterStats,
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("deadline", &self.deadline)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Arbiter {
    pub fn new(ctx: ArbiterContext, rng: ChaCha8Rng) -> Self {
        Self {
            ctx,
            rng,
            deadline: Instant::now(),
            reshuffle_requested: false,
            stats: ArbiterStats::default(),
        }
    }

    /// Run the arbiter on its own task.
    pub fn spawn(self) -> JoinHandle<ArbiterOutcome> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> ArbiterOutcome {
        info!(
            rule = self.ctx.rule.name(),
            table_size = self.ctx.board.table_size(),
            players = self.ctx.roster.len(),
            "Arbiter starting"
        );

        while !self.should_finish().await {
            self.place_cards_on_table().await;
            self.turn_loop().await;
            self.update_countdown(true);
            self.remove_all_cards_from_table().await;
        }

        let released = self.ctx.queue.close().await;
        if released > 0 {
            debug!(released, "Released claims still queued at session end");
        }
        self.stats.requeued += released;

        let winners = self.announce_winners();
        self.ctx.shutdown.cancel();

        info!(
            winners = ?winners,
            turns = self.stats.turns,
            correct = self.stats.correct,
            incorrect = self.stats.incorrect,
            "Arbiter terminated"
        );
        ArbiterOutcome {
            winners,
            stats: self.stats,
        }
    }

    /// Shutdown was requested, or no set exists among the cards still in play.
    async fn should_finish(&self) -> bool {
        if self.ctx.shutdown.is_cancelled() {
            return true;
        }
        let remaining = self.ctx.board.remaining_cards().await;
        if has_set(self.ctx.rule.as_ref(), &remaining) {
            return false;
        }
        info!(cards_left = remaining.len(), "No set left in play, ending session");
        true
    }

    async fn place_cards_on_table(&mut self) {
        let placed = self.ctx.board.refill(&self.ctx.rights, &mut self.rng).await;
        let deck_left = self.ctx.board.deck_len().await;
        debug!(placed = placed.len(), deck_left, "Board refilled");
    }

    /// Run one turn: validate claims until the timer expires or shutdown.
    async fn turn_loop(&mut self) {
        self.stats.turns += 1;
        self.reshuffle_requested = false;
        self.deadline = Instant::now() + self.ctx.config.turn_timeout();

        loop {
            self.drain_claims().await;

            let now = Instant::now();
            if self.ctx.shutdown.is_cancelled() {
                debug!("Turn interrupted by shutdown");
                return;
            }
            if now >= self.deadline {
                break;
            }
            self.update_countdown(false);

            let wake_at = self.deadline.min(now + self.ctx.config.countdown_refresh());
            tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => {}
                _ = self.ctx.queue.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }

        if !self.reshuffle_requested {
            self.stats.timeouts += 1;
            info!(turn = self.stats.turns, "Turn timed out, reshuffling");
        }
    }

    /// Judge every queued claim, in submission order, until the queue is empty.
    async fn drain_claims(&mut self) {
        while let Some(request) = self.ctx.queue.pop().await {
            self.process_claim(request).await;
        }
    }

    async fn process_claim(&mut self, request: ValidationRequest) {
        let actor = request.actor;
        if request.is_withdrawn() {
            self.stats.withdrawn += 1;
            debug!(player = actor, "Claim withdrawn before judging");
            return;
        }

        let judgement = self
            .ctx
            .board
            .judge_claim(&self.ctx.rights, actor, self.ctx.rule.as_ref())
            .await;

        let verdict = match judgement {
            ClaimJudgement::Stale { markers } => {
                self.stats.requeued += 1;
                debug!(player = actor, markers, "Claim changed before judging, releasing");
                Verdict::Requeue
            }
            ClaimJudgement::Rejected { cards } => {
                self.stats.incorrect += 1;
                self.ctx
                    .roster
                    .freeze_until(actor, Instant::now() + self.ctx.config.penalty_freeze());
                info!(player = actor, cards = ?cards, "Claim rejected");
                Verdict::Incorrect
            }
            ClaimJudgement::Accepted {
                cards,
                slots,
                released,
            } => {
                self.stats.correct += 1;
                let score = self.ctx.roster.award_point(actor);
                self.ctx
                    .roster
                    .freeze_until(actor, Instant::now() + self.ctx.config.point_freeze());
                info!(
                    player = actor,
                    cards = ?cards,
                    slots = ?slots,
                    released = ?released,
                    score,
                    "Set claimed"
                );
                // expire the turn so the board is reshuffled once the queue is drained
                self.deadline = Instant::now();
                self.reshuffle_requested = true;
                Verdict::Correct
            }
        };

        if !request.resolve(verdict) {
            self.stats.withdrawn += 1;
            self.ctx.roster.thaw(actor);
            debug!(player = actor, %verdict, "Player left before the verdict arrived");
        }
    }

    fn update_countdown(&self, reset: bool) {
        if reset {
            self.ctx
                .display
                .set_countdown(self.ctx.config.turn_timeout_ms, false);
            return;
        }
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let warning = remaining <= self.ctx.config.turn_timeout_warning();
        self.ctx.display.set_countdown(millis(remaining), warning);
    }

    async fn remove_all_cards_from_table(&mut self) {
        let returned = self.ctx.board.clear(&self.ctx.rights).await;
        if !returned.is_empty() {
            self.stats.reshuffles += 1;
            debug!(returned = returned.len(), "Board reshuffled into the deck");
        }
    }

    fn announce_winners(&self) -> Vec<ActorId> {
        let winners = self.ctx.roster.winners();
        self.ctx.display.announce_winners(&winners);
        winners
    }
}
