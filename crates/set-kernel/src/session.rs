//! Session: wires the board, the players and the arbiter together.
//!
//! ## Usage
//!
//! ```ignore
//! use set_kernel::{PlayerKind, SessionBuilder, SessionConfig};
//!
//! let session = SessionBuilder::new(SessionConfig::default())
//!     .players(2, PlayerKind::Human)
//!     .spawn()?;
//!
//! session.press(0, 4).await?;
//! // ...
//! session.terminate();
//! let report = session.join().await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::actors::{
    Arbiter, ArbiterContext, ArbiterOutcome, ArbiterStats, ChoiceSender, InputClosed, PlayerActor,
    PlayerContext,
};
use crate::board::Board;
use crate::card::{Card, MatchRule};
use crate::config::SessionConfig;
use crate::display::{Display, TracingDisplay};
use crate::roster::{ActorId, PlayerKind, Roster};
use crate::validation::ValidationQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown player {0}")]
    UnknownActor(ActorId),
    #[error(transparent)]
    Input(#[from] InputClosed),
}

/// Final result of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    /// Every player holding the maximal score
    pub winners: Vec<ActorId>,
    /// Score per player, ordered by id
    pub scores: Vec<(ActorId, u32)>,
    pub stats: ArbiterStats,
}

/// Builder for a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    rule: Option<Arc<dyn MatchRule>>,
    display: Arc<dyn Display>,
    kinds: Vec<PlayerKind>,
    deck: Option<Vec<Card>>,
    seed: Option<u64>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            rule: None,
            display: Arc::new(TracingDisplay),
            kinds: Vec::new(),
            deck: None,
            seed: None,
        }
    }

    /// Replace the feature rule described by the configuration.
    pub fn rule(mut self, rule: Arc<dyn MatchRule>) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn display(mut self, display: Arc<dyn Display>) -> Self {
        self.display = display;
        self
    }

    /// Add one player; ids are handed out in the order players are added.
    pub fn player(mut self, kind: PlayerKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn players(mut self, count: usize, kind: PlayerKind) -> Self {
        self.kinds.extend(std::iter::repeat(kind).take(count));
        self
    }

    /// Start from this deck instead of the full `0..deck_size` universe.
    ///
    /// Every card must be distinct and lie in `0..deck_size`.
    pub fn deck(mut self, cards: Vec<Card>) -> Self {
        self.deck = Some(cards);
        self
    }

    /// Seed the arbiter's refill randomness.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and start one task per player plus the arbiter.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<Session> {
        self.config.validate().context("invalid session configuration")?;

        let deck = match self.deck {
            Some(deck) => {
                let mut seen = HashSet::new();
                if let Some(dup) = deck.iter().find(|card| !seen.insert(**card)) {
                    bail!("deck contains {dup} more than once");
                }
                if let Some(stray) = deck
                    .iter()
                    .find(|card| card.raw() as usize >= self.config.deck_size)
                {
                    bail!(
                        "deck contains {stray}, outside 0..{}",
                        self.config.deck_size
                    );
                }
                deck
            }
            None => (0..self.config.deck_size as u32).map(Card).collect(),
        };

        let config = Arc::new(self.config);
        let rule: Arc<dyn MatchRule> = match self.rule {
            Some(rule) => rule,
            None => Arc::new(config.rule()),
        };
        let rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let id = Uuid::new_v4();
        let deck_size = deck.len();
        let (board, rights) = Board::new(
            config.table_size,
            self.kinds.len(),
            deck,
            self.display.clone(),
        );
        let board = Arc::new(board);
        let roster = Arc::new(Roster::new(&self.kinds));
        let queue = Arc::new(ValidationQueue::new());
        let shutdown = CancellationToken::new();

        info!(
            session = %id,
            players = self.kinds.len(),
            table_size = config.table_size,
            deck = deck_size,
            "Starting session"
        );

        let player_ctx = PlayerContext {
            config: config.clone(),
            board: board.clone(),
            queue: queue.clone(),
            roster: roster.clone(),
            display: self.display.clone(),
            shutdown: shutdown.clone(),
        };
        let mut inputs = Vec::with_capacity(self.kinds.len());
        let mut players = Vec::with_capacity(self.kinds.len());
        for actor in 0..self.kinds.len() {
            let (player, input) = PlayerActor::new(actor, player_ctx.clone());
            players.push(player.spawn());
            inputs.push(input);
        }

        let arbiter = Arbiter::new(
            ArbiterContext {
                config: config.clone(),
                rule,
                board: board.clone(),
                rights,
                queue,
                roster: roster.clone(),
                display: self.display,
                shutdown: shutdown.clone(),
            },
            rng,
        )
        .spawn();

        Ok(Session {
            id,
            config,
            board,
            roster,
            inputs,
            shutdown,
            arbiter,
            players,
        })
    }
}

/// A running session.
pub struct Session {
    id: Uuid,
    config: Arc<SessionConfig>,
    board: Arc<Board>,
    roster: Arc<Roster>,
    inputs: Vec<ChoiceSender>,
    shutdown: CancellationToken,
    arbiter: JoinHandle<ArbiterOutcome>,
    players: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("players", &self.players.len())
            .field("finished", &self.arbiter.is_finished())
            .finish()
    }
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn board(&self) -> &Arc<Board> {
        &self.board
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    /// Direct access to a player's choice queue (how autonomous policies feed their player).
    pub fn input(&self, actor: ActorId) -> Option<ChoiceSender> {
        self.inputs.get(actor).cloned()
    }

    /// A key press from a human player.
    ///
    /// Waits while the player's queue is full. Presses for autonomous players
    /// are ignored, as their choices come from their policy.
    pub async fn press(&self, actor: ActorId, slot: usize) -> Result<(), SessionError> {
        let input = self
            .inputs
            .get(actor)
            .ok_or(SessionError::UnknownActor(actor))?;
        if self.roster.kind(actor) == Some(PlayerKind::Autonomous) {
            debug!(player = actor, slot, "Key press for autonomous player ignored");
            return Ok(());
        }
        input.send(slot).await?;
        Ok(())
    }

    /// Token cancelled when the session ends (or is terminated).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask every actor to stop. Suspended actors wake immediately.
    pub fn terminate(&self) {
        info!(session = %self.id, "Session termination requested");
        self.shutdown.cancel();
    }

    /// Whether the arbiter has finished (winners announced).
    pub fn is_finished(&self) -> bool {
        self.arbiter.is_finished()
    }

    /// Wait for the arbiter and every player to exit.
    pub async fn join(self) -> Result<SessionReport> {
        let outcome = self.arbiter.await.context("arbiter task failed")?;
        for result in futures::future::join_all(self.players).await {
            result.context("player task failed")?;
        }

        let report = SessionReport {
            session_id: self.id,
            winners: outcome.winners,
            scores: self.roster.scores(),
            stats: outcome.stats,
        };
        info!(session = %self.id, winners = ?report.winners, "Session finished");
        Ok(report)
    }
}
