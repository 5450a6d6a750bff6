//! Roster: per-player state shared between the players and the arbiter.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Identifier of a player actor (dense, starting at 0).
pub type ActorId = usize;

/// Who produces a player's choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    /// Choices arrive from a person through the session's key presses
    Human,
    /// Choices arrive from a policy feeding the player's queue directly
    Autonomous,
}

/// Whether a player may process choices right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeState {
    Active,
    FrozenUntil(Instant),
}

/// State of one player.
#[derive(Debug, Clone)]
pub struct ActorState {
    pub kind: PlayerKind,
    /// Never decreases
    pub score: u32,
    pub freeze: FreezeState,
}

/// Shared table of every player's state.
///
/// The arbiter records points and freeze deadlines when it judges a claim;
/// a player clears its own freeze once it has sat it out.
#[derive(Debug, Default)]
pub struct Roster {
    actors: DashMap<ActorId, ActorState>,
}

impl Roster {
    /// Create a roster with one active, scoreless entry per kind, ids in order.
    pub fn new(kinds: &[PlayerKind]) -> Self {
        let actors = DashMap::new();
        for (id, kind) in kinds.iter().enumerate() {
            actors.insert(
                id,
                ActorState {
                    kind: *kind,
                    score: 0,
                    freeze: FreezeState::Active,
                },
            );
        }
        Self { actors }
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn kind(&self, actor: ActorId) -> Option<PlayerKind> {
        self.actors.get(&actor).map(|state| state.kind)
    }

    pub fn score(&self, actor: ActorId) -> Option<u32> {
        self.actors.get(&actor).map(|state| state.score)
    }

    pub fn freeze_state(&self, actor: ActorId) -> Option<FreezeState> {
        self.actors.get(&actor).map(|state| state.freeze)
    }

    pub fn is_frozen(&self, actor: ActorId) -> bool {
        matches!(self.freeze_state(actor), Some(FreezeState::FrozenUntil(_)))
    }

    /// Add one point and return the new score (0 for unknown actors).
    pub fn award_point(&self, actor: ActorId) -> u32 {
        match self.actors.get_mut(&actor) {
            Some(mut state) => {
                state.score += 1;
                state.score
            }
            None => 0,
        }
    }

    pub fn freeze_until(&self, actor: ActorId, until: Instant) {
        if let Some(mut state) = self.actors.get_mut(&actor) {
            state.freeze = FreezeState::FrozenUntil(until);
        }
    }

    pub fn thaw(&self, actor: ActorId) {
        if let Some(mut state) = self.actors.get_mut(&actor) {
            state.freeze = FreezeState::Active;
        }
    }

    /// Every player's score, ordered by id.
    pub fn scores(&self) -> Vec<(ActorId, u32)> {
        let mut scores: Vec<_> = self
            .actors
            .iter()
            .map(|entry| (*entry.key(), entry.value().score))
            .collect();
        scores.sort_unstable();
        scores
    }

    /// All players holding the maximal score, ordered by id. Ties are all winners.
    pub fn winners(&self) -> Vec<ActorId> {
        let scores = self.scores();
        let Some(best) = scores.iter().map(|(_, score)| *score).max() else {
            return Vec::new();
        };
        scores
            .into_iter()
            .filter(|(_, score)| *score == best)
            .map(|(id, _)| id)
            .collect()
    }
}
