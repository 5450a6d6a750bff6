//! Display sink: where the kernel reports user-visible outcomes.
//!
//! Rendering is somebody else's problem. The kernel only fires these calls
//! and never looks at a result, so implementations must not block.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::card::Card;
use crate::roster::ActorId;

/// Whole milliseconds of `duration`, saturating.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Fire-and-forget sink for everything a user would see.
pub trait Display: Send + Sync {
    fn set_score(&self, actor: ActorId, score: u32);

    /// Remaining freeze time for a player (0 when the freeze ends).
    fn set_freeze(&self, actor: ActorId, remaining_ms: u64);

    /// Remaining turn time and whether it is inside the warning window.
    fn set_countdown(&self, remaining_ms: u64, warning: bool);

    fn announce_winners(&self, winners: &[ActorId]);

    fn place_card(&self, card: Card, slot: usize);

    fn remove_card(&self, slot: usize);

    fn set_marker(&self, actor: ActorId, slot: usize, on: bool);
}

/// Renders every display call as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDisplay;

impl Display for TracingDisplay {
    fn set_score(&self, actor: ActorId, score: u32) {
        info!(player = actor, score, "Score updated");
    }

    fn set_freeze(&self, actor: ActorId, remaining_ms: u64) {
        debug!(player = actor, remaining_ms, "Freeze");
    }

    fn set_countdown(&self, remaining_ms: u64, warning: bool) {
        if warning {
            debug!(remaining_ms, "Countdown (warning)");
        } else {
            tracing::trace!(remaining_ms, "Countdown");
        }
    }

    fn announce_winners(&self, winners: &[ActorId]) {
        info!(winners = ?winners, "Winners announced");
    }

    fn place_card(&self, card: Card, slot: usize) {
        tracing::trace!(card = card.raw(), slot, "Card placed");
    }

    fn remove_card(&self, slot: usize) {
        tracing::trace!(slot, "Card removed");
    }

    fn set_marker(&self, actor: ActorId, slot: usize, on: bool) {
        tracing::trace!(player = actor, slot, on, "Marker");
    }
}

/// One display call, captured as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Score { actor: ActorId, score: u32 },
    Freeze { actor: ActorId, remaining_ms: u64 },
    Countdown { remaining_ms: u64, warning: bool },
    Winners(Vec<ActorId>),
    CardPlaced { card: Card, slot: usize },
    CardRemoved { slot: usize },
    Marker { actor: ActorId, slot: usize, on: bool },
}

/// Forwards every display call to an unbounded channel.
///
/// Used by tests and by embedders that render on another task. Send errors
/// are ignored: a dropped receiver just means nobody is watching.
#[derive(Debug, Clone)]
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelDisplay {
    /// Create a display together with the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: DisplayEvent) {
        let _ = self.tx.send(event);
    }
}

impl Display for ChannelDisplay {
    fn set_score(&self, actor: ActorId, score: u32) {
        self.emit(DisplayEvent::Score { actor, score });
    }

    fn set_freeze(&self, actor: ActorId, remaining_ms: u64) {
        self.emit(DisplayEvent::Freeze {
            actor,
            remaining_ms,
        });
    }

    fn set_countdown(&self, remaining_ms: u64, warning: bool) {
        self.emit(DisplayEvent::Countdown {
            remaining_ms,
            warning,
        });
    }

    fn announce_winners(&self, winners: &[ActorId]) {
        self.emit(DisplayEvent::Winners(winners.to_vec()));
    }

    fn place_card(&self, card: Card, slot: usize) {
        self.emit(DisplayEvent::CardPlaced { card, slot });
    }

    fn remove_card(&self, slot: usize) {
        self.emit(DisplayEvent::CardRemoved { slot });
    }

    fn set_marker(&self, actor: ActorId, slot: usize, on: bool) {
        self.emit(DisplayEvent::Marker { actor, slot, on });
    }
}
