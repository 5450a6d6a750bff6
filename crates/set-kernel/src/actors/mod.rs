//! The concurrent actors of a session: one task per player, one arbiter.
//!
//! ```text
//! ChoiceSender ─► PlayerActor ──toggle_marker──► Board ◄──refill/clear/judge── Arbiter
//!                     │                                                          ▲
//!                     └──submit (3rd marker)──► ValidationQueue ──pop (FIFO)─────┘
//!                     ▲                                                          │
//!                     └──────────────── oneshot<Verdict> ◄───────────────────────┘
//! ```
//!
//! Players suspend on their verdict; the arbiter suspends until a claim is
//! queued, the countdown needs refreshing, the turn deadline passes, or the
//! session shuts down. Every suspension point also watches the session's
//! cancellation token.
//!
//! Actors are plain tokio tasks rather than mailbox actors. A request that
//! needs an answer carries its own `oneshot` sender (the claim's verdict
//! cell) in place of a correlated reply envelope. Shared state lives behind
//! the board's mutex and the roster's maps instead of inside one actor's
//! mailbox. A player's `mpsc` choice queue is its only inbox.
//!
//! A resolved verdict is taken before a shutdown that follows it, so a
//! claim that ends the session still reports its score.

mod arbiter;
mod player;

pub use arbiter::{Arbiter, ArbiterContext, ArbiterOutcome, ArbiterStats};
pub use player::{ChoiceSender, InputClosed, PlayerActor, PlayerContext};
