//! Set Kernel: concurrent arbitration for a timed triple-matching card session
//!
//! A shared board of card slots is contested by independent player actors.
//! Each player marks up to three slots; a third marker turns into a claim on
//! a FIFO validation queue. A single arbiter judges claims in order, awards
//! points or penalty freezes, and runs the turn timer that reshuffles the
//! board when nobody finds a set in time.

pub mod actors;
pub mod board;
pub mod card;
pub mod config;
pub mod display;
pub mod roster;
pub mod session;
pub mod validation;

pub use actors::{ArbiterStats, ChoiceSender, InputClosed};
pub use board::{Board, BoardSnapshot, DealerRights, Toggle, MAX_MARKERS};
pub use card::{find_sets, has_set, Card, FeatureRule, MatchRule};
pub use config::SessionConfig;
pub use display::{ChannelDisplay, Display, DisplayEvent, TracingDisplay};
pub use roster::{ActorId, FreezeState, PlayerKind, Roster};
pub use session::{Session, SessionBuilder, SessionError, SessionReport};
pub use validation::{ValidationQueue, Verdict};
