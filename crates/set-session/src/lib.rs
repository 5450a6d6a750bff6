//! Set Session: command-line harness around the set kernel.
//!
//! Runs sessions with autonomous players driven by a choice policy and,
//! optionally, human players typing `"<player> <slot>"` on stdin. Results
//! are written as JSON for later comparison.

pub mod driver;
pub mod policy;
pub mod results;
