//! Drivers that feed player queues from outside the kernel.
//!
//! An autonomous driver asks its policy for a slot every `think` interval and
//! pushes it into the player's queue, waiting when the queue is full. A stdin
//! reader does the same for human players, one `"<player> <slot>"` line at a
//! time.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use set_kernel::{ActorId, Board, ChoiceSender};

use crate::policy::ChoicePolicy;

/// Feeds one autonomous player until the session shuts down.
pub struct AutonomousDriver {
    input: ChoiceSender,
    board: Arc<Board>,
    policy: Box<dyn ChoicePolicy>,
    think: Duration,
    shutdown: CancellationToken,
}

impl AutonomousDriver {
    pub fn new(
        input: ChoiceSender,
        board: Arc<Board>,
        policy: Box<dyn ChoicePolicy>,
        think: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            input,
            board,
            policy,
            think,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(self.run())
    }

    /// Returns the number of choices delivered.
    pub async fn run(mut self) -> usize {
        let actor = self.input.actor();
        info!(player = actor, policy = self.policy.name(), "Autonomous driver starting");
        let mut sent = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.think) => {}
            }

            let snapshot = self.board.snapshot().await;
            let Some(slot) = self.policy.next_slot(actor, &snapshot) else {
                continue;
            };

            let delivered = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = self.input.send(slot) => result,
            };
            if delivered.is_err() {
                debug!(player = actor, "Player stopped accepting choices");
                break;
            }
            sent += 1;
        }

        info!(player = actor, sent, "Autonomous driver stopped");
        sent
    }
}

/// Parse a `"<player> <slot>"` line.
pub fn parse_press(line: &str) -> Option<(ActorId, usize)> {
    let mut parts = line.split_whitespace();
    let actor = parts.next()?.parse().ok()?;
    let slot = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((actor, slot))
}

/// Read key presses for human players from stdin on a plain OS thread.
///
/// Lines for players not in `humans` are ignored. The thread ends at end of
/// input or once every human player has stopped accepting choices.
pub fn spawn_stdin_reader(humans: HashMap<ActorId, ChoiceSender>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut open = humans.len();
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let Some((actor, slot)) = parse_press(&line) else {
                warn!(line = %line, "Expected \"<player> <slot>\"");
                continue;
            };
            let Some(input) = humans.get(&actor) else {
                warn!(player = actor, "Not a human player");
                continue;
            };
            if input.blocking_send(slot).is_err() {
                open = open.saturating_sub(1);
                if open == 0 {
                    break;
                }
            }
        }
        debug!("Stdin reader stopped");
    })
}
