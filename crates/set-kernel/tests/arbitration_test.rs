//! Arbiter-level tests driven from a pre-dealt board.
//!
//! Cards are placed and claims queued before the arbiter runs, which makes
//! the order in which the arbiter sees them deterministic.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc::UnboundedReceiver, oneshot};
use tokio_util::sync::CancellationToken;

use set_kernel::actors::{Arbiter, ArbiterContext};
use set_kernel::{
    ActorId, Board, Card, ChannelDisplay, Display, DisplayEvent, PlayerKind, Roster,
    SessionConfig, ValidationQueue, Verdict,
};

struct Table {
    board: Arc<Board>,
    queue: Arc<ValidationQueue>,
    roster: Arc<Roster>,
    shutdown: CancellationToken,
    events: UnboundedReceiver<DisplayEvent>,
}

/// A board holding `cards` in slots `0..`, with an arbiter ready to take over.
async fn dealt_table(config: SessionConfig, players: usize, cards: &[u32]) -> (Table, Arbiter) {
    let config = Arc::new(config);
    let (display, events) = ChannelDisplay::new();
    let display: Arc<dyn Display> = Arc::new(display);
    let deck: Vec<Card> = cards.iter().copied().map(Card).collect();
    let (board, rights) = Board::new(config.table_size, players, deck.clone(), display.clone());
    for (slot, card) in deck.into_iter().enumerate() {
        board.place(&rights, card, slot).await.unwrap();
    }

    let board = Arc::new(board);
    let queue = Arc::new(ValidationQueue::new());
    let roster = Arc::new(Roster::new(&vec![PlayerKind::Human; players]));
    let shutdown = CancellationToken::new();
    let arbiter = Arbiter::new(
        ArbiterContext {
            config: config.clone(),
            rule: Arc::new(config.rule()),
            board: board.clone(),
            rights,
            queue: queue.clone(),
            roster: roster.clone(),
            display,
            shutdown: shutdown.clone(),
        },
        ChaCha8Rng::seed_from_u64(1),
    );

    let table = Table {
        board,
        queue,
        roster,
        shutdown,
        events,
    };
    (table, arbiter)
}

impl Table {
    async fn mark(&self, actor: ActorId, slots: &[usize]) {
        for slot in slots {
            self.board.toggle_marker(actor, *slot).await;
        }
    }

    async fn claim(&self, actor: ActorId, slots: &[usize]) -> oneshot::Receiver<Verdict> {
        self.mark(actor, slots).await;
        self.queue.submit(actor).await.unwrap()
    }

    fn drain_events(&mut self) -> Vec<DisplayEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

fn config(table_size: usize) -> SessionConfig {
    SessionConfig {
        table_size,
        ..SessionConfig::default()
    }
}

// slots 0..=5 hold 0, 1, 2, 3, 6, 9
// {0, 1, 2} (slots 0, 1, 2) and {0, 3, 6} (slots 0, 3, 4) are sets sharing card 0
const OVERLAPPING: [u32; 6] = [0, 1, 2, 3, 6, 9];
const FIRST_SET: [usize; 3] = [0, 1, 2];
const SECOND_SET: [usize; 3] = [0, 3, 4];

#[tokio::test(start_paused = true)]
async fn test_correct_claim_releases_third_party_markers_and_requeues_overlap() {
    let (mut table, arbiter) = dealt_table(config(6), 3, &OVERLAPPING).await;

    let first = table.claim(0, &FIRST_SET).await;
    let second = table.claim(1, &SECOND_SET).await;
    // a bystander with a single marker on a slot about to disappear
    table.mark(2, &[1]).await;

    let handle = arbiter.spawn();
    assert_eq!(first.await.unwrap(), Verdict::Correct);
    assert_eq!(second.await.unwrap(), Verdict::Requeue);

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.stats.correct, 1);
    assert_eq!(outcome.stats.requeued, 1);
    assert_eq!(outcome.winners, vec![0]);
    assert_eq!(table.roster.score(1), Some(0));
    assert!(!table.roster.is_frozen(1));

    let events = table.drain_events();
    for (actor, slot) in [(1, 0), (2, 1)] {
        assert!(
            events.contains(&DisplayEvent::Marker {
                actor,
                slot,
                on: false
            }),
            "marker of player {actor} on slot {slot} was not released"
        );
    }

    // {3, 6, 9} holds no set, so the session is over
    let snapshot = table.board.snapshot().await;
    let mut removed = snapshot.removed.clone();
    removed.sort_unstable();
    assert_eq!(removed, vec![Card(0), Card(1), Card(2)]);
    assert!(table.shutdown.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_claims_are_judged_in_submission_order() {
    for first_actor in [0, 1] {
        let second_actor = 1 - first_actor;
        let (table, arbiter) = dealt_table(config(6), 2, &OVERLAPPING).await;
        let claims = [FIRST_SET, SECOND_SET];

        let first = table.claim(first_actor, &claims[first_actor]).await;
        let second = table.claim(second_actor, &claims[second_actor]).await;
        let handle = arbiter.spawn();

        assert_eq!(first.await.unwrap(), Verdict::Correct);
        assert_eq!(second.await.unwrap(), Verdict::Requeue);
        assert_eq!(handle.await.unwrap().winners, vec![first_actor]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_queue_drains_before_the_timeout_reshuffle() {
    let config = SessionConfig {
        table_size: 6,
        turn_timeout_ms: 1_000,
        turn_timeout_warning_ms: 500,
        ..SessionConfig::default()
    };
    // slots 0..=5 hold 0..=5; {0, 1, 3} and {2, 4, 5} are not sets
    let (table, arbiter) = dealt_table(config, 2, &[0, 1, 2, 3, 4, 5]).await;
    table.mark(0, &[0, 1, 3]).await;
    table.mark(1, &[2, 4, 5]).await;

    let start = tokio::time::Instant::now();
    let handle = arbiter.spawn();
    tokio::time::sleep_until(start + Duration::from_millis(999)).await;

    let first = table.queue.submit(0).await.unwrap();
    let second = table.queue.submit(1).await.unwrap();
    // both claims are queued when the deadline passes
    tokio::time::advance(Duration::from_millis(1)).await;

    // judged against the board as it was, not the reshuffled one
    assert_eq!(first.await.unwrap(), Verdict::Incorrect);
    assert_eq!(second.await.unwrap(), Verdict::Incorrect);
    assert!(table.roster.is_frozen(0));
    assert!(table.roster.is_frozen(1));

    table.shutdown.cancel();
    let stats = handle.await.unwrap().stats;
    assert_eq!(stats.incorrect, 2);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.turns, 2);
    assert!(table.board.snapshot().await.marker_counts.iter().all(|c| *c == 0));
}

#[tokio::test(start_paused = true)]
async fn test_every_queued_claim_gets_a_verdict_on_termination() {
    let (table, arbiter) = dealt_table(config(6), 3, &OVERLAPPING).await;
    let receivers = [
        table.claim(0, &FIRST_SET).await,
        table.claim(1, &SECOND_SET).await,
        table.claim(2, &[3, 4, 5]).await,
    ];

    table.shutdown.cancel();
    let outcome = arbiter.run().await;

    for receiver in receivers {
        assert_eq!(receiver.await.unwrap(), Verdict::Requeue);
    }
    assert_eq!(outcome.stats.requeued, 3);
    assert_eq!(outcome.stats.turns, 0);
    // all tied at zero
    assert_eq!(outcome.winners, vec![0, 1, 2]);
    assert!(table.queue.submit(0).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_withdrawn_claim_is_skipped() {
    let (table, arbiter) = dealt_table(config(6), 2, &OVERLAPPING).await;
    let gone = table.claim(0, &FIRST_SET).await;
    drop(gone);
    let kept = table.claim(1, &SECOND_SET).await;

    let handle = arbiter.spawn();
    // the withdrawn claim never removes anything, so the second one still matches
    assert_eq!(kept.await.unwrap(), Verdict::Correct);

    table.shutdown.cancel();
    let outcome = handle.await.unwrap();
    assert_eq!(outcome.stats.withdrawn, 1);
    assert_eq!(outcome.stats.correct, 1);
    assert_eq!(table.roster.score(0), Some(0));
}
