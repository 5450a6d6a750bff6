//! Board: the single shared mutable resource of a session.
//!
//! Holds the deck, the slot <-> card mapping, the per-player marker matrix
//! and the pile of cards removed by valid claims. Everything sits behind one
//! mutex so marker toggles, removals and refills are serialized and nobody
//! observes a torn intermediate state.
//!
//! Players only ever add or remove markers. Moving cards (place, remove,
//! refill, reshuffle, claim removal) needs a [`DealerRights`] token, and the
//! only token for a board is handed out by [`Board::new`].

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;

use crate::card::{Card, MatchRule};
use crate::display::Display;
use crate::roster::ActorId;

/// Maximum live markers per player.
pub const MAX_MARKERS: usize = 3;

/// Capability to move cards on a board.
///
/// Not `Clone`: whoever owns it (the arbiter) is the only party that can
/// place or remove cards.
#[derive(Debug)]
pub struct DealerRights {
    _private: (),
}

/// Errors from card movements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("slot {slot} already holds {card}")]
    SlotOccupied { slot: usize, card: Card },
    #[error("slot {0} does not exist")]
    NoSuchSlot(usize),
    #[error("{0} is already on the board")]
    CardAlreadyPlaced(Card),
    #[error("{0} is not in the deck")]
    NotInDeck(Card),
}

/// Outcome of a marker toggle. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Marker set; `count` is the player's new marker count
    Placed { count: usize },
    /// Marker cleared; `count` is the player's new marker count
    Removed { count: usize },
    /// The slot holds no card, nothing changed
    SlotEmpty,
    /// The player already holds three markers elsewhere
    LimitReached,
    NoSuchSlot,
    UnknownActor,
}

/// A card taken off the board and whose markers were released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub card: Option<Card>,
    /// Players that had a marker on the slot
    pub released: Vec<ActorId>,
}

/// Result of judging a player's claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimJudgement {
    /// The player no longer holds exactly three markers
    Stale { markers: usize },
    /// The three claimed cards do not match; the board is untouched
    Rejected { cards: [Card; 3] },
    /// The three cards matched and were removed from the board
    Accepted {
        cards: [Card; 3],
        slots: [usize; 3],
        /// Other players whose markers sat on the removed slots
        released: Vec<ActorId>,
    },
}

/// Point-in-time copy of the whole board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub deck: Vec<Card>,
    pub slots: Vec<Option<Card>>,
    pub removed: Vec<Card>,
    /// Players holding a marker, per slot
    pub markers: Vec<Vec<ActorId>>,
    /// Live marker count, per player
    pub marker_counts: Vec<usize>,
}

impl BoardSnapshot {
    /// Cards currently on the board, in slot order.
    pub fn board_cards(&self) -> Vec<Card> {
        self.slots.iter().flatten().copied().collect()
    }

    pub fn card_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn slot_of(&self, card: Card) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == Some(card))
    }

    /// Slots on which `actor` holds a marker.
    pub fn markers_of(&self, actor: ActorId) -> Vec<usize> {
        self.markers
            .iter()
            .enumerate()
            .filter(|(_, holders)| holders.contains(&actor))
            .map(|(slot, _)| slot)
            .collect()
    }
}

#[derive(Debug)]
struct BoardState {
    deck: Vec<Card>,
    slot_to_card: Vec<Option<Card>>,
    card_to_slot: HashMap<Card, usize>,
    /// `markers[slot][actor]`
    markers: Vec<Vec<bool>>,
    marker_counts: Vec<usize>,
    removed: Vec<Card>,
}

impl BoardState {
    fn place(&mut self, card: Card, slot: usize) -> Result<(), BoardError> {
        let current = self
            .slot_to_card
            .get(slot)
            .ok_or(BoardError::NoSuchSlot(slot))?;
        if let Some(card) = current {
            return Err(BoardError::SlotOccupied { slot, card: *card });
        }
        if self.card_to_slot.contains_key(&card) {
            return Err(BoardError::CardAlreadyPlaced(card));
        }
        let index = self
            .deck
            .iter()
            .position(|c| *c == card)
            .ok_or(BoardError::NotInDeck(card))?;

        self.deck.swap_remove(index);
        self.slot_to_card[slot] = Some(card);
        self.card_to_slot.insert(card, slot);
        Ok(())
    }

    /// Clear a slot and every marker on it. The card is handed back to the caller.
    fn take(&mut self, slot: usize) -> Result<Removal, BoardError> {
        let card = self
            .slot_to_card
            .get_mut(slot)
            .ok_or(BoardError::NoSuchSlot(slot))?
            .take();
        if let Some(card) = card {
            self.card_to_slot.remove(&card);
        }

        let mut released = Vec::new();
        for (actor, marked) in self.markers[slot].iter_mut().enumerate() {
            if *marked {
                *marked = false;
                self.marker_counts[actor] -= 1;
                released.push(actor);
            }
        }

        Ok(Removal { card, released })
    }

    fn slots_marked_by(&self, actor: ActorId) -> Vec<usize> {
        self.markers
            .iter()
            .enumerate()
            .filter(|(_, holders)| holders[actor])
            .map(|(slot, _)| slot)
            .collect()
    }
}

/// The shared board.
pub struct Board {
    state: Mutex<BoardState>,
    display: Arc<dyn Display>,
    table_size: usize,
    players: usize,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("table_size", &self.table_size)
            .field("players", &self.players)
            .finish()
    }
}

impl Board {
    /// Create an empty board of `table_size` slots for `players` players,
    /// with `deck` as the full starting deck.
    ///
    /// Returns the board together with its only [`DealerRights`].
    pub fn new(
        table_size: usize,
        players: usize,
        deck: Vec<Card>,
        display: Arc<dyn Display>,
    ) -> (Self, DealerRights) {
        let state = BoardState {
            deck,
            slot_to_card: vec![None; table_size],
            card_to_slot: HashMap::new(),
            markers: vec![vec![false; players]; table_size],
            marker_counts: vec![0; players],
            removed: Vec::new(),
        };
        let board = Self {
            state: Mutex::new(state),
            display,
            table_size,
            players,
        };
        (board, DealerRights { _private: () })
    }

    pub fn table_size(&self) -> usize {
        self.table_size
    }

    pub fn players(&self) -> usize {
        self.players
    }

    /// Move `card` from the deck into an empty `slot`.
    pub async fn place(
        &self,
        _rights: &DealerRights,
        card: Card,
        slot: usize,
    ) -> Result<(), BoardError> {
        let mut state = self.state.lock().await;
        state.place(card, slot)?;
        self.display.place_card(card, slot);
        Ok(())
    }

    /// Take the card on `slot` off the board for good.
    ///
    /// Every marker on the slot is cleared; the players that held one are
    /// returned. Their marker counts are already adjusted.
    pub async fn remove(&self, _rights: &DealerRights, slot: usize) -> Result<Removal, BoardError> {
        let mut state = self.state.lock().await;
        let removal = state.take(slot)?;
        if let Some(card) = removal.card {
            state.removed.push(card);
            self.emit_removal(slot, &removal);
        }
        Ok(removal)
    }

    /// Fill every empty slot with a random deck card, in ascending slot order.
    ///
    /// Stops when the deck runs out or the board is full. Returns the
    /// placements made.
    pub async fn refill<R: Rng>(
        &self,
        _rights: &DealerRights,
        rng: &mut R,
    ) -> Vec<(Card, usize)> {
        let mut state = self.state.lock().await;
        let mut placed = Vec::new();

        for slot in 0..self.table_size {
            if state.deck.is_empty() {
                break;
            }
            if state.slot_to_card[slot].is_some() {
                continue;
            }
            let index = rng.gen_range(0..state.deck.len());
            let card = state.deck[index];
            if state.place(card, slot).is_ok() {
                self.display.place_card(card, slot);
                placed.push((card, slot));
            }
        }

        placed
    }

    /// Return every board card to the deck and clear every marker.
    pub async fn clear(&self, _rights: &DealerRights) -> Vec<Card> {
        let mut state = self.state.lock().await;
        let mut returned = Vec::new();

        for slot in 0..self.table_size {
            let Ok(removal) = state.take(slot) else {
                continue;
            };
            if let Some(card) = removal.card {
                state.deck.push(card);
                returned.push(card);
                self.emit_removal(slot, &removal);
            }
        }

        returned
    }

    /// Toggle `actor`'s marker on `slot`.
    ///
    /// Clearing an existing marker always succeeds. Setting one needs a card
    /// on the slot and fewer than three live markers.
    pub async fn toggle_marker(&self, actor: ActorId, slot: usize) -> Toggle {
        if actor >= self.players {
            return Toggle::UnknownActor;
        }
        if slot >= self.table_size {
            return Toggle::NoSuchSlot;
        }

        let mut state = self.state.lock().await;
        if state.slot_to_card[slot].is_none() {
            return Toggle::SlotEmpty;
        }

        if state.markers[slot][actor] {
            state.markers[slot][actor] = false;
            state.marker_counts[actor] -= 1;
            self.display.set_marker(actor, slot, false);
            return Toggle::Removed {
                count: state.marker_counts[actor],
            };
        }

        if state.marker_counts[actor] >= MAX_MARKERS {
            return Toggle::LimitReached;
        }

        state.markers[slot][actor] = true;
        state.marker_counts[actor] += 1;
        self.display.set_marker(actor, slot, true);
        Toggle::Placed {
            count: state.marker_counts[actor],
        }
    }

    /// Judge `actor`'s current claim in one critical section.
    ///
    /// Re-checks that the player still holds exactly three markers,
    /// reconstructs the claimed cards from the marker matrix, tests them and,
    /// when they match, removes the three cards (releasing anybody else's
    /// markers on those slots).
    pub async fn judge_claim(
        &self,
        _rights: &DealerRights,
        actor: ActorId,
        rule: &dyn MatchRule,
    ) -> ClaimJudgement {
        let mut state = self.state.lock().await;

        let markers = state.marker_counts.get(actor).copied().unwrap_or(0);
        if markers != MAX_MARKERS {
            return ClaimJudgement::Stale { markers };
        }

        let slots = state.slots_marked_by(actor);
        let cards: Vec<Card> = slots
            .iter()
            .filter_map(|slot| state.slot_to_card[*slot])
            .collect();
        let (Ok(slots), Ok(cards)) = (
            <[usize; 3]>::try_from(slots),
            <[Card; 3]>::try_from(cards),
        ) else {
            return ClaimJudgement::Stale { markers };
        };

        if !rule.is_match(cards) {
            return ClaimJudgement::Rejected { cards };
        }

        let mut released = Vec::new();
        for slot in slots {
            let Ok(removal) = state.take(slot) else {
                continue;
            };
            if let Some(card) = removal.card {
                state.removed.push(card);
                self.emit_removal(slot, &removal);
            }
            released.extend(removal.released.into_iter().filter(|a| *a != actor));
        }
        released.sort_unstable();
        released.dedup();

        ClaimJudgement::Accepted {
            cards,
            slots,
            released,
        }
    }

    pub async fn card_at(&self, slot: usize) -> Option<Card> {
        self.state
            .lock()
            .await
            .slot_to_card
            .get(slot)
            .copied()
            .flatten()
    }

    pub async fn slot_of(&self, card: Card) -> Option<usize> {
        self.state.lock().await.card_to_slot.get(&card).copied()
    }

    pub async fn card_count(&self) -> usize {
        self.state.lock().await.card_to_slot.len()
    }

    pub async fn deck_len(&self) -> usize {
        self.state.lock().await.deck.len()
    }

    pub async fn marker_count(&self, actor: ActorId) -> usize {
        self.state
            .lock()
            .await
            .marker_counts
            .get(actor)
            .copied()
            .unwrap_or(0)
    }

    /// Slot contents, in slot order.
    pub async fn slots_snapshot(&self) -> Vec<Option<Card>> {
        self.state.lock().await.slot_to_card.clone()
    }

    /// Every card still in play: the deck plus the board.
    pub async fn remaining_cards(&self) -> Vec<Card> {
        let state = self.state.lock().await;
        let mut cards = state.deck.clone();
        cards.extend(state.slot_to_card.iter().flatten().copied());
        cards
    }

    pub async fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.lock().await;
        BoardSnapshot {
            deck: state.deck.clone(),
            slots: state.slot_to_card.clone(),
            removed: state.removed.clone(),
            markers: state
                .markers
                .iter()
                .map(|holders| {
                    holders
                        .iter()
                        .enumerate()
                        .filter(|(_, marked)| **marked)
                        .map(|(actor, _)| actor)
                        .collect()
                })
                .collect(),
            marker_counts: state.marker_counts.clone(),
        }
    }

    fn emit_removal(&self, slot: usize, removal: &Removal) {
        for actor in &removal.released {
            self.display.set_marker(*actor, slot, false);
        }
        self.display.remove_card(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::FeatureRule;
    use crate::display::{ChannelDisplay, DisplayEvent};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn board(table_size: usize, players: usize, deck: &[u32]) -> (Board, DealerRights) {
        let (display, _rx) = ChannelDisplay::new();
        Board::new(
            table_size,
            players,
            deck.iter().copied().map(Card).collect(),
            Arc::new(display),
        )
    }

    fn assert_partition(snapshot: &BoardSnapshot, universe: &[u32]) {
        let mut all: Vec<Card> = snapshot.deck.clone();
        all.extend(snapshot.board_cards());
        all.extend(snapshot.removed.iter().copied());
        all.sort_unstable();
        let expected: Vec<Card> = universe.iter().copied().map(Card).collect();
        assert_eq!(all, expected, "deck, board and removed must partition the universe");
    }

    #[tokio::test]
    async fn test_place_into_occupied_slot_fails() {
        let (board, rights) = board(3, 1, &[0, 1, 2]);
        board.place(&rights, Card(0), 1).await.unwrap();

        let err = board.place(&rights, Card(1), 1).await.unwrap_err();
        assert_eq!(
            err,
            BoardError::SlotOccupied {
                slot: 1,
                card: Card(0)
            }
        );
        assert_eq!(board.slot_of(Card(0)).await, Some(1));
        assert_eq!(board.card_at(1).await, Some(Card(0)));
        assert_eq!(board.deck_len().await, 2);
    }

    #[tokio::test]
    async fn test_place_rejects_cards_outside_deck() {
        let (board, rights) = board(3, 1, &[0, 1]);
        board.place(&rights, Card(0), 0).await.unwrap();
        assert_eq!(
            board.place(&rights, Card(0), 1).await,
            Err(BoardError::CardAlreadyPlaced(Card(0)))
        );
        assert_eq!(
            board.place(&rights, Card(9), 1).await,
            Err(BoardError::NotInDeck(Card(9)))
        );
        assert_eq!(
            board.place(&rights, Card(1), 5).await,
            Err(BoardError::NoSuchSlot(5))
        );
    }

    #[tokio::test]
    async fn test_remove_releases_markers_of_every_actor() {
        let (board, rights) = board(3, 3, &[0, 1, 2]);
        board.place(&rights, Card(0), 0).await.unwrap();
        board.toggle_marker(0, 0).await;
        board.toggle_marker(2, 0).await;

        let removal = board.remove(&rights, 0).await.unwrap();
        assert_eq!(removal.card, Some(Card(0)));
        assert_eq!(removal.released, vec![0, 2]);
        assert_eq!(board.marker_count(0).await, 0);
        assert_eq!(board.marker_count(2).await, 0);
        assert_eq!(board.slot_of(Card(0)).await, None);
        assert_partition(&board.snapshot().await, &[0, 1, 2]);
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_marker_state() {
        let (board, rights) = board(3, 1, &[0, 1, 2]);
        board.place(&rights, Card(2), 2).await.unwrap();

        assert_eq!(board.toggle_marker(0, 2).await, Toggle::Placed { count: 1 });
        assert_eq!(board.toggle_marker(0, 2).await, Toggle::Removed { count: 0 });
        assert!(board.snapshot().await.markers[2].is_empty());
    }

    #[tokio::test]
    async fn test_toggle_on_empty_or_missing_slot_is_a_no_op() {
        let (board, _rights) = board(3, 1, &[0, 1, 2]);
        assert_eq!(board.toggle_marker(0, 1).await, Toggle::SlotEmpty);
        assert_eq!(board.toggle_marker(0, 3).await, Toggle::NoSuchSlot);
        assert_eq!(board.toggle_marker(4, 0).await, Toggle::UnknownActor);
        assert_eq!(board.marker_count(0).await, 0);
    }

    #[tokio::test]
    async fn test_fourth_marker_is_rejected_but_unmarking_works() {
        let (board, rights) = board(4, 1, &[0, 1, 2, 3]);
        board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(1)).await;

        for slot in 0..3 {
            board.toggle_marker(0, slot).await;
        }
        assert_eq!(board.toggle_marker(0, 3).await, Toggle::LimitReached);
        assert_eq!(board.marker_count(0).await, 3);
        assert_eq!(board.toggle_marker(0, 1).await, Toggle::Removed { count: 2 });
        assert_eq!(board.toggle_marker(0, 3).await, Toggle::Placed { count: 3 });
    }

    #[tokio::test]
    async fn test_refill_stops_at_full_board() {
        let universe: Vec<u32> = (0..20).collect();
        let (board, rights) = board(12, 1, &universe);
        let placed = board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(7)).await;

        assert_eq!(placed.len(), 12);
        assert_eq!(board.card_count().await, 12);
        assert_eq!(board.deck_len().await, 8);
        assert!(board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(7)).await.is_empty());
        assert_partition(&board.snapshot().await, &universe);
    }

    #[tokio::test]
    async fn test_refill_stops_when_deck_runs_out() {
        let (board, rights) = board(12, 1, &[5, 6, 7, 8]);
        let placed = board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(3)).await;

        assert_eq!(placed.len(), 4);
        let slots: Vec<usize> = placed.iter().map(|(_, slot)| *slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
        assert_eq!(board.deck_len().await, 0);
    }

    #[tokio::test]
    async fn test_clear_returns_cards_and_markers() {
        let (board, rights) = board(3, 2, &[0, 1, 2, 3]);
        board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(0)).await;
        board.toggle_marker(0, 0).await;
        board.toggle_marker(1, 2).await;

        let returned = board.clear(&rights).await;
        assert_eq!(returned.len(), 3);
        let snapshot = board.snapshot().await;
        assert_eq!(snapshot.card_count(), 0);
        assert_eq!(snapshot.deck.len(), 4);
        assert_eq!(snapshot.marker_counts, vec![0, 0]);
        assert_partition(&snapshot, &[0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_judge_claim_stale_when_fewer_than_three_markers() {
        let (board, rights) = board(3, 1, &[0, 1, 2]);
        board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(0)).await;
        board.toggle_marker(0, 0).await;
        board.toggle_marker(0, 1).await;

        let judgement = board.judge_claim(&rights, 0, &FeatureRule::default()).await;
        assert_eq!(judgement, ClaimJudgement::Stale { markers: 2 });
    }

    #[tokio::test]
    async fn test_judge_claim_rejects_non_set_and_leaves_board() {
        // 0, 1 and 3 differ in two features in a two-equal-one-different way
        let (board, rights) = board(3, 1, &[0, 1, 3]);
        board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(0)).await;
        for slot in 0..3 {
            board.toggle_marker(0, slot).await;
        }

        let before = board.snapshot().await;
        let judgement = board.judge_claim(&rights, 0, &FeatureRule::default()).await;
        assert!(matches!(judgement, ClaimJudgement::Rejected { .. }));
        assert_eq!(board.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_judge_claim_accepts_set_and_releases_third_parties() {
        let (display, mut rx) = ChannelDisplay::new();
        let (board, rights) = Board::new(
            4,
            2,
            vec![Card(0), Card(1), Card(2), Card(40)],
            Arc::new(display),
        );
        for (card, slot) in [(0, 0), (1, 1), (2, 2), (40, 3)] {
            board.place(&rights, Card(card), slot).await.unwrap();
        }
        for slot in 0..3 {
            board.toggle_marker(0, slot).await;
        }
        board.toggle_marker(1, 1).await;
        board.toggle_marker(1, 3).await;

        let judgement = board.judge_claim(&rights, 0, &FeatureRule::default()).await;
        assert_eq!(
            judgement,
            ClaimJudgement::Accepted {
                cards: [Card(0), Card(1), Card(2)],
                slots: [0, 1, 2],
                released: vec![1],
            }
        );

        let snapshot = board.snapshot().await;
        assert_eq!(snapshot.marker_counts, vec![0, 1]);
        assert_eq!(snapshot.markers_of(1), vec![3]);
        assert_eq!(snapshot.board_cards(), vec![Card(40)]);
        assert_eq!(snapshot.removed, vec![Card(0), Card(1), Card(2)]);
        assert_partition(&snapshot, &[0, 1, 2, 40]);

        let mut removed_slots = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DisplayEvent::CardRemoved { slot } = event {
                removed_slots.push(slot);
            }
        }
        assert_eq!(removed_slots, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_never_exceed_limit() {
        let universe: Vec<u32> = (0..12).collect();
        let (board, rights) = board(12, 4, &universe);
        board.refill(&rights, &mut ChaCha8Rng::seed_from_u64(11)).await;
        let board = Arc::new(board);

        let mut tasks = Vec::new();
        for actor in 0..4 {
            let board = board.clone();
            tasks.push(tokio::spawn(async move {
                for step in 0..200 {
                    board.toggle_marker(actor, (actor * 5 + step * 7) % 12).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = board.snapshot().await;
        for actor in 0..4 {
            assert!(snapshot.marker_counts[actor] <= MAX_MARKERS);
            assert_eq!(snapshot.markers_of(actor).len(), snapshot.marker_counts[actor]);
        }
    }
}
