//! Choice policies for autonomous players.
//!
//! A policy only decides which slot to press next. It looks at a board
//! snapshot and never touches the board itself; its choices go through the
//! player's queue like anybody else's.

use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use set_kernel::{find_sets, ActorId, BoardSnapshot, MatchRule};

/// Picks the next slot an autonomous player presses.
pub trait ChoicePolicy: Send {
    fn name(&self) -> &'static str;

    /// The next slot to press, or `None` to skip this round.
    fn next_slot(&mut self, actor: ActorId, board: &BoardSnapshot) -> Option<usize>;
}

/// Which policy drives the autonomous players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Random,
    Seeker,
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Random => "random",
            PolicyKind::Seeker => "seeker",
        }
    }

    pub fn build(self, rule: Arc<dyn MatchRule>, rng: ChaCha8Rng) -> Box<dyn ChoicePolicy> {
        match self {
            PolicyKind::Random => Box::new(RandomPolicy::new(rng)),
            PolicyKind::Seeker => Box::new(SeekerPolicy::new(rule, rng)),
        }
    }
}

/// Presses uniformly random slots, occupied or not.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self { rng }
    }
}

impl ChoicePolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn next_slot(&mut self, _actor: ActorId, board: &BoardSnapshot) -> Option<usize> {
        if board.slots.is_empty() {
            return None;
        }
        Some(self.rng.gen_range(0..board.slots.len()))
    }
}

/// Goes after a set it can see on the board.
///
/// Clears markers that are not part of its target first, then marks the
/// target's slots one by one. With no set in sight it behaves like
/// [`RandomPolicy`].
pub struct SeekerPolicy {
    rule: Arc<dyn MatchRule>,
    fallback: RandomPolicy,
}

impl SeekerPolicy {
    pub fn new(rule: Arc<dyn MatchRule>, rng: ChaCha8Rng) -> Self {
        Self {
            rule,
            fallback: RandomPolicy::new(rng),
        }
    }

    fn target(&self, board: &BoardSnapshot) -> Option<Vec<usize>> {
        let set = *find_sets(self.rule.as_ref(), &board.board_cards(), 1).first()?;
        set.iter().map(|card| board.slot_of(*card)).collect()
    }
}

impl ChoicePolicy for SeekerPolicy {
    fn name(&self) -> &'static str {
        "seeker"
    }

    fn next_slot(&mut self, actor: ActorId, board: &BoardSnapshot) -> Option<usize> {
        let mine = board.markers_of(actor);
        let Some(target) = self.target(board) else {
            return match mine.first() {
                Some(slot) => Some(*slot),
                None => self.fallback.next_slot(actor, board),
            };
        };

        if let Some(stray) = mine.iter().find(|slot| !target.contains(*slot)) {
            return Some(*stray);
        }
        // all three marked already means the claim is with the arbiter
        target.into_iter().find(|slot| !mine.contains(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use set_kernel::{Card, FeatureRule};

    fn snapshot(slots: &[Option<u32>], markers: &[&[ActorId]]) -> BoardSnapshot {
        let mut marker_counts = vec![0; 2];
        for holders in markers {
            for actor in holders.iter() {
                marker_counts[*actor] += 1;
            }
        }
        BoardSnapshot {
            deck: Vec::new(),
            slots: slots.iter().map(|slot| slot.map(Card)).collect(),
            removed: Vec::new(),
            markers: markers.iter().map(|holders| holders.to_vec()).collect(),
            marker_counts,
        }
    }

    fn seeker() -> SeekerPolicy {
        SeekerPolicy::new(Arc::new(FeatureRule::default()), ChaCha8Rng::seed_from_u64(0))
    }

    #[test]
    fn test_random_policy_stays_on_the_board() {
        let board = snapshot(&[Some(0), None, Some(4)], &[&[], &[], &[]]);
        let mut policy = RandomPolicy::new(ChaCha8Rng::seed_from_u64(9));
        for _ in 0..100 {
            let slot = policy.next_slot(0, &board).unwrap();
            assert!(slot < 3);
        }
    }

    #[test]
    fn test_random_policy_skips_a_board_without_slots() {
        let board = snapshot(&[], &[]);
        let mut policy = RandomPolicy::new(ChaCha8Rng::seed_from_u64(9));
        assert_eq!(policy.next_slot(0, &board), None);
    }

    #[test]
    fn test_seeker_marks_the_set_it_sees() {
        // 0, 1, 2 form a set in slots 3, 0, 4
        let board = snapshot(
            &[Some(1), Some(3), Some(4), Some(0), Some(2)],
            &[&[], &[], &[], &[], &[]],
        );
        let mut policy = seeker();

        let mut pressed = Vec::new();
        let mut markers: Vec<Vec<ActorId>> = vec![Vec::new(); 5];
        for _ in 0..3 {
            let refs: Vec<&[ActorId]> = markers.iter().map(|m| m.as_slice()).collect();
            let slot = policy
                .next_slot(0, &snapshot(&board_ids(&board), &refs))
                .unwrap();
            markers[slot].push(0);
            pressed.push(slot);
        }
        pressed.sort_unstable();
        assert_eq!(pressed, vec![0, 3, 4]);

        let refs: Vec<&[ActorId]> = markers.iter().map(|m| m.as_slice()).collect();
        assert_eq!(policy.next_slot(0, &snapshot(&board_ids(&board), &refs)), None);
    }

    #[test]
    fn test_seeker_clears_stray_markers_first() {
        let board = snapshot(
            &[Some(1), Some(3), Some(4), Some(0), Some(2)],
            &[&[], &[0, 1], &[], &[], &[]],
        );
        assert_eq!(seeker().next_slot(0, &board), Some(1));

        // somebody else's marker is not a stray
        let other = snapshot(
            &[Some(1), Some(3), Some(4), Some(0), Some(2)],
            &[&[], &[1], &[], &[], &[]],
        );
        let slot = seeker().next_slot(0, &other).unwrap();
        assert!([0, 3, 4].contains(&slot));
    }

    #[test]
    fn test_seeker_without_a_set_unmarks_then_goes_random() {
        // 0, 1, 3, 4 hold no set
        let marked = snapshot(&[Some(0), Some(1), Some(3), Some(4)], &[&[], &[], &[0], &[]]);
        assert_eq!(seeker().next_slot(0, &marked), Some(2));

        let clean = snapshot(&[Some(0), Some(1), Some(3), Some(4)], &[&[], &[], &[], &[]]);
        let slot = seeker().next_slot(0, &clean).unwrap();
        assert!(slot < 4);
    }

    fn board_ids(board: &BoardSnapshot) -> Vec<Option<u32>> {
        board.slots.iter().map(|slot| slot.map(|card| card.raw())).collect()
    }
}
