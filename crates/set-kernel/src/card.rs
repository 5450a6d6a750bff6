//! Card identifiers and the matching rule.
//!
//! A card is an opaque id in `0..deck_size`. The rule decides whether three
//! ids form a set; everything else in the kernel treats cards as tokens.

use serde::{Deserialize, Serialize};

/// Identifier of a single card in the universe `0..deck_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Card(pub u32);

impl Card {
    /// Get the raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Position of this card in a dense table indexed by card id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Card({})", self.0)
    }
}

/// Decides whether three cards form a matching triple.
///
/// Implementations must be pure: the answer depends on the three ids only.
/// They must also be total, answering for any three distinct ids of the
/// universe without panicking.
pub trait MatchRule: Send + Sync {
    /// Human-readable name of the rule (for logs).
    fn name(&self) -> &str;

    /// Test three cards against the rule.
    fn is_match(&self, cards: [Card; 3]) -> bool;
}

/// The classic feature rule.
///
/// A card id is read as `feature_count` digits in base `feature_size`
/// (feature 0 is the least significant digit). Three cards match when, for
/// every feature, their values are either all equal or all different.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureRule {
    feature_size: u32,
    feature_count: u32,
}

impl FeatureRule {
    /// Create a rule for cards with `feature_count` features of `feature_size` values each.
    #[must_use]
    pub const fn new(feature_size: u32, feature_count: u32) -> Self {
        Self {
            feature_size,
            feature_count,
        }
    }

    /// Number of distinct cards this rule can describe, `None` past `u64::MAX`.
    #[must_use]
    pub fn universe_size(&self) -> Option<u64> {
        u64::from(self.feature_size).checked_pow(self.feature_count)
    }

    /// Decompose a card into its feature values.
    #[must_use]
    pub fn features(&self, card: Card) -> Vec<u32> {
        let mut rest = card.raw();
        (0..self.feature_count)
            .map(|_| {
                let value = rest % self.feature_size.max(1);
                rest /= self.feature_size.max(1);
                value
            })
            .collect()
    }
}

impl Default for FeatureRule {
    fn default() -> Self {
        Self::new(3, 4)
    }
}

impl MatchRule for FeatureRule {
    fn name(&self) -> &str {
        "feature"
    }

    fn is_match(&self, cards: [Card; 3]) -> bool {
        let [a, b, c] = cards;
        if a == b || b == c || a == c {
            return false;
        }

        let (fa, fb, fc) = (self.features(a), self.features(b), self.features(c));
        fa.iter().zip(&fb).zip(&fc).all(|((x, y), z)| {
            let all_same = x == y && y == z;
            let all_different = x != y && y != z && x != z;
            all_same || all_different
        })
    }
}

/// Find up to `limit` matching triples among `cards`.
///
/// Triples are reported in ascending index order of the input slice.
pub fn find_sets(rule: &dyn MatchRule, cards: &[Card], limit: usize) -> Vec<[Card; 3]> {
    let mut found = Vec::new();
    if limit == 0 {
        return found;
    }

    for i in 0..cards.len() {
        for j in i + 1..cards.len() {
            for k in j + 1..cards.len() {
                let triple = [cards[i], cards[j], cards[k]];
                if rule.is_match(triple) {
                    found.push(triple);
                    if found.len() >= limit {
                        return found;
                    }
                }
            }
        }
    }

    found
}

/// Whether any matching triple exists among `cards`.
pub fn has_set(rule: &dyn MatchRule, cards: &[Card]) -> bool {
    !find_sets(rule, cards, 1).is_empty()
}
