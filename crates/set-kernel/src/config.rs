//! Configuration types for a session.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::card::FeatureRule;

/// Static session configuration.
///
/// Fixed for the lifetime of a session and shared read-only between the
/// arbiter and every player. Loaded from TOML/JSON at runtime; every field
/// has a default so partial files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of slots on the board
    pub table_size: usize,

    /// Number of cards in the universe (`0..deck_size`)
    pub deck_size: usize,

    /// Number of values each feature can take
    pub feature_size: u32,

    /// Number of features per card
    pub feature_count: u32,

    /// Inactivity timeout before a full reshuffle (milliseconds)
    pub turn_timeout_ms: u64,

    /// Remaining time at which the countdown switches to warning (milliseconds)
    pub turn_timeout_warning_ms: u64,

    /// Freeze after a correct claim (milliseconds)
    pub point_freeze_ms: u64,

    /// Freeze after an incorrect claim (milliseconds)
    pub penalty_freeze_ms: u64,

    /// How often the arbiter refreshes the countdown display (milliseconds)
    pub countdown_refresh_ms: u64,

    /// How often a frozen player refreshes its freeze display (milliseconds)
    pub freeze_refresh_ms: u64,

    /// Capacity of each player's choice queue
    pub choice_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            table_size: 12,
            deck_size: 81,
            feature_size: 3,
            feature_count: 4,
            turn_timeout_ms: 60_000,
            turn_timeout_warning_ms: 5_000,
            point_freeze_ms: 1_000,
            penalty_freeze_ms: 3_000,
            countdown_refresh_ms: 1_000,
            freeze_refresh_ms: 1_000,
            choice_queue_capacity: 3,
        }
    }
}

impl SessionConfig {
    /// Load a configuration file, picking the format from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
            Some("json") => serde_json::from_str(&text)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
            other => bail!(
                "unsupported config format {:?} for {} (expected .toml or .json)",
                other,
                path.display()
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the kernel cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.table_size == 0 {
            bail!("table_size must be at least 1");
        }
        if self.feature_size == 0 || self.feature_count == 0 {
            bail!("feature_size and feature_count must be at least 1");
        }
        let Some(universe) = self.rule().universe_size() else {
            bail!(
                "{} features x {} values describe more cards than can be numbered",
                self.feature_count,
                self.feature_size
            );
        };
        if self.deck_size as u64 > universe || self.deck_size as u64 > u64::from(u32::MAX) {
            bail!(
                "deck_size {} exceeds the {} distinct cards of {} features x {} values",
                self.deck_size,
                universe,
                self.feature_count,
                self.feature_size
            );
        }
        if self.turn_timeout_warning_ms > self.turn_timeout_ms {
            bail!(
                "turn_timeout_warning_ms ({}) is larger than turn_timeout_ms ({})",
                self.turn_timeout_warning_ms,
                self.turn_timeout_ms
            );
        }
        if self.penalty_freeze_ms < self.point_freeze_ms {
            bail!(
                "penalty_freeze_ms ({}) is shorter than point_freeze_ms ({})",
                self.penalty_freeze_ms,
                self.point_freeze_ms
            );
        }
        if self.choice_queue_capacity == 0 {
            bail!("choice_queue_capacity must be at least 1");
        }
        if self.countdown_refresh_ms == 0 || self.freeze_refresh_ms == 0 {
            bail!("refresh intervals must be non-zero");
        }
        Ok(())
    }

    /// The feature rule described by this configuration.
    pub fn rule(&self) -> FeatureRule {
        FeatureRule::new(self.feature_size, self.feature_count)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    pub fn turn_timeout_warning(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_warning_ms)
    }

    pub fn point_freeze(&self) -> Duration {
        Duration::from_millis(self.point_freeze_ms)
    }

    pub fn penalty_freeze(&self) -> Duration {
        Duration::from_millis(self.penalty_freeze_ms)
    }

    pub fn countdown_refresh(&self) -> Duration {
        Duration::from_millis(self.countdown_refresh_ms)
    }

    pub fn freeze_refresh(&self) -> Duration {
        Duration::from_millis(self.freeze_refresh_ms)
    }
}
