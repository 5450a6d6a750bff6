//! Run results and their JSON persistence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use set_kernel::{SessionConfig, SessionReport};

use crate::policy::PolicyKind;

/// Everything worth keeping from one run of the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration of the session
    pub duration_ms: u64,
    pub humans: usize,
    pub computers: usize,
    pub policy: PolicyKind,
    pub seed: Option<u64>,
    /// Stopped by the wall-clock limit rather than by running out of sets
    pub terminated: bool,
    pub config: SessionConfig,
    pub report: SessionReport,
}

impl RunResult {
    /// Save as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let result = serde_json::from_str(&json)?;
        Ok(result)
    }
}

/// Insert a local timestamp before the extension.
/// e.g., "report.json" -> "report-20260108-010530.json"
pub fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("report");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use set_kernel::ArbiterStats;
    use uuid::Uuid;

    #[test]
    fn test_timestamped_path_keeps_directory_and_extension() {
        let path = timestamped_path(Path::new("out/report.json"));
        assert_eq!(path.parent(), Some(Path::new("out")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("report-"));
        assert!(name.ends_with(".json"));
        // report-YYYYmmdd-HHMMSS.json
        assert_eq!(name.len(), "report-".len() + 15 + ".json".len());
    }

    #[test]
    fn test_save_and_load() {
        let now = Utc::now();
        let result = RunResult {
            started_at: now,
            finished_at: now,
            duration_ms: 1_500,
            humans: 0,
            computers: 2,
            policy: PolicyKind::Seeker,
            seed: Some(4),
            terminated: false,
            config: SessionConfig::default(),
            report: SessionReport {
                session_id: Uuid::new_v4(),
                winners: vec![1],
                scores: vec![(0, 3), (1, 5)],
                stats: ArbiterStats {
                    correct: 8,
                    ..ArbiterStats::default()
                },
            },
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        result.save(&path).unwrap();
        let loaded = RunResult::load(&path).unwrap();

        assert_eq!(loaded.report.winners, vec![1]);
        assert_eq!(loaded.report.stats.correct, 8);
        assert_eq!(loaded.policy, PolicyKind::Seeker);
        assert_eq!(loaded.config, SessionConfig::default());
    }
}
