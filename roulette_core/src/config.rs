use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    engine::{QuotaPolicy, TraversalMode},
    error::ConfigError,
    schedule::{DurationRange, IntervalBounds},
    spinner::SpinnerConfig,
};

/// Where the draw duration comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationSource {
    Fixed { seconds: f64 },
    Spinner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePaths {
    pub tick_sound: PathBuf,
    pub win_sound: PathBuf,
}

impl Default for ResourcePaths {
    fn default() -> Self {
        Self {
            tick_sound: PathBuf::from("resources/rolling_sound.wav"),
            win_sound: PathBuf::from("resources/winner_sound.mp3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    pub rewards_dir: PathBuf,
    pub results_dir: PathBuf,
    pub results_prefix: String,
    pub duration: DurationSource,
    /// Spinner output range in seconds.
    pub duration_range: DurationRange,
    pub start_interval_ms: u32,
    pub end_interval_ms: u32,
    pub spinner: SpinnerConfig,
    pub traversal: TraversalMode,
    pub pick_count: usize,
    pub quota_policy: QuotaPolicy,
    pub resources: ResourcePaths,
    pub server_seed: Option<String>,
    pub client_seed: Option<String>,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            rewards_dir: PathBuf::from("rewards"),
            results_dir: PathBuf::from("."),
            results_prefix: "winners".to_string(),
            duration: DurationSource::Spinner,
            duration_range: DurationRange::new(3.0, 10.0),
            start_interval_ms: 100,
            end_interval_ms: 500,
            spinner: SpinnerConfig::default(),
            traversal: TraversalMode::RandomNoRepeat,
            pick_count: 1,
            quota_policy: QuotaPolicy::Advisory,
            resources: ResourcePaths::default(),
            server_seed: None,
            client_seed: None,
        }
    }
}

impl DrawConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interval bounds ordered for a decelerating animation.
    pub fn interval_bounds(&self) -> IntervalBounds {
        IntervalBounds::new(self.start_interval_ms, self.end_interval_ms).normalized()
    }

    /// Spinner settings with the configured duration range applied.
    pub fn spinner_config(&self) -> SpinnerConfig {
        self.spinner.clone().with_limits(self.duration_range.normalized())
    }

    /// Resource paths resolved against `base`, missing ones collected.
    pub fn validate_resources(&self, base: impl AsRef<Path>) -> Result<(), ConfigError> {
        let base = base.as_ref();
        let missing: Vec<PathBuf> = [&self.resources.tick_sound, &self.resources.win_sound]
            .into_iter()
            .map(|p| base.join(p))
            .filter(|p| !p.exists())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingResources(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = DrawConfig::from_json_str(
            r#"{
                "traversal": "sequential",
                "duration": { "kind": "fixed", "seconds": 4.5 },
                "start_interval_ms": 700,
                "quota_policy": "strict"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.traversal, TraversalMode::Sequential);
        assert_eq!(cfg.duration, DurationSource::Fixed { seconds: 4.5 });
        assert_eq!(cfg.quota_policy, QuotaPolicy::Strict);
        assert_eq!(cfg.end_interval_ms, 500);
        assert_eq!(cfg.interval_bounds(), IntervalBounds::new(500, 700));
        assert_eq!(cfg.rewards_dir, PathBuf::from("rewards"));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(DrawConfig::from_json_str("{"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_spinner_uses_duration_range() {
        let cfg = DrawConfig {
            duration_range: DurationRange::new(9.0, 2.0),
            ..DrawConfig::default()
        };
        let spinner = cfg.spinner_config();
        assert_eq!((spinner.lower_limit, spinner.upper_limit), (2.0, 9.0));
    }

    #[test]
    fn test_missing_resources_listed() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DrawConfig::default();
        match cfg.validate_resources(dir.path()) {
            Err(ConfigError::MissingResources(missing)) => assert_eq!(missing.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        std::fs::create_dir_all(dir.path().join("resources")).unwrap();
        std::fs::write(dir.path().join("resources/rolling_sound.wav"), b"").unwrap();
        std::fs::write(dir.path().join("resources/winner_sound.mp3"), b"").unwrap();
        assert!(cfg.validate_resources(dir.path()).is_ok());
    }
}
