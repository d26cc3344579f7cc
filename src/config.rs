//! # Configuration
//!
//! Loads the engine configuration from TOML (path via `PACER_CONFIG_PATH`,
//! falling back to `config/pacer.toml`, falling back to built-in defaults).
//! Every section carries serde defaults so a partial file only overrides what
//! it names. Validation failures at startup are fatal; a missing file is not.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const ENV_CONFIG_PATH: &str = "PACER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pacer.toml";

/// Daily quota thresholds: `daily_min < daily_normal < daily_max`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Floor the day should reach (catch-up band below it).
    pub daily_min: u32,
    /// Target the pacing loop converges toward.
    pub daily_normal: u32,
    /// Absolute ceiling; never exceeded regardless of score.
    pub daily_max: u32,
    /// Minimum score admitted once the day is past `daily_normal`.
    pub quality_threshold: i64,
    /// Hard per-author veto, checked independently of score.
    pub max_per_author_per_day: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_min: 50,
            daily_normal: 70,
            daily_max: 80,
            quality_threshold: 80,
            max_per_author_per_day: 3,
        }
    }
}

/// Interval bounds for one peak tier, in minutes.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TierIntervals {
    pub min_minutes: u64,
    pub base_minutes: u64,
    pub max_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Operating window, local hours `[start_hour, end_hour)`.
    pub start_hour: u32,
    pub end_hour: u32,
    /// Offset applied to UTC when classifying hours.
    pub utc_offset_hours: i32,
    /// Whole hours to avoid (a separately scheduled job shares the account).
    pub conflict_hours: Vec<u32>,
    /// Buffer before/after each conflict hour, minutes.
    pub conflict_buffer_minutes: i64,
    /// Hour sets for peak classification; hours in neither set are low tier.
    pub high_hours: Vec<u32>,
    pub medium_hours: Vec<u32>,
    pub high: TierIntervals,
    pub medium: TierIntervals,
    pub low: TierIntervals,
    /// Tolerated distance from the expected pace before speeding up/slowing
    /// down.
    pub pace_slack: i64,
    /// Bound for random jitter added to each interval, seconds.
    pub jitter_seconds: i64,
    /// Coarse re-check period outside the operating window, minutes.
    pub idle_poll_minutes: u64,
    /// Local hour at which the daily summary fires.
    pub summary_hour: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 23,
            utc_offset_hours: 0,
            conflict_hours: Vec::new(),
            conflict_buffer_minutes: 30,
            high_hours: vec![12, 13, 18, 19, 20, 21],
            medium_hours: vec![8, 9, 10, 11, 14, 15, 16, 17],
            high: TierIntervals {
                min_minutes: 10,
                base_minutes: 12,
                max_minutes: 15,
            },
            medium: TierIntervals {
                min_minutes: 15,
                base_minutes: 20,
                max_minutes: 25,
            },
            low: TierIntervals {
                min_minutes: 25,
                base_minutes: 35,
                max_minutes: 45,
            },
            pace_slack: 5,
            jitter_seconds: 90,
            idle_poll_minutes: 5,
            summary_hour: 22,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Replies above this on ordinary channels signal crowded competition.
    pub reply_crowd_ceiling: u64,
    /// Max candidate age before the stale penalty, ordinary sources.
    pub ordinary_max_age_hours: i64,
    /// Longer allowance for curated sources.
    pub curated_max_age_hours: i64,
    /// Authors given the +30 / +15 priority bonus (case-insensitive).
    pub high_priority_authors: Vec<String>,
    pub medium_priority_authors: Vec<String>,
    /// Flat additive trust bonus per discovery channel.
    pub source_trust: HashMap<String, i64>,
    /// Extra bonus when the channel is also the high-reply variant.
    pub high_reply_channel_bonus: i64,
    /// Fixed-phrase opinion/stance matcher; not NLP.
    pub opinion_phrases: Vec<String>,
    /// Moderate-likes band rewarded with the sweet-spot bonus.
    pub sweet_spot_min_likes: u64,
    pub sweet_spot_max_likes: u64,
    /// Likes above this draw the ceiling penalty.
    pub likes_ceiling: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reply_crowd_ceiling: 100,
            ordinary_max_age_hours: 12,
            curated_max_age_hours: 24,
            high_priority_authors: Vec::new(),
            medium_priority_authors: Vec::new(),
            source_trust: HashMap::new(),
            high_reply_channel_bonus: 10,
            opinion_phrases: default_opinion_phrases(),
            sweet_spot_min_likes: 100,
            sweet_spot_max_likes: 2_000,
            likes_ceiling: 20_000,
        }
    }
}

/// Built-in seed of opinion/stance phrases. Replaceable via config without
/// recompilation.
fn default_opinion_phrases() -> Vec<String> {
    [
        "i think",
        "imo",
        "in my opinion",
        "hot take",
        "unpopular opinion",
        "change my mind",
        "prove me wrong",
        "overrated",
        "underrated",
        "honestly",
        "disagree",
        "the truth is",
        "am i the only one",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Size of the admitted shortlist after ranking + diversity.
    pub target_count: usize,
    /// Upper bound asked of each adapter.
    pub per_source_limit: usize,
    /// Minimum likes+reposts to survive the static quality filter.
    pub min_engagement: u64,
    /// JSON fixture files wired as `StaticSource`s by the binary.
    pub fixture_paths: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target_count: 30,
            per_source_limit: 20,
            min_engagement: 5,
            fixture_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for the JSON record store and the pacing state file.
    pub data_dir: String,
    /// Minimum actions before a source qualifies for ranking.
    pub min_sample_size: u32,
    /// Retention horizon for action history (6 months).
    pub retention_days: i64,
    pub quota: QuotaConfig,
    pub pacing: PacingConfig,
    pub scoring: ScoringConfig,
    pub discovery: DiscoveryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: "state".to_string(),
            min_sample_size: 10,
            retention_days: 180,
            quota: QuotaConfig::default(),
            pacing: PacingConfig::default(),
            scoring: ScoringConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit TOML file. Parse errors are fatal.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) `$PACER_CONFIG_PATH` (must exist)
    /// 2) `config/pacer.toml` if present
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let path = std::path::PathBuf::from(p);
            if !path.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path");
            }
            return Self::load_from_file(&path);
        }
        let fallback = std::path::PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from_file(&fallback);
        }
        Ok(Self::default())
    }

    /// Startup validation; these failures are fatal.
    pub fn validate(&self) -> Result<()> {
        let q = &self.quota;
        if !(q.daily_min < q.daily_normal && q.daily_normal < q.daily_max) {
            bail!(
                "quota thresholds must satisfy min < normal < max (got {}/{}/{})",
                q.daily_min,
                q.daily_normal,
                q.daily_max
            );
        }
        if q.max_per_author_per_day == 0 {
            bail!("max_per_author_per_day must be at least 1");
        }
        let p = &self.pacing;
        if p.start_hour >= p.end_hour || p.end_hour > 24 {
            bail!(
                "operating window must satisfy start < end <= 24 (got {}..{})",
                p.start_hour,
                p.end_hour
            );
        }
        if !(-12..=14).contains(&p.utc_offset_hours) {
            bail!("utc_offset_hours out of range: {}", p.utc_offset_hours);
        }
        if p.summary_hour > 23 {
            bail!("summary_hour out of range: {}", p.summary_hour);
        }
        for (name, t) in [("high", &p.high), ("medium", &p.medium), ("low", &p.low)] {
            if !(t.min_minutes <= t.base_minutes && t.base_minutes <= t.max_minutes) {
                bail!("{name} tier intervals must satisfy min <= base <= max");
            }
            if t.min_minutes == 0 {
                bail!("{name} tier min interval must be positive");
            }
        }
        let s = &self.scoring;
        if s.ordinary_max_age_hours == 0 || s.curated_max_age_hours < s.ordinary_max_age_hours {
            bail!("max age hours must be positive and curated >= ordinary");
        }
        if s.sweet_spot_min_likes > s.sweet_spot_max_likes {
            bail!("sweet spot band is inverted");
        }
        if self.retention_days <= 0 {
            bail!("retention_days must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [quota]
            daily_normal = 60

            [pacing]
            conflict_hours = [14]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.quota.daily_normal, 60);
        assert_eq!(cfg.quota.daily_max, 80); // default kept
        assert_eq!(cfg.pacing.conflict_hours, vec![14]);
        cfg.validate().unwrap();
    }

    #[test]
    fn inverted_quota_is_fatal() {
        let mut cfg = AppConfig::default();
        cfg.quota.daily_min = 90;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_window_is_fatal() {
        let mut cfg = AppConfig::default();
        cfg.pacing.start_hour = 23;
        cfg.pacing.end_hour = 8;
        assert!(cfg.validate().is_err());
    }
}
