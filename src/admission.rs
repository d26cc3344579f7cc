//! # Admission Controller & Daily Quota
//!
//! One `DailyQuotaState` per calendar day, reset exactly once at rollover.
//! The controller returns decisions only; callers record an action (and
//! consume quota) after the external executor reports success, so a failed
//! execution never increments the counters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::QuotaConfig;

/// Per-day action bookkeeping. Single-writer; owned by the control loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyQuotaState {
    pub date: NaiveDate,
    pub actions_taken: u32,
    #[serde(default)]
    pub per_author: HashMap<String, u32>,
    #[serde(default)]
    pub languages: HashMap<String, u32>,
    #[serde(default)]
    pub error_count: u32,
    /// Same-day dedup set, tracked independently of the knowledge store so it
    /// is correct even when a store write is delayed.
    #[serde(default)]
    pub acted_urls: HashSet<String>,
}

impl DailyQuotaState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            actions_taken: 0,
            per_author: HashMap::new(),
            languages: HashMap::new(),
            error_count: 0,
            acted_urls: HashSet::new(),
        }
    }

    /// Record a successfully executed action.
    pub fn record_action(&mut self, author: &str, language: &str, url: &str) {
        self.actions_taken += 1;
        *self.per_author.entry(author.to_string()).or_insert(0) += 1;
        *self.languages.entry(language.to_string()).or_insert(0) += 1;
        self.acted_urls.insert(url.to_string());
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn author_count(&self, author: &str) -> u32 {
        self.per_author.get(author).copied().unwrap_or(0)
    }

    pub fn acted_today(&self, url: &str) -> bool {
        self.acted_urls.contains(url)
    }

    /// Reset when `today` differs from the stored date. Idempotent: a second
    /// call on the same day is a no-op. Returns whether a reset happened.
    pub fn rollover_if_new_day(&mut self, today: NaiveDate) -> bool {
        if self.date == today {
            return false;
        }
        *self = Self::new(today);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionVerdict {
    Admitted,
    /// Past the normal target, only scores at or above the quality threshold
    /// are worth the residual quota.
    BelowQuality,
    /// Absolute daily ceiling reached.
    AtDailyMax,
    /// Per-author daily cap; a hard veto regardless of score.
    AuthorCapped,
}

impl AdmissionVerdict {
    pub fn is_admitted(self) -> bool {
        self == Self::Admitted
    }
}

/// Quota + quality gating over one calendar day, three thresholds
/// `min < normal < max`.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    cfg: QuotaConfig,
}

impl AdmissionController {
    pub fn new(cfg: QuotaConfig) -> Self {
        Self { cfg }
    }

    /// Hard ceiling check, separate from quality gating.
    pub fn under_daily_max(&self, quota: &DailyQuotaState) -> bool {
        quota.actions_taken < self.cfg.daily_max
    }

    pub fn author_allowed(&self, quota: &DailyQuotaState, author: &str) -> bool {
        quota.author_count(author) < self.cfg.max_per_author_per_day
    }

    /// Quota + quality gate. Below `normal` (including the catch-up band
    /// below `min`) every candidate is admitted; in `[normal, max)` only
    /// scores at or above the threshold pass; at `max` nothing does.
    pub fn can_act(&self, quota: &DailyQuotaState, candidate_score: i64) -> bool {
        let count = quota.actions_taken;
        if count >= self.cfg.daily_max {
            false
        } else if count < self.cfg.daily_normal {
            true
        } else {
            candidate_score >= self.cfg.quality_threshold
        }
    }

    pub fn evaluate(
        &self,
        quota: &DailyQuotaState,
        author: &str,
        candidate_score: i64,
    ) -> AdmissionVerdict {
        if !self.under_daily_max(quota) {
            AdmissionVerdict::AtDailyMax
        } else if !self.author_allowed(quota, author) {
            AdmissionVerdict::AuthorCapped
        } else if !self.can_act(quota, candidate_score) {
            AdmissionVerdict::BelowQuality
        } else {
            AdmissionVerdict::Admitted
        }
    }
}
