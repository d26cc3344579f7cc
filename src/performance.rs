//! # Source Performance Tracker
//!
//! Rolling aggregates per `source_tag` and the rank-based priority
//! multiplier that feeds learned source quality back into candidate scoring.
//! This is deliberately a sample-gated heuristic, not a bandit algorithm: a
//! single lucky or unlucky run cannot swing the multiplier before enough
//! samples accumulate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::action::ActionRecord;

/// Rolling aggregate for one discovery source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourcePerformanceRecord {
    pub actions_taken: u32,
    pub total_likes: u64,
    pub author_responses: u32,
    /// Externally estimated follows attributed to this source. The original
    /// ratio of responses to follows is asserted, not measured; treat as a
    /// tunable input rather than deriving it here.
    pub estimated_follow_gain: f64,
    /// Derived; recomputed on every mutation.
    pub performance_score: f64,
}

impl SourcePerformanceRecord {
    /// `response_rate*100 + avg_likes*0.5 + follow_rate*20`. Author responses
    /// dominate because the platform's distribution algorithm boosts
    /// visibility disproportionately when the original author engages back.
    pub fn recompute(&mut self) {
        if self.actions_taken == 0 {
            self.performance_score = 0.0;
            return;
        }
        let n = self.actions_taken as f64;
        let response_rate = self.author_responses as f64 / n;
        let avg_likes = self.total_likes as f64 / n;
        let follow_rate = self.estimated_follow_gain / n;
        self.performance_score = response_rate * 100.0 + avg_likes * 0.5 + follow_rate * 20.0;
    }
}

/// Exclusive owner of all `SourcePerformanceRecord`s; the scoring engine only
/// ever sees the multiplier.
#[derive(Debug, Clone)]
pub struct SourcePerformanceTracker {
    records: HashMap<String, SourcePerformanceRecord>,
    min_sample_size: u32,
}

impl SourcePerformanceTracker {
    pub fn new(min_sample_size: u32) -> Self {
        Self {
            records: HashMap::new(),
            min_sample_size,
        }
    }

    /// Rebuild aggregates from raw action history. History is the authority
    /// for counts, likes and responses; polled outcomes folded into the
    /// records via `update_outcome` are picked up here.
    pub fn rebuild_from_actions<'a>(
        actions: impl IntoIterator<Item = &'a ActionRecord>,
        min_sample_size: u32,
    ) -> Self {
        let mut tracker = Self::new(min_sample_size);
        for rec in actions {
            tracker.record_action(&rec.source_tag);
            if rec.outcome.checked_at.is_some() {
                tracker.record_outcome(rec);
            }
        }
        tracker
    }

    pub fn records(&self) -> &HashMap<String, SourcePerformanceRecord> {
        &self.records
    }

    fn entry(&mut self, source_tag: &str) -> &mut SourcePerformanceRecord {
        self.records.entry(source_tag.to_string()).or_default()
    }

    /// Count a newly executed action for its source.
    pub fn record_action(&mut self, source_tag: &str) {
        let rec = self.entry(source_tag);
        rec.actions_taken += 1;
        rec.recompute();
    }

    /// Fold one polled outcome into the matching aggregate. Callers apply
    /// each outcome at most once (the store stamps `checked_at`).
    pub fn record_outcome(&mut self, action: &ActionRecord) {
        let rec = self.entry(&action.source_tag);
        if let Some(likes) = action.outcome.likes {
            rec.total_likes += likes;
        }
        if action.outcome.author_responded == Some(true) {
            rec.author_responses += 1;
        }
        rec.recompute();
    }

    /// Entry point for the external follow-estimate feeder: accrue an
    /// estimate of follows gained via this source. Estimates persisted
    /// through `KnowledgeStore::save_source_stats` are folded back in at
    /// engine startup and at every cycle refresh (`merge_follow_gains`).
    pub fn record_follow_gain(&mut self, source_tag: &str, estimate: f64) {
        let rec = self.entry(source_tag);
        rec.estimated_follow_gain += estimate;
        rec.recompute();
    }

    /// Adopt externally fed follow estimates from a persisted aggregate.
    /// Only `estimated_follow_gain` is taken; everything else in `stats` is
    /// derivable from action history and ignored.
    pub fn merge_follow_gains(&mut self, stats: &HashMap<String, SourcePerformanceRecord>) {
        for (tag, persisted) in stats {
            if persisted.estimated_follow_gain != 0.0 {
                let rec = self.entry(tag);
                rec.estimated_follow_gain = persisted.estimated_follow_gain;
                rec.recompute();
            }
        }
    }

    /// Sources with enough samples, best first; ties broken by tag so the
    /// ranking is deterministic.
    pub fn best_sources(&self, limit: usize) -> Vec<(String, f64)> {
        let mut qualified: Vec<(String, f64)> = self
            .records
            .iter()
            .filter(|(_, r)| r.actions_taken >= self.min_sample_size)
            .map(|(tag, r)| (tag.clone(), r.performance_score))
            .collect();
        qualified.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        qualified.truncate(limit);
        qualified
    }

    /// Discrete rank-based multiplier: 1.5 / 1.25 / 1.1 for the top three
    /// qualifying sources, 1.0 for everything else.
    pub fn priority_multiplier(&self, source_tag: &str) -> f64 {
        let top = self.best_sources(3);
        match top.iter().position(|(tag, _)| tag == source_tag) {
            Some(0) => 1.5,
            Some(1) => 1.25,
            Some(2) => 1.1,
            _ => 1.0,
        }
    }
}
