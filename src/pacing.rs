//! # Pacing
//!
//! Time-of-day aware interval calculation, operating window and conflict
//! avoidance checks, and the scheduler's persisted bookkeeping. Everything
//! here is pure over an injected `now` so the control loop logic tests
//! without real wall-clock delays.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{PacingConfig, TierIntervals};

/// Scheduler bookkeeping, persisted after every mutation so a restart mid-day
/// resumes with the correct baseline and does not replay the daily summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PacingState {
    pub last_action_at: Option<DateTime<Utc>>,
    pub current_day: NaiveDate,
    pub daily_summary_sent: bool,
}

impl PacingState {
    pub fn new(current_day: NaiveDate) -> Self {
        Self {
            last_action_at: None,
            current_day,
            daily_summary_sent: false,
        }
    }

    /// Idempotent day-rollover; clears the summary flag once per new day.
    pub fn rollover_if_new_day(&mut self, today: NaiveDate) -> bool {
        if self.current_day == today {
            return false;
        }
        self.current_day = today;
        self.daily_summary_sent = false;
        true
    }
}

/// Hour-of-day classification into expected-engagement tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakTier {
    High,
    Medium,
    Low,
}

/// Shift `now` into the configured local offset.
pub fn local(cfg: &PacingConfig, now: DateTime<Utc>) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(cfg.utc_offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    now.with_timezone(&offset)
}

pub fn in_operating_window(cfg: &PacingConfig, now: DateTime<Utc>) -> bool {
    let hour = local(cfg, now).hour();
    hour >= cfg.start_hour && hour < cfg.end_hour
}

/// If `now` falls inside a conflict hour plus its buffer, how long until the
/// buffer clears. Checks the adjacent days so buffers crossing midnight work.
pub fn conflict_wait(cfg: &PacingConfig, now: DateTime<Utc>) -> Option<Duration> {
    let loc = local(cfg, now);
    let now_min = (loc.hour() * 60 + loc.minute()) as i64;
    let buffer = cfg.conflict_buffer_minutes;

    let mut wait: Option<i64> = None;
    for &hour in &cfg.conflict_hours {
        let start = hour as i64 * 60 - buffer;
        let end = (hour as i64 + 1) * 60 + buffer;
        for day_shift in [-1440i64, 0, 1440] {
            let m = now_min + day_shift;
            if m >= start && m < end {
                let remaining = end - m;
                wait = Some(wait.map_or(remaining, |w| w.max(remaining)));
            }
        }
    }
    wait.map(Duration::minutes)
}

pub fn peak_tier(cfg: &PacingConfig, hour: u32) -> PeakTier {
    if cfg.high_hours.contains(&hour) {
        PeakTier::High
    } else if cfg.medium_hours.contains(&hour) {
        PeakTier::Medium
    } else {
        PeakTier::Low
    }
}

pub fn tier_intervals(cfg: &PacingConfig, tier: PeakTier) -> TierIntervals {
    match tier {
        PeakTier::High => cfg.high,
        PeakTier::Medium => cfg.medium,
        PeakTier::Low => cfg.low,
    }
}

fn hours_elapsed_today(cfg: &PacingConfig, now: DateTime<Utc>) -> f64 {
    let loc = local(cfg, now);
    let minute_of_day = (loc.hour() * 60 + loc.minute()) as f64;
    (minute_of_day / 60.0 - cfg.start_hour as f64).max(0.0)
}

/// `floor(normal_target / operating_hours * hours_elapsed)` — where the day
/// should be by now to converge on the normal target.
pub fn expected_actions_so_far(cfg: &PacingConfig, daily_normal: u32, now: DateTime<Utc>) -> i64 {
    let operating_hours = cfg.end_hour.saturating_sub(cfg.start_hour).max(1) as f64;
    ((daily_normal as f64 / operating_hours) * hours_elapsed_today(cfg, now)).floor() as i64
}

/// Core adaptive interval: tier.min when trailing expectation by more than
/// the slack, tier.max when ahead by more than the slack, tier.base
/// otherwise. `jitter_secs` is added and the result clamped back into
/// `[tier.min, tier.max]`.
pub fn cycle_interval(
    cfg: &PacingConfig,
    daily_normal: u32,
    actions_taken: u32,
    now: DateTime<Utc>,
    jitter_secs: i64,
) -> std::time::Duration {
    let tier = peak_tier(cfg, local(cfg, now).hour());
    let intervals = tier_intervals(cfg, tier);
    let expected = expected_actions_so_far(cfg, daily_normal, now);
    let delta = actions_taken as i64 - expected;

    let chosen_minutes = if delta < -cfg.pace_slack {
        intervals.min_minutes // trailing: speed up
    } else if delta > cfg.pace_slack {
        intervals.max_minutes // ahead: slow down
    } else {
        intervals.base_minutes
    };

    let secs = chosen_minutes as i64 * 60 + jitter_secs;
    let lo = intervals.min_minutes as i64 * 60;
    let hi = intervals.max_minutes as i64 * 60;
    std::time::Duration::from_secs(secs.clamp(lo, hi) as u64)
}

/// Draw bounded jitter for one interval.
pub fn sample_jitter(cfg: &PacingConfig) -> i64 {
    use rand::Rng;
    if cfg.jitter_seconds <= 0 {
        return 0;
    }
    rand::rng().random_range(-cfg.jitter_seconds..=cfg.jitter_seconds)
}

/// Whether the daily summary should fire now.
pub fn summary_due(cfg: &PacingConfig, state: &PacingState, now: DateTime<Utc>) -> bool {
    !state.daily_summary_sent && local(cfg, now).hour() >= cfg.summary_hour
}
