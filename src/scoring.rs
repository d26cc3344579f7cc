//! # Scoring Engine
//!
//! Pure, deterministic candidate scoring. Every term is a documented constant,
//! not a learned weight; identical inputs always produce identical scores.
//! The final score is scaled by the source performance multiplier, which is
//! how the learning loop feeds back into ranking.

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::discover::types::ContentCandidate;

// Engagement base caps and divisors.
const LIKES_CAP: u64 = 10_000;
const LIKES_DIVISOR: u64 = 100;
const REPOSTS_CAP: u64 = 1_000;
const REPOSTS_DIVISOR: u64 = 10;

// Reply term. On high-reply channels a busy thread means a conversing author;
// elsewhere it means crowded competition for visibility.
const REPLIES_CAP: u64 = 500;
const REPLIES_DIVISOR: u64 = 10;
const CROWDED_REPLIES_PENALTY: i64 = 30;

// Recency tiers and the flat penalty past the max-age threshold.
const RECENCY_UNDER_1H: i64 = 50;
const RECENCY_UNDER_2H: i64 = 40;
const RECENCY_UNDER_4H: i64 = 20;
const RECENCY_UNDER_8H: i64 = 10;
const STALE_PENALTY: i64 = 30;

// Content-shape bonuses: a question invites a response, a stated opinion
// invites discussion.
const QUESTION_BONUS: i64 = 20;
const OPINION_BONUS: i64 = 15;

// Explicitly configured author priority.
const AUTHOR_PRIORITY_HIGH: i64 = 30;
const AUTHOR_PRIORITY_MEDIUM: i64 = 15;

// Author responsiveness tiers. Strongest single signal: the platform boosts
// visibility disproportionately when the original author engages back.
const RESPONSIVE_1_PLUS: i64 = 10;
const RESPONSIVE_3_PLUS: i64 = 25;
const RESPONSIVE_5_PLUS: i64 = 40;

// Engagement sweet spot: an author with a few hundred likes is far more
// likely to personally reply than one with tens of thousands.
const SWEET_SPOT_BONUS: i64 = 15;
const LIKES_CEILING_PENALTY: i64 = 15;

/// Max candidate age in hours before the stale penalty applies.
pub fn max_age_hours(curated: bool, cfg: &ScoringConfig) -> i64 {
    if curated {
        cfg.curated_max_age_hours
    } else {
        cfg.ordinary_max_age_hours
    }
}

/// Score one candidate. Pure over `(candidate, multiplier, cfg, now)`.
pub fn score(
    candidate: &ContentCandidate,
    multiplier: f64,
    cfg: &ScoringConfig,
    now: DateTime<Utc>,
) -> i64 {
    let e = &candidate.engagement;
    let mut total: i64 = 0;

    // Engagement base.
    total += (e.likes.min(LIKES_CAP) / LIKES_DIVISOR) as i64;
    total += (e.reposts.min(REPOSTS_CAP) / REPOSTS_DIVISOR) as i64;

    // Reply-count term.
    if candidate.tags.high_reply_channel {
        total += (e.replies.min(REPLIES_CAP) / REPLIES_DIVISOR) as i64;
    } else if e.replies > cfg.reply_crowd_ceiling {
        total -= CROWDED_REPLIES_PENALTY;
    }

    total += recency_bonus(candidate, cfg, now);

    // Content shape.
    if candidate.text.contains('?') {
        total += QUESTION_BONUS;
    }
    if has_opinion_phrase(&candidate.text, cfg) {
        total += OPINION_BONUS;
    }

    total += author_priority_bonus(&candidate.author, cfg);
    total += source_trust_bonus(candidate, cfg);
    total += responsiveness_bonus(candidate.tags.author_reply_count);

    // Sweet spot vs. ceiling on raw likes.
    if e.likes >= cfg.sweet_spot_min_likes && e.likes <= cfg.sweet_spot_max_likes {
        total += SWEET_SPOT_BONUS;
    } else if e.likes > cfg.likes_ceiling {
        total -= LIKES_CEILING_PENALTY;
    }

    ((total as f64) * multiplier).round() as i64
}

/// Tiered recency bonus decaying to a flat stale penalty. Unknown publication
/// time contributes nothing either way.
fn recency_bonus(candidate: &ContentCandidate, cfg: &ScoringConfig, now: DateTime<Utc>) -> i64 {
    let Some(age) = candidate.age(now) else {
        return 0;
    };
    let minutes = age.num_minutes().max(0);
    let max_age_min = max_age_hours(candidate.tags.curated, cfg) * 60;
    match minutes {
        m if m < 60 => RECENCY_UNDER_1H,
        m if m < 2 * 60 => RECENCY_UNDER_2H,
        m if m < 4 * 60 => RECENCY_UNDER_4H,
        m if m < 8 * 60 => RECENCY_UNDER_8H,
        m if m <= max_age_min => 0,
        _ => -STALE_PENALTY,
    }
}

fn has_opinion_phrase(text: &str, cfg: &ScoringConfig) -> bool {
    let lower = text.to_lowercase();
    cfg.opinion_phrases.iter().any(|p| lower.contains(p.as_str()))
}

fn author_priority_bonus(author: &str, cfg: &ScoringConfig) -> i64 {
    let matches = |list: &[String]| list.iter().any(|a| a.eq_ignore_ascii_case(author));
    if matches(&cfg.high_priority_authors) {
        AUTHOR_PRIORITY_HIGH
    } else if matches(&cfg.medium_priority_authors) {
        AUTHOR_PRIORITY_MEDIUM
    } else {
        0
    }
}

fn source_trust_bonus(candidate: &ContentCandidate, cfg: &ScoringConfig) -> i64 {
    let mut bonus = cfg
        .source_trust
        .get(&candidate.source_tag)
        .copied()
        .unwrap_or(0);
    if candidate.tags.high_reply_channel {
        bonus += cfg.high_reply_channel_bonus;
    }
    bonus
}

fn responsiveness_bonus(author_reply_count: Option<u32>) -> i64 {
    match author_reply_count {
        Some(n) if n >= 5 => RESPONSIVE_5_PLUS,
        Some(n) if n >= 3 => RESPONSIVE_3_PLUS,
        Some(n) if n >= 1 => RESPONSIVE_1_PLUS,
        _ => 0,
    }
}

/// Sort descending by score; ties broken by most recent `published_at`
/// (unknown timestamps last).
pub fn rank(candidates: &mut [ContentCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.published_at.cmp(&a.published_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::types::{CandidateTags, EngagementCounts};
    use chrono::{Duration, TimeZone};

    fn cfg() -> ScoringConfig {
        ScoringConfig::default()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn cand(text: &str) -> ContentCandidate {
        ContentCandidate {
            url: "https://x.example/p/1".into(),
            author: "alice".into(),
            text: text.into(),
            published_at: Some(now() - Duration::minutes(30)),
            engagement: EngagementCounts::default(),
            source_tag: "search:general".into(),
            tags: CandidateTags::default(),
            score: 0,
        }
    }

    #[test]
    fn identical_inputs_give_identical_scores() {
        let c = cand("Anyone else shipping Rust to prod?");
        let a = score(&c, 1.25, &cfg(), now());
        let b = score(&c, 1.25, &cfg(), now());
        assert_eq!(a, b);
    }

    #[test]
    fn engagement_base_is_capped() {
        let mut c = cand("plain");
        c.published_at = None;
        c.engagement.likes = 50_000; // ceiling penalty applies too
        c.engagement.reposts = 9_000;
        // likes 10000/100 = 100, reposts 1000/10 = 100, ceiling -15
        assert_eq!(score(&c, 1.0, &cfg(), now()), 100 + 100 - 15);
    }

    #[test]
    fn question_and_opinion_bonuses() {
        let base = score(&cand("plain statement"), 1.0, &cfg(), now());
        let q = score(&cand("plain statement?"), 1.0, &cfg(), now());
        let op = score(&cand("hot take: plain statement"), 1.0, &cfg(), now());
        assert_eq!(q - base, 20);
        assert_eq!(op - base, 15);
    }

    #[test]
    fn replies_reward_on_high_reply_channel_penalty_elsewhere() {
        let mut busy = cand("plain");
        busy.engagement.replies = 200;
        let crowded = score(&busy, 1.0, &cfg(), now());
        busy.tags.high_reply_channel = true;
        let conversing = score(&busy, 1.0, &cfg(), now());
        // crowded: -30; conversing: +200/10 plus the channel-variant bonus.
        assert_eq!(conversing - crowded, 30 + 20 + cfg().high_reply_channel_bonus);
    }

    #[test]
    fn recency_tiers_decay_to_stale_penalty() {
        let c = cfg();
        let mut x = cand("plain");
        let expect = [
            (30, 50),
            (90, 40),
            (3 * 60, 20),
            (7 * 60, 10),
            (10 * 60, 0),
            (13 * 60, -30),
        ];
        for (age_min, bonus) in expect {
            x.published_at = Some(now() - Duration::minutes(age_min));
            let fresh = score(&x, 1.0, &c, now());
            x.published_at = Some(now() - Duration::hours(10)); // 0-bonus band
            let neutral = score(&x, 1.0, &c, now());
            assert_eq!(fresh - neutral, bonus, "age {age_min}min");
        }
    }

    #[test]
    fn curated_sources_get_longer_age_allowance() {
        let c = cfg();
        let mut x = cand("plain");
        x.published_at = Some(now() - Duration::hours(18));
        let ordinary = score(&x, 1.0, &c, now());
        x.tags.curated = true;
        let curated = score(&x, 1.0, &c, now());
        assert_eq!(curated - ordinary, 30); // -30 stale vs 0 within 24h
    }

    #[test]
    fn author_priority_and_responsiveness_tiers() {
        let mut c = cfg();
        c.high_priority_authors = vec!["Alice".into()];
        let base_cfg = cfg();
        let x = cand("plain");
        assert_eq!(
            score(&x, 1.0, &c, now()) - score(&x, 1.0, &base_cfg, now()),
            30
        );

        let mut r = cand("plain");
        let baseline = score(&r, 1.0, &base_cfg, now());
        for (count, bonus) in [(1, 10), (3, 25), (5, 40), (12, 40)] {
            r.tags.author_reply_count = Some(count);
            assert_eq!(score(&r, 1.0, &base_cfg, now()) - baseline, bonus);
        }
    }

    #[test]
    fn sweet_spot_band() {
        let mut x = cand("plain");
        let base = score(&x, 1.0, &cfg(), now());
        x.engagement.likes = 300;
        // 300 likes add 3 base points plus the sweet-spot bonus.
        assert_eq!(score(&x, 1.0, &cfg(), now()) - base, 3 + 15);
    }

    #[test]
    fn multiplier_scales_final_score() {
        let x = cand("plain?");
        let unscaled = score(&x, 1.0, &cfg(), now());
        let scaled = score(&x, 1.5, &cfg(), now());
        assert_eq!(scaled, ((unscaled as f64) * 1.5).round() as i64);
    }

    #[test]
    fn rank_sorts_by_score_then_recency() {
        let mut a = cand("a");
        a.score = 50;
        a.published_at = Some(now() - Duration::hours(2));
        let mut b = cand("b");
        b.score = 50;
        b.published_at = Some(now() - Duration::hours(1));
        let mut c = cand("c");
        c.score = 80;
        let mut v = vec![a, b.clone(), c.clone()];
        rank(&mut v);
        assert_eq!(v[0].text, "c");
        assert_eq!(v[1].text, "b"); // more recent wins the tie
    }
}
