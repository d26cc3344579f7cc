// src/discover/mod.rs
pub mod static_source;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::admission::DailyQuotaState;
use crate::config::AppConfig;
use crate::scoring;
use types::{ContentCandidate, DiscoverySource};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "discovery_fetched_total",
            "Candidates returned by source adapters."
        );
        describe_counter!(
            "discovery_kept_total",
            "Candidates surviving dedup + filters."
        );
        describe_counter!(
            "discovery_dedup_total",
            "Candidates removed as duplicate urls within a cycle."
        );
        describe_counter!(
            "discovery_filtered_total",
            "Candidates dropped by history/quota/quality filters."
        );
        describe_counter!(
            "discovery_source_errors_total",
            "Source adapter fetch errors."
        );
        describe_gauge!(
            "discovery_last_run_ts",
            "Unix ts when discovery last ran."
        );
    });
}

/// Normalize candidate text: decode HTML entities, strip tags, collapse
/// whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1_000 {
        out = out.chars().take(1_000).collect();
    }
    out
}

/// Breakdown of one discovery pass, for logging and the daily summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    pub fetched: usize,
    pub duplicates: usize,
    pub historical_repeats: usize,
    pub same_day: usize,
    pub author_capped: usize,
    pub low_quality: usize,
    pub kept: usize,
}

/// Apply the filter pipeline in order: url dedup (first occurrence wins),
/// historical-repeat, same-day, per-author daily cap, static quality
/// (minimum engagement, maximum age with a longer curated allowance).
/// Pure over adapter output plus read-only state.
pub fn dedup_and_filter(
    raw: Vec<ContentCandidate>,
    acted_urls: &HashSet<String>,
    quota: &DailyQuotaState,
    cfg: &AppConfig,
    now: DateTime<Utc>,
) -> (Vec<ContentCandidate>, FilterStats) {
    let mut stats = FilterStats {
        fetched: raw.len(),
        ..Default::default()
    };
    let max_per_author = cfg.quota.max_per_author_per_day;

    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(raw.len());

    for candidate in raw {
        if !seen_urls.insert(candidate.url.clone()) {
            stats.duplicates += 1;
            continue;
        }
        if acted_urls.contains(&candidate.url) {
            stats.historical_repeats += 1;
            continue;
        }
        if quota.acted_today(&candidate.url) {
            stats.same_day += 1;
            continue;
        }
        if quota.author_count(&candidate.author) >= max_per_author {
            stats.author_capped += 1;
            continue;
        }
        if !passes_quality(&candidate, cfg, now) {
            stats.low_quality += 1;
            continue;
        }
        kept.push(candidate);
    }

    stats.kept = kept.len();
    (kept, stats)
}

/// Static quality gate: minimum total engagement and a maximum age that is
/// longer for curated sources. Unknown publication time passes the age check.
fn passes_quality(candidate: &ContentCandidate, cfg: &AppConfig, now: DateTime<Utc>) -> bool {
    let e = &candidate.engagement;
    if e.likes + e.reposts < cfg.discovery.min_engagement {
        return false;
    }
    if let Some(age) = candidate.age(now) {
        let max_hours = scoring::max_age_hours(candidate.tags.curated, &cfg.scoring);
        if age.num_hours() > max_hours {
            return false;
        }
    }
    true
}

/// At most one candidate per author survives into the admitted shortlist,
/// keeping the highest-scored one. Input must already be ranked descending.
pub fn diversify(ranked: Vec<ContentCandidate>) -> Vec<ContentCandidate> {
    let mut seen_authors: HashSet<String> = HashSet::new();
    ranked
        .into_iter()
        .filter(|c| seen_authors.insert(c.author.to_ascii_lowercase()))
        .collect()
}

/// Run one discovery pass over all adapters. A failing adapter contributes
/// zero candidates and is logged; if all fail the cycle simply yields an
/// empty set (a no-op cycle, not an error).
pub async fn gather(
    sources: &[Box<dyn DiscoverySource>],
    acted_urls: &HashSet<String>,
    quota: &DailyQuotaState,
    cfg: &AppConfig,
    now: DateTime<Utc>,
) -> (Vec<ContentCandidate>, FilterStats) {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for source in sources {
        match source.fetch_candidates(cfg.discovery.per_source_limit).await {
            Ok(mut batch) => {
                for c in &mut batch {
                    c.text = normalize_text(&c.text);
                }
                raw.append(&mut batch);
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = source.name(), "discovery source error");
                counter!("discovery_source_errors_total").increment(1);
            }
        }
    }

    let (kept, stats) = dedup_and_filter(raw, acted_urls, quota, cfg, now);

    counter!("discovery_fetched_total").increment(stats.fetched as u64);
    counter!("discovery_kept_total").increment(stats.kept as u64);
    counter!("discovery_dedup_total").increment(stats.duplicates as u64);
    counter!("discovery_filtered_total").increment(
        (stats.historical_repeats + stats.same_day + stats.author_capped + stats.low_quality)
            as u64,
    );
    gauge!("discovery_last_run_ts").set(now.timestamp() as f64);

    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use types::{CandidateTags, EngagementCounts};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn cand(url: &str, author: &str) -> ContentCandidate {
        ContentCandidate {
            url: url.into(),
            author: author.into(),
            text: "hello".into(),
            published_at: Some(now() - Duration::hours(1)),
            engagement: EngagementCounts {
                likes: 50,
                replies: 2,
                reposts: 5,
            },
            source_tag: "search:general".into(),
            tags: CandidateTags::default(),
            score: 0,
        }
    }

    fn cfg() -> AppConfig {
        AppConfig::default()
    }

    fn empty_quota() -> DailyQuotaState {
        DailyQuotaState::new(now().date_naive())
    }

    #[test]
    fn duplicate_urls_first_occurrence_wins() {
        let mut a = cand("https://x/1", "alice");
        a.source_tag = "search:general".into();
        let mut b = cand("https://x/1", "alice");
        b.source_tag = "list:curated".into();
        let (kept, stats) =
            dedup_and_filter(vec![a, b], &HashSet::new(), &empty_quota(), &cfg(), now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_tag, "search:general");
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn historical_and_same_day_urls_are_dropped() {
        let acted: HashSet<String> = ["https://x/old".to_string()].into();
        let mut quota = empty_quota();
        quota.record_action("someone", "en", "https://x/today");

        let raw = vec![
            cand("https://x/old", "a"),
            cand("https://x/today", "b"),
            cand("https://x/new", "c"),
        ];
        let (kept, stats) = dedup_and_filter(raw, &acted, &quota, &cfg(), now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://x/new");
        assert_eq!(stats.historical_repeats, 1);
        assert_eq!(stats.same_day, 1);
    }

    #[test]
    fn capped_authors_are_dropped_before_scoring() {
        let mut quota = empty_quota();
        for i in 0..3 {
            quota.record_action("bob", "en", &format!("https://x/{i}"));
        }
        let raw = vec![cand("https://x/new", "bob"), cand("https://x/other", "eve")];
        let (kept, stats) = dedup_and_filter(raw, &HashSet::new(), &quota, &cfg(), now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].author, "eve");
        assert_eq!(stats.author_capped, 1);
    }

    #[test]
    fn quality_gate_engagement_and_age() {
        let mut weak = cand("https://x/weak", "a");
        weak.engagement = EngagementCounts::default();

        let mut stale = cand("https://x/stale", "b");
        stale.published_at = Some(now() - Duration::hours(20));

        let mut stale_curated = cand("https://x/curated", "c");
        stale_curated.published_at = Some(now() - Duration::hours(20));
        stale_curated.tags.curated = true;

        let mut unknown_ts = cand("https://x/unknown", "d");
        unknown_ts.published_at = None;

        let raw = vec![weak, stale, stale_curated, unknown_ts];
        let (kept, stats) = dedup_and_filter(raw, &HashSet::new(), &empty_quota(), &cfg(), now());
        let urls: Vec<&str> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/curated", "https://x/unknown"]);
        assert_eq!(stats.low_quality, 2);
    }

    #[test]
    fn diversify_keeps_highest_scored_per_author() {
        let mut first = cand("https://x/1", "alice");
        first.score = 90;
        let mut second = cand("https://x/2", "Alice"); // case-insensitive
        second.score = 40;
        let mut other = cand("https://x/3", "bob");
        other.score = 70;
        let out = diversify(vec![first, other, second]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://x/1");
        assert_eq!(out[1].url, "https://x/3");
    }

    #[test]
    fn normalize_text_strips_markup_and_whitespace() {
        let s = "  Shipping&nbsp;<b>Rust</b> to\n\nprod  ";
        assert_eq!(normalize_text(s), "Shipping Rust to prod");
    }
}
