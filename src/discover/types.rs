// src/discover/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Raw engagement counters as reported by the discovery adapter.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EngagementCounts {
    pub likes: u64,
    pub replies: u64,
    pub reposts: u64,
}

/// Source-specific flags attached by the adapter that produced the candidate.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CandidateTags {
    /// Curated channels (lists, hand-picked feeds) get a longer age allowance.
    #[serde(default)]
    pub curated: bool,
    /// Channel where a high reply count signals a conversing author rather
    /// than crowded competition.
    #[serde(default)]
    pub high_reply_channel: bool,
    /// Result of a prior explicit check of how often this author replied back
    /// on the thread. `None` when no check was performed.
    #[serde(default)]
    pub author_reply_count: Option<u32>,
}

/// One discoverable unit of engageable content.
///
/// Unique by `url` within a discovery cycle. Immutable except for `score`,
/// which is a pure function of the other fields plus the current source
/// performance multiplier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ContentCandidate {
    pub url: String, // globally unique key
    pub author: String,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub engagement: EngagementCounts,
    /// Discovery channel + sub-channel, e.g. "search:rustlang" or
    /// "list:curated-devs".
    pub source_tag: String,
    #[serde(default)]
    pub tags: CandidateTags,
    /// Derived; assigned by the scoring engine before final ranking.
    #[serde(default)]
    pub score: i64,
}

impl ContentCandidate {
    /// Age relative to `now`; `None` when the adapter did not report a
    /// publication time.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.published_at.map(|ts| now.signed_duration_since(ts))
    }
}

/// External discovery adapter. Tagged with a stable `source_tag` through the
/// candidates it returns; transient failures surface as errors and the
/// aggregator logs them without aborting the cycle.
#[async_trait::async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn fetch_candidates(&self, max_count: usize) -> Result<Vec<ContentCandidate>>;
    fn name(&self) -> &str;
}
