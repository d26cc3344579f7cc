//! # Actions & external collaborators
//!
//! `ActionRecord` is the durable trace of one engagement action; the
//! generator and executor traits are the narrow contracts to the external
//! drafting and platform layers. The engine never inspects generation
//! internals, it only records the returned language/style.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::discover::types::ContentCandidate;

/// Post-action engagement metrics, polled later by an external collector.
/// All fields start `None`; `checked_at` marks that a poll happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionOutcome {
    pub likes: Option<u64>,
    pub replies_received: Option<u64>,
    pub author_responded: Option<bool>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl ActionOutcome {
    pub fn is_checked(&self) -> bool {
        self.checked_at.is_some()
    }
}

/// One historical engagement action. Created when an admitted action
/// executes successfully; never deleted individually, purged in bulk after
/// the retention horizon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub id: String,
    pub taken_at: DateTime<Utc>,
    pub candidate_url: String,
    pub author: String,
    pub source_tag: String,
    pub language: String,
    pub style: String,
    #[serde(default)]
    pub outcome: ActionOutcome,
}

impl ActionRecord {
    pub fn new(
        candidate: &ContentCandidate,
        language: &str,
        style: &str,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: action_id(&candidate.url, taken_at),
            taken_at,
            candidate_url: candidate.url.clone(),
            author: candidate.author.clone(),
            source_tag: candidate.source_tag.clone(),
            language: language.to_string(),
            style: style.to_string(),
            outcome: ActionOutcome::default(),
        }
    }
}

/// Stable id so at-least-once store writes stay idempotent: a retried write
/// of the same action maps to the same key.
pub fn action_id(url: &str, taken_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(taken_at.timestamp().to_be_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(12)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Tri-state result of attempting the engagement action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Performed; the caller records it and consumes quota.
    Success,
    /// Transient (navigation/network); try the next ranked candidate.
    RetryableFailure(String),
    /// Engagement restricted for this candidate; never retry it and do not
    /// count it against quota.
    Rejected(String),
}

/// One drafted response plus what the drafting layer detected about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftReply {
    pub text: String,
    pub language: String,
    pub style: String,
}

/// External drafting layer; invoked only after a candidate is admitted.
#[async_trait::async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn draft(
        &self,
        candidate: &ContentCandidate,
        context: Option<&str>,
    ) -> Result<DraftReply>;
}

/// External platform layer performing the engagement action.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, candidate: &ContentCandidate, text: &str) -> Result<ExecutionOutcome>;
}

/// Executor that logs instead of touching any platform, so the binary and
/// tests can run the full loop end to end.
pub struct DryRunExecutor;

#[async_trait::async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(&self, candidate: &ContentCandidate, text: &str) -> Result<ExecutionOutcome> {
        tracing::info!(
            url = %candidate.url,
            author = %candidate.author,
            reply_len = text.len(),
            "dry-run: would engage"
        );
        Ok(ExecutionOutcome::Success)
    }
}

/// Canned-template generator. Real deployments plug an LLM-backed
/// implementation behind the same trait.
pub struct TemplateGenerator;

#[async_trait::async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn draft(
        &self,
        candidate: &ContentCandidate,
        _context: Option<&str>,
    ) -> Result<DraftReply> {
        Ok(DraftReply {
            text: format!("Interesting point, @{} - tell me more?", candidate.author),
            language: "en".to_string(),
            style: "conversational".to_string(),
        })
    }
}
