//! # Knowledge Store
//!
//! Durable record of past actions and their outcomes plus the small pacing
//! state file. The JSON-file implementation keeps one record map keyed by
//! action id, one aggregate map keyed by source tag, one rejected-url set,
//! and one state file for `PacingState`/`DailyQuotaState`. Writes go through
//! a temp file + rename; appends are idempotent by id so an at-least-once
//! retry never double-counts.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::action::{ActionOutcome, ActionRecord};
use crate::admission::DailyQuotaState;
use crate::pacing::PacingState;
use crate::performance::SourcePerformanceRecord;

const ACTIONS_FILE: &str = "actions.json";
const PERFORMANCE_FILE: &str = "performance.json";
const REJECTED_FILE: &str = "rejected.json";
const STATE_FILE: &str = "state.json";

#[async_trait::async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Idempotent append keyed by `record.id`.
    async fn append(&self, record: &ActionRecord) -> Result<()>;
    /// Replace the outcome of an existing record; stamps `checked_at` when
    /// the collector did not.
    async fn update_outcome(&self, id: &str, outcome: &ActionOutcome) -> Result<()>;
    /// Urls acted on since `horizon`, plus permanently rejected urls.
    async fn acted_urls_since(&self, horizon: DateTime<Utc>) -> Result<HashSet<String>>;
    async fn actions(&self) -> Result<Vec<ActionRecord>>;
    async fn source_stats(&self) -> Result<HashMap<String, SourcePerformanceRecord>>;
    async fn save_source_stats(
        &self,
        stats: &HashMap<String, SourcePerformanceRecord>,
    ) -> Result<()>;
    /// Remember a candidate the platform rejected terminally so it is never
    /// retried, even across restarts.
    async fn mark_rejected(&self, url: &str) -> Result<()>;
    /// Bulk purge of records older than the retention horizon. Returns the
    /// number removed.
    async fn purge_before(&self, horizon: DateTime<Utc>) -> Result<usize>;
}

/// JSON-file store rooted in one directory.
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-modify-write sequences; the control loop is the single
    // writer but an outcome collector may share the store.
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn read_or_default<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T> {
        let path = self.path(file);
        match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        write_json_atomic(&self.path(file), value).await
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(value).context("serializing store file")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[async_trait::async_trait]
impl KnowledgeStore for JsonFileStore {
    async fn append(&self, record: &ActionRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut actions: BTreeMap<String, ActionRecord> =
            self.read_or_default(ACTIONS_FILE).await?;
        if actions.contains_key(&record.id) {
            return Ok(()); // retried at-least-once write
        }
        actions.insert(record.id.clone(), record.clone());
        self.write_json(ACTIONS_FILE, &actions).await
    }

    async fn update_outcome(&self, id: &str, outcome: &ActionOutcome) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut actions: BTreeMap<String, ActionRecord> =
            self.read_or_default(ACTIONS_FILE).await?;
        let Some(record) = actions.get_mut(id) else {
            bail!("no action record with id {id}");
        };
        record.outcome = outcome.clone();
        if record.outcome.checked_at.is_none() {
            record.outcome.checked_at = Some(Utc::now());
        }
        self.write_json(ACTIONS_FILE, &actions).await
    }

    async fn acted_urls_since(&self, horizon: DateTime<Utc>) -> Result<HashSet<String>> {
        let _guard = self.lock.lock().await;
        let actions: BTreeMap<String, ActionRecord> = self.read_or_default(ACTIONS_FILE).await?;
        let rejected: BTreeSet<String> = self.read_or_default(REJECTED_FILE).await?;
        let mut urls: HashSet<String> = actions
            .values()
            .filter(|r| r.taken_at >= horizon)
            .map(|r| r.candidate_url.clone())
            .collect();
        urls.extend(rejected);
        Ok(urls)
    }

    async fn actions(&self) -> Result<Vec<ActionRecord>> {
        let _guard = self.lock.lock().await;
        let actions: BTreeMap<String, ActionRecord> = self.read_or_default(ACTIONS_FILE).await?;
        Ok(actions.into_values().collect())
    }

    async fn source_stats(&self) -> Result<HashMap<String, SourcePerformanceRecord>> {
        let _guard = self.lock.lock().await;
        self.read_or_default(PERFORMANCE_FILE).await
    }

    async fn save_source_stats(
        &self,
        stats: &HashMap<String, SourcePerformanceRecord>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        // BTreeMap keeps the file diff-stable.
        let ordered: BTreeMap<&String, &SourcePerformanceRecord> = stats.iter().collect();
        self.write_json(PERFORMANCE_FILE, &ordered).await
    }

    async fn mark_rejected(&self, url: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rejected: BTreeSet<String> = self.read_or_default(REJECTED_FILE).await?;
        if rejected.insert(url.to_string()) {
            self.write_json(REJECTED_FILE, &rejected).await?;
        }
        Ok(())
    }

    async fn purge_before(&self, horizon: DateTime<Utc>) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut actions: BTreeMap<String, ActionRecord> =
            self.read_or_default(ACTIONS_FILE).await?;
        let before = actions.len();
        actions.retain(|_, r| r.taken_at >= horizon);
        let removed = before - actions.len();
        if removed > 0 {
            self.write_json(ACTIONS_FILE, &actions).await?;
        }
        Ok(removed)
    }
}

/// Everything the scheduler needs to survive a mid-day restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    pub pacing: PacingState,
    pub quota: DailyQuotaState,
}

impl PersistedState {
    pub fn fresh(today: NaiveDate) -> Self {
        Self {
            pacing: PacingState::new(today),
            quota: DailyQuotaState::new(today),
        }
    }
}

/// Small state file for `PacingState` + `DailyQuotaState`, written after
/// every mutation.
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE),
        }
    }

    /// Missing or unreadable state yields a fresh day; corruption is logged,
    /// not fatal, since the store is the durable source of truth.
    pub async fn load(&self, today: NaiveDate) -> PersistedState {
        match fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = ?e, path = %self.path.display(), "corrupt state file, starting fresh");
                    PersistedState::fresh(today)
                }
            },
            Err(_) => PersistedState::fresh(today),
        }
    }

    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        write_json_atomic(&self.path, state).await
    }
}
