// tests/cycle_e2e.rs
// Full cycle against a temp-dir store: discovery -> scoring -> admission ->
// execution -> recording, including the rejected-candidate path and the
// never-act-twice guarantee across cycles.

use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use engagement_pacer::action::{
    ActionExecutor, ContentGenerator, DraftReply, ExecutionOutcome,
};
use engagement_pacer::config::AppConfig;
use engagement_pacer::discover::types::{
    CandidateTags, ContentCandidate, DiscoverySource, EngagementCounts,
};
use engagement_pacer::notify::NotifierMux;
use engagement_pacer::scheduler::Engine;
use engagement_pacer::store::{JsonFileStore, KnowledgeStore};

struct VecSource(Vec<ContentCandidate>);

#[async_trait::async_trait]
impl DiscoverySource for VecSource {
    async fn fetch_candidates(&self, max_count: usize) -> Result<Vec<ContentCandidate>> {
        let mut out = self.0.clone();
        out.truncate(max_count);
        Ok(out)
    }

    fn name(&self) -> &str {
        "test:vec"
    }
}

struct ScriptedExecutor {
    script: Mutex<VecDeque<ExecutionOutcome>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(script: Vec<ExecutionOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            executed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(&self, candidate: &ContentCandidate, _text: &str) -> Result<ExecutionOutcome> {
        self.executed.lock().unwrap().push(candidate.url.clone());
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or(ExecutionOutcome::Success))
    }
}

struct FixedGenerator;

#[async_trait::async_trait]
impl ContentGenerator for FixedGenerator {
    async fn draft(
        &self,
        _candidate: &ContentCandidate,
        _context: Option<&str>,
    ) -> Result<DraftReply> {
        Ok(DraftReply {
            text: "solid point".into(),
            language: "en".into(),
            style: "conversational".into(),
        })
    }
}

fn candidate(url: &str, author: &str, likes: u64) -> ContentCandidate {
    ContentCandidate {
        url: url.into(),
        author: author.into(),
        text: "what do people think about this".into(),
        published_at: Some(Utc::now() - Duration::minutes(30)),
        engagement: EngagementCounts {
            likes,
            replies: 10,
            reposts: 20,
        },
        source_tag: "search:general".into(),
        tags: CandidateTags::default(),
        score: 0,
    }
}

fn cfg_in(dir: &std::path::Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.data_dir = dir.to_string_lossy().into_owned();
    cfg
}

#[tokio::test]
async fn rejected_candidate_is_skipped_and_next_one_acted() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());

    // Higher-scored candidate gets rejected by the platform; the loop must
    // fall through to the runner-up without consuming quota on the failure.
    let top = candidate("https://x/top", "alice", 1500);
    let runner_up = candidate("https://x/runner-up", "bob", 120);
    let sources: Vec<Box<dyn DiscoverySource>> =
        vec![Box::new(VecSource(vec![top, runner_up]))];

    let mut engine = Engine::new(
        cfg.clone(),
        JsonFileStore::new(dir.path()),
        sources,
        Box::new(FixedGenerator),
        Box::new(ScriptedExecutor::new(vec![ExecutionOutcome::Rejected(
            "engagement restricted".into(),
        )])),
        NotifierMux::new(),
    )
    .await
    .unwrap();

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.stats.fetched, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.acted_url.as_deref(), Some("https://x/runner-up"));
    assert_eq!(engine.quota().actions_taken, 1);

    // Durable trace: one action record, the rejection remembered separately.
    let store = JsonFileStore::new(dir.path());
    let actions = store.actions().await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].candidate_url, "https://x/runner-up");
    let horizon = Utc::now() - Duration::days(180);
    let acted = store.acted_urls_since(horizon).await.unwrap();
    assert!(acted.contains("https://x/top"));
    assert!(acted.contains("https://x/runner-up"));
}

#[tokio::test]
async fn never_acts_twice_on_the_same_url() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());

    let make_sources = || -> Vec<Box<dyn DiscoverySource>> {
        vec![Box::new(VecSource(vec![
            candidate("https://x/1", "alice", 300),
            candidate("https://x/2", "bob", 200),
        ]))]
    };

    let mut engine = Engine::new(
        cfg.clone(),
        JsonFileStore::new(dir.path()),
        make_sources(),
        Box::new(FixedGenerator),
        Box::new(ScriptedExecutor::new(vec![])),
        NotifierMux::new(),
    )
    .await
    .unwrap();

    let first = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(first.acted_url.as_deref(), Some("https://x/1"));

    // Same feed again: the acted url is filtered, the runner-up is acted.
    let second = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(second.acted_url.as_deref(), Some("https://x/2"));
    // The acted url resurfaces via the durable store, not the day counter.
    assert_eq!(second.stats.historical_repeats, 1);

    // Third pass has nothing left.
    let third = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(third.acted_url, None);
    assert_eq!(engine.quota().actions_taken, 2);
}

#[tokio::test]
async fn restart_resumes_quota_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());

    {
        let mut engine = Engine::new(
            cfg.clone(),
            JsonFileStore::new(dir.path()),
            vec![Box::new(VecSource(vec![candidate(
                "https://x/1",
                "alice",
                300,
            )])) as Box<dyn DiscoverySource>],
            Box::new(FixedGenerator),
            Box::new(ScriptedExecutor::new(vec![])),
            NotifierMux::new(),
        )
        .await
        .unwrap();
        engine.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(engine.quota().actions_taken, 1);
    }

    // A fresh engine over the same data dir picks the day's counters back up
    // and refuses to re-engage the same url.
    let mut engine = Engine::new(
        cfg,
        JsonFileStore::new(dir.path()),
        vec![Box::new(VecSource(vec![candidate(
            "https://x/1",
            "alice",
            300,
        )])) as Box<dyn DiscoverySource>],
        Box::new(FixedGenerator),
        Box::new(ScriptedExecutor::new(vec![])),
        NotifierMux::new(),
    )
    .await
    .unwrap();
    assert_eq!(engine.quota().actions_taken, 1);
    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.acted_url, None);
    assert!(report.stats.historical_repeats + report.stats.same_day >= 1);
}

#[tokio::test]
async fn collector_outcomes_reach_source_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());

    let make_sources = || -> Vec<Box<dyn DiscoverySource>> {
        vec![Box::new(VecSource(vec![candidate(
            "https://x/1",
            "alice",
            300,
        )]))]
    };

    let mut engine = Engine::new(
        cfg.clone(),
        JsonFileStore::new(dir.path()),
        make_sources(),
        Box::new(FixedGenerator),
        Box::new(ScriptedExecutor::new(vec![])),
        NotifierMux::new(),
    )
    .await
    .unwrap();
    engine.run_cycle(Utc::now()).await.unwrap();

    // The external collector polls the platform later and stamps the outcome.
    let collector_store = JsonFileStore::new(dir.path());
    let id = collector_store.actions().await.unwrap()[0].id.clone();
    collector_store
        .update_outcome(
            &id,
            &engagement_pacer::action::ActionOutcome {
                likes: Some(50),
                replies_received: Some(1),
                author_responded: Some(true),
                checked_at: None,
            },
        )
        .await
        .unwrap();

    // The next cycle's refresh folds the outcome into the aggregates.
    engine.run_cycle(Utc::now()).await.unwrap();
    let rec = &engine.tracker().records()["search:general"];
    assert_eq!(rec.actions_taken, 1);
    assert_eq!(rec.total_likes, 50);
    assert_eq!(rec.author_responses, 1);

    // And a restarted engine over the same data dir sees it too.
    drop(engine);
    let engine = Engine::new(
        cfg,
        JsonFileStore::new(dir.path()),
        make_sources(),
        Box::new(FixedGenerator),
        Box::new(ScriptedExecutor::new(vec![])),
        NotifierMux::new(),
    )
    .await
    .unwrap();
    let rec = &engine.tracker().records()["search:general"];
    assert_eq!((rec.author_responses, rec.total_likes), (1, 50));
}

#[tokio::test]
async fn external_follow_estimates_survive_tracker_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());

    // An external feeder persists a follow estimate alongside stale counts.
    let feeder_store = JsonFileStore::new(dir.path());
    let mut stats = std::collections::HashMap::new();
    stats.insert(
        "search:general".to_string(),
        engagement_pacer::performance::SourcePerformanceRecord {
            actions_taken: 99,
            total_likes: 999,
            author_responses: 99,
            estimated_follow_gain: 2.0,
            performance_score: 0.0,
        },
    );
    feeder_store.save_source_stats(&stats).await.unwrap();

    let mut engine = Engine::new(
        cfg,
        JsonFileStore::new(dir.path()),
        vec![Box::new(VecSource(vec![candidate(
            "https://x/1",
            "alice",
            300,
        )])) as Box<dyn DiscoverySource>],
        Box::new(FixedGenerator),
        Box::new(ScriptedExecutor::new(vec![])),
        NotifierMux::new(),
    )
    .await
    .unwrap();
    engine.run_cycle(Utc::now()).await.unwrap();

    // History is authoritative for counts; the estimate is adopted as-is,
    // including through the post-action aggregate save.
    let rec = &engine.tracker().records()["search:general"];
    assert_eq!(rec.actions_taken, 1);
    assert!((rec.estimated_follow_gain - 2.0).abs() < 1e-9);

    let persisted = JsonFileStore::new(dir.path()).source_stats().await.unwrap();
    assert_eq!(persisted["search:general"].actions_taken, 1);
    assert!((persisted["search:general"].estimated_follow_gain - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn retryable_failure_moves_to_next_candidate_without_recording() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());

    let mut engine = Engine::new(
        cfg,
        JsonFileStore::new(dir.path()),
        vec![Box::new(VecSource(vec![
            candidate("https://x/flaky", "alice", 1500),
            candidate("https://x/ok", "bob", 120),
        ])) as Box<dyn DiscoverySource>],
        Box::new(FixedGenerator),
        Box::new(ScriptedExecutor::new(vec![
            ExecutionOutcome::RetryableFailure("timeout".into()),
        ])),
        NotifierMux::new(),
    )
    .await
    .unwrap();

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.acted_url.as_deref(), Some("https://x/ok"));
    assert_eq!(engine.quota().actions_taken, 1);

    // The flaky url is not in the rejected set; it may come back next cycle.
    let store = JsonFileStore::new(dir.path());
    let acted = store
        .acted_urls_since(Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert!(!acted.contains("https://x/flaky"));
}
