//! # Pacing Scheduler
//!
//! The top-level control loop: `WaitingForWindow -> Active -> Cooldown ->
//! Active -> ...` with side transitions into `ConflictAvoidance` and
//! `DailySummary`. Planning is a pure function over `(config, state, now)`;
//! the loop only executes the planned step, so the whole state machine is
//! unit-testable without wall-clock delays.
//!
//! Within a cycle the order is always aggregation -> scoring -> admission.
//! Admission and recording are separate steps: quota is consumed only after
//! the external executor reports success.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::action::{ActionExecutor, ActionRecord, ContentGenerator, ExecutionOutcome};
use crate::admission::{AdmissionController, AdmissionVerdict, DailyQuotaState};
use crate::config::AppConfig;
use crate::discover::{self, types::DiscoverySource, FilterStats};
use crate::notify::{NotificationEvent, NotifierMux};
use crate::pacing::{self, PacingState};
use crate::performance::SourcePerformanceTracker;
use crate::scoring;
use crate::store::{KnowledgeStore, PersistedState, StateFile};

/// Named scheduler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForWindow,
    Active,
    Cooldown,
    ConflictAvoidance,
    DailySummary,
}

/// What the loop should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Sleep { phase: Phase, wait: Duration },
    RunCycle,
    SendSummary,
}

/// Decide the next step. Pure over its inputs.
pub fn plan(
    cfg: &AppConfig,
    state: &PacingState,
    quota: &DailyQuotaState,
    now: DateTime<Utc>,
) -> Step {
    if pacing::summary_due(&cfg.pacing, state, now) {
        return Step::SendSummary;
    }
    if !pacing::in_operating_window(&cfg.pacing, now) {
        return Step::Sleep {
            phase: Phase::WaitingForWindow,
            wait: Duration::from_secs(cfg.pacing.idle_poll_minutes * 60),
        };
    }
    if let Some(wait) = pacing::conflict_wait(&cfg.pacing, now) {
        return Step::Sleep {
            phase: Phase::ConflictAvoidance,
            wait: wait.to_std().unwrap_or(Duration::from_secs(60)),
        };
    }
    if quota.actions_taken >= cfg.quota.daily_max {
        // Quota exhaustion is a normal terminal state for the day, not an
        // error; keep polling coarsely until rollover.
        return Step::Sleep {
            phase: Phase::Cooldown,
            wait: Duration::from_secs(cfg.pacing.idle_poll_minutes * 60),
        };
    }
    Step::RunCycle
}

/// Outcome of one discovery/admission cycle, for logging and summaries.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub stats: FilterStats,
    pub shortlist: usize,
    pub acted_url: Option<String>,
    pub rejected: usize,
    pub retried: usize,
}

pub struct Engine<S: KnowledgeStore> {
    cfg: AppConfig,
    store: S,
    sources: Vec<Box<dyn DiscoverySource>>,
    generator: Box<dyn ContentGenerator>,
    executor: Box<dyn ActionExecutor>,
    notifier: NotifierMux,
    admission: AdmissionController,
    tracker: SourcePerformanceTracker,
    state_file: StateFile,
    pacing: PacingState,
    quota: DailyQuotaState,
}

impl<S: KnowledgeStore> Engine<S> {
    pub async fn new(
        cfg: AppConfig,
        store: S,
        sources: Vec<Box<dyn DiscoverySource>>,
        generator: Box<dyn ContentGenerator>,
        executor: Box<dyn ActionExecutor>,
        notifier: NotifierMux,
    ) -> Result<Self> {
        cfg.validate()?;

        let now = Utc::now();
        let today = pacing::local(&cfg.pacing, now).date_naive();
        let state_file = StateFile::new(Path::new(&cfg.data_dir));
        let PersistedState { mut pacing, mut quota } = state_file.load(today).await;
        pacing.rollover_if_new_day(today);
        quota.rollover_if_new_day(today);

        let horizon = now - chrono::Duration::days(cfg.retention_days);
        match store.purge_before(horizon).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(purged = n, "retention purge"),
            Err(e) => tracing::warn!(error = ?e, "retention purge failed"),
        }

        let tracker = Self::load_tracker(&store, cfg.min_sample_size).await;

        Ok(Self {
            admission: AdmissionController::new(cfg.quota),
            cfg,
            store,
            sources,
            generator,
            executor,
            notifier,
            tracker,
            state_file,
            pacing,
            quota,
        })
    }

    pub fn quota(&self) -> &DailyQuotaState {
        &self.quota
    }

    pub fn pacing_state(&self) -> &PacingState {
        &self.pacing
    }

    pub fn tracker(&self) -> &SourcePerformanceTracker {
        &self.tracker
    }

    /// Rebuild the tracker from the action history, which is authoritative
    /// for counts, likes and author responses (the collector folds polled
    /// outcomes into it via `update_outcome`). The persisted aggregate
    /// contributes only the externally fed follow estimates.
    async fn load_tracker(store: &S, min_sample_size: u32) -> SourcePerformanceTracker {
        let mut tracker = match store.actions().await {
            Ok(actions) => {
                SourcePerformanceTracker::rebuild_from_actions(actions.iter(), min_sample_size)
            }
            Err(e) => {
                tracing::warn!(error = ?e, "action history unreadable; tracker starts cold");
                SourcePerformanceTracker::new(min_sample_size)
            }
        };
        match store.source_stats().await {
            Ok(stats) => tracker.merge_follow_gains(&stats),
            Err(e) => tracing::warn!(error = ?e, "source stats unreadable; follow estimates skipped"),
        }
        tracker
    }

    /// Run until `shutdown` resolves. An in-flight cycle finishes before the
    /// loop exits; state is persisted on the way out.
    pub async fn run(mut self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        tokio::pin!(shutdown);
        tracing::info!(
            window = %format!(
                "{:02}-{:02}",
                self.cfg.pacing.start_hour, self.cfg.pacing.end_hour
            ),
            sources = self.sources.len(),
            "scheduler started"
        );

        loop {
            let now = Utc::now();
            self.rollover(now).await;

            match plan(&self.cfg, &self.pacing, &self.quota, now) {
                Step::SendSummary => {
                    tracing::debug!(phase = ?Phase::DailySummary, "sending daily summary");
                    self.send_daily_summary(now).await;
                }
                Step::RunCycle => {
                    match self.run_cycle(now).await {
                        Ok(report) => {
                            tracing::info!(
                                fetched = report.stats.fetched,
                                kept = report.stats.kept,
                                shortlist = report.shortlist,
                                acted = report.acted_url.as_deref().unwrap_or("-"),
                                rejected = report.rejected,
                                retried = report.retried,
                                "cycle complete"
                            );
                        }
                        Err(e) => {
                            // Top-level catch: the loop survives anything
                            // short of a startup configuration error.
                            tracing::error!(error = ?e, "cycle failed");
                            self.quota.record_error();
                            self.persist_state().await;
                        }
                    }
                    let wait = pacing::cycle_interval(
                        &self.cfg.pacing,
                        self.cfg.quota.daily_normal,
                        self.quota.actions_taken,
                        Utc::now(),
                        pacing::sample_jitter(&self.cfg.pacing),
                    );
                    tracing::debug!(phase = ?Phase::Cooldown, wait_secs = wait.as_secs(), "cooldown");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Step::Sleep { phase, wait } => {
                    tracing::debug!(phase = ?phase, wait_secs = wait.as_secs(), "sleeping");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        tracing::info!("shutdown signal received; persisting state");
        self.persist_state().await;
        Ok(())
    }

    /// One discovery/admission cycle: aggregate, score, rank, diversify,
    /// then walk the shortlist until one action succeeds.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        // Refresh the learning loop so outcomes the collector stamped since
        // the last cycle reach the aggregates. A slightly stale multiplier
        // is fine, so read failures only log.
        self.tracker = Self::load_tracker(&self.store, self.cfg.min_sample_size).await;

        let horizon = now - chrono::Duration::days(self.cfg.retention_days);
        let acted_urls = self
            .store
            .acted_urls_since(horizon)
            .await
            .context("querying acted urls")?;

        let (mut candidates, stats) =
            discover::gather(&self.sources, &acted_urls, &self.quota, &self.cfg, now).await;

        let mut report = CycleReport {
            stats,
            ..Default::default()
        };
        if candidates.is_empty() {
            return Ok(report); // no-op cycle
        }

        for candidate in &mut candidates {
            let multiplier = self.tracker.priority_multiplier(&candidate.source_tag);
            candidate.score = scoring::score(candidate, multiplier, &self.cfg.scoring, now);
        }
        scoring::rank(&mut candidates);
        let mut shortlist = discover::diversify(candidates);
        shortlist.truncate(self.cfg.discovery.target_count);
        report.shortlist = shortlist.len();

        for candidate in &shortlist {
            match self
                .admission
                .evaluate(&self.quota, &candidate.author, candidate.score)
            {
                AdmissionVerdict::AtDailyMax => break,
                // Sorted descending: if this one misses the quality bar, the
                // rest will too.
                AdmissionVerdict::BelowQuality => break,
                AdmissionVerdict::AuthorCapped => continue,
                AdmissionVerdict::Admitted => {}
            }

            let context = match self.quota.author_count(&candidate.author) {
                0 => None,
                n => Some(format!("already engaged @{} {n}x today", candidate.author)),
            };
            let draft = match self.generator.draft(candidate, context.as_deref()).await {
                Ok(draft) => draft,
                Err(e) => {
                    tracing::warn!(error = ?e, url = %candidate.url, "draft failed");
                    report.retried += 1;
                    continue;
                }
            };

            match self.executor.execute(candidate, &draft.text).await {
                Ok(ExecutionOutcome::Success) => {
                    self.record_success(candidate, &draft.language, &draft.style, now)
                        .await;
                    report.acted_url = Some(candidate.url.clone());
                    break;
                }
                Ok(ExecutionOutcome::RetryableFailure(why)) => {
                    tracing::warn!(url = %candidate.url, why, "retryable execution failure");
                    report.retried += 1;
                }
                Ok(ExecutionOutcome::Rejected(why)) => {
                    tracing::info!(url = %candidate.url, why, "candidate rejected permanently");
                    if let Err(e) = self.store.mark_rejected(&candidate.url).await {
                        tracing::error!(error = ?e, "failed to persist rejection");
                        self.quota.record_error();
                    }
                    report.rejected += 1;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, url = %candidate.url, "executor error; treating as retryable");
                    report.retried += 1;
                }
            }
        }

        Ok(report)
    }

    async fn record_success(
        &mut self,
        candidate: &crate::discover::types::ContentCandidate,
        language: &str,
        style: &str,
        now: DateTime<Utc>,
    ) {
        let record = ActionRecord::new(candidate, language, style, now);
        if let Err(e) = self.store.append(&record).await {
            // Operator-visible contract: data loss is possible from here on,
            // but the in-memory day keeps running.
            tracing::error!(error = ?e, id = %record.id, "action append failed");
            self.quota.record_error();
        }
        self.quota
            .record_action(&candidate.author, language, &candidate.url);
        self.tracker.record_action(&candidate.source_tag);
        if let Err(e) = self.store.save_source_stats(self.tracker.records()).await {
            tracing::warn!(error = ?e, "source stats save failed");
        }
        self.pacing.last_action_at = Some(now);
        self.persist_state().await;
        counter!("actions_total").increment(1);
    }

    async fn rollover(&mut self, now: DateTime<Utc>) {
        let today = pacing::local(&self.cfg.pacing, now).date_naive();
        let quota_reset = self.quota.rollover_if_new_day(today);
        let pacing_reset = self.pacing.rollover_if_new_day(today);
        if quota_reset || pacing_reset {
            tracing::info!(day = %today, "day rollover");
            self.persist_state().await;
        }
    }

    async fn send_daily_summary(&mut self, now: DateTime<Utc>) {
        let best = self.tracker.best_sources(3);
        let best_str = if best.is_empty() {
            "none qualifying yet".to_string()
        } else {
            best.iter()
                .map(|(tag, score)| format!("{tag} ({score:.1})"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut languages: Vec<String> = self
            .quota
            .languages
            .iter()
            .map(|(lang, n)| format!("{lang}:{n}"))
            .collect();
        languages.sort();

        let body = format!(
            "actions {}/{} (floor {}, ceiling {}) | errors {} | languages [{}] | best sources: {}",
            self.quota.actions_taken,
            self.cfg.quota.daily_normal,
            self.cfg.quota.daily_min,
            self.cfg.quota.daily_max,
            self.quota.error_count,
            languages.join(", "),
            best_str
        );
        self.notifier
            .notify(&NotificationEvent {
                title: "Daily engagement summary".to_string(),
                body,
                ts: now,
            })
            .await;
        self.pacing.daily_summary_sent = true;
        self.persist_state().await;
    }

    async fn persist_state(&mut self) {
        let snapshot = PersistedState {
            pacing: self.pacing.clone(),
            quota: self.quota.clone(),
        };
        if let Err(e) = self.state_file.save(&snapshot).await {
            // Loud by contract: losing this file means a restart forgets the
            // day's counters.
            tracing::error!(error = ?e, "state persistence failed");
            self.quota.record_error();
        }
    }
}
