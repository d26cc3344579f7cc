// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod action;
pub mod admission;
pub mod config;
pub mod discover;
pub mod notify;
pub mod pacing;
pub mod performance;
pub mod scheduler;
pub mod scoring;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::action::{ActionExecutor, ActionRecord, ContentGenerator, ExecutionOutcome};
pub use crate::admission::{AdmissionController, AdmissionVerdict, DailyQuotaState};
pub use crate::config::AppConfig;
pub use crate::discover::types::{ContentCandidate, DiscoverySource};
pub use crate::notify::{NotificationEvent, NotifierMux};
pub use crate::performance::SourcePerformanceTracker;
pub use crate::scheduler::Engine;
pub use crate::store::{JsonFileStore, KnowledgeStore};
