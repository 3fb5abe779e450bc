// =============================================================================
// Central Application State
// =============================================================================
//
// The handful of long-lived handles every API route needs: the orchestrator
// (which itself owns the gateway, the LLM client and the store), a direct
// handle to the store for read-only queries that don't need the full
// analysis pipeline, and the runtime configuration. Unlike a dashboard's
// AppState this holds no mutable snapshot state of its own — every field is
// either `Arc`-shared or cheap to clone, so `AppState` itself is `Clone`.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::RuntimeConfig;
use crate::orchestrator::AnalysisOrchestrator;
use crate::store::Store;

/// Shared application state, cloned into every axum handler via `State`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub store: Store,
    pub config: Arc<RuntimeConfig>,
    /// Monotonically increasing counter bumped once per completed `Analyze`
    /// call, exposed on `/health` so an operator can see the process is
    /// making progress rather than just alive.
    analyses_served: Arc<AtomicU64>,
    start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>, store: Store, config: Arc<RuntimeConfig>) -> Self {
        Self { orchestrator, store, config, analyses_served: Arc::new(AtomicU64::new(0)), start_time: Instant::now() }
    }

    pub fn record_analysis_served(&self) {
        self.analyses_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn analyses_served(&self) -> u64 {
        self.analyses_served.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
