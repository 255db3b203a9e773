// =============================================================================
// Central Application State: Market Pulse
// =============================================================================
//
// Constructed once at startup and shared with every handler as
// `Arc<AppState>`. The limiter records and caches live inside the
// orchestrator, so tests get a fresh, isolated set of stores per instance.
// =============================================================================

use std::sync::Arc;

use crate::orchestrator::{RequestOrchestrator, StoreStats};
use crate::runtime_config::ServiceConfig;
use crate::types::Clock;
use crate::upstream::JsonTransport;

pub struct AppState {
    pub config: ServiceConfig,
    pub orchestrator: RequestOrchestrator,
    clock: Clock,
    /// Epoch milliseconds at construction.
    started_at: i64,
}

impl AppState {
    pub fn new(config: ServiceConfig, transport: Arc<dyn JsonTransport>, clock: Clock) -> Self {
        let orchestrator = RequestOrchestrator::new(&config, transport, clock.clone());
        let started_at = clock();
        Self {
            config,
            orchestrator,
            clock,
            started_at,
        }
    }

    pub fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    pub fn uptime_secs(&self) -> i64 {
        (self.now_ms() - self.started_at).max(0) / 1000
    }

    pub fn store_stats(&self) -> StoreStats {
        self.orchestrator.stats()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("bind_addr", &self.config.bind_addr)
            .field("orchestrator", &self.orchestrator)
            .field("started_at", &self.started_at)
            .finish()
    }
}
