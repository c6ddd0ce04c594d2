use attache_lifecycle::LifecycleEngine;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: LifecycleEngine,
}

impl AppState {
    pub fn new(engine: LifecycleEngine) -> Self {
        Self { engine }
    }

    pub fn cache_max_age_secs(&self) -> u64 {
        self.engine.config().cache_max_age_secs
    }
}
