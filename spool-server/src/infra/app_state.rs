use std::fmt;

use spool_core::IngestionEnqueuer;

/// Which collaborators back the enqueuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Redis,
    Memory,
    /// Redis was configured but could not be reached at startup.
    Unavailable,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Redis => "redis",
            Backend::Memory => "memory",
            Backend::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub enqueuer: IngestionEnqueuer,
    pub backend: Backend,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(enqueuer: IngestionEnqueuer, backend: Backend) -> Self {
        Self { enqueuer, backend }
    }

    pub fn enqueuer(&self) -> &IngestionEnqueuer {
        &self.enqueuer
    }
}
