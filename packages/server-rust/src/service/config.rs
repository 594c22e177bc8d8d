use std::time::Duration;

/// Configuration for the dispatch pipeline.
///
/// Controls the deadlines applied to tenant lookup and to whole requests.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on a single tenant configuration lookup in milliseconds.
    pub tenant_lookup_timeout_ms: u64,
    /// Deadline for an entire request, handler included, in milliseconds.
    pub request_timeout_ms: u64,
}

impl PipelineConfig {
    #[must_use]
    pub fn tenant_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.tenant_lookup_timeout_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tenant_lookup_timeout_ms: 3_000,
            request_timeout_ms: 30_000,
        }
    }
}
