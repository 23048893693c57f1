use std::sync::Arc;

use crate::application::repos::CacheStore;
use crate::application::sampling::SamplingService;

use super::error::ErrorStatusPolicy;

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct HttpState {
    pub sampling: Arc<SamplingService>,
    pub cache: Arc<dyn CacheStore>,
    pub errors: ErrorStatusPolicy,
}

impl HttpState {
    pub fn new(
        sampling: Arc<SamplingService>,
        cache: Arc<dyn CacheStore>,
        errors: ErrorStatusPolicy,
    ) -> Self {
        Self {
            sampling,
            cache,
            errors,
        }
    }
}
