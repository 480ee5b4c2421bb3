use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota};

/// Direct rate limiter guarding every contents-API request.
#[derive(Clone)]
pub struct RequestLimiter {
    inner: Arc<DefaultDirectRateLimiter>,
}

impl RequestLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            inner: Arc::new(DefaultDirectRateLimiter::direct(quota)),
        }
    }

    pub async fn until_ready(&self) {
        self.inner.until_ready().await;
    }
}
