use crate::client::MyTubeClient;
use crate::rate_limit::RateLimiter;

// app's shared state
pub struct AppState {
    pub client: MyTubeClient,
    pub rate_limiter: RateLimiter,
}
