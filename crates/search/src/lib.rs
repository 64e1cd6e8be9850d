pub mod fallback;
pub mod google;
pub mod queue;
pub mod rate_limiter;

pub use fallback::{SearchFallbackService, SearchPriority};
pub use queue::SearchQueue;
pub use rate_limiter::RateLimiter;
