pub mod circuit_breaker;
pub mod policy;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{BreakerConfig, BreakerStatus, CircuitBreaker, CircuitState};
pub use policy::{
    AdaptiveBackoff, ExponentialBackoff, FixedDelay, NoRetry, RetryPolicy, RetryStrategy,
    RetryStrategyKind,
};
pub use retry::{execute_once, RetryExecutor, RetryOutcome};
pub use timeout::TimeoutExt;
