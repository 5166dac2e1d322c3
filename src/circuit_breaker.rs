use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Consecutive failures that open the breaker.
pub const FAILURE_THRESHOLD: u32 = 5;

pub type GatewayCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates the circuit breaker guarding the LLM gateway.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures (transport errors or 5xx) open it.
/// - **Backoff**: Exponential from 10s to 60s before a trial call is let through.
///
/// Upstream 4xx answers (rate limit, missing credits) are not failures of the gateway
/// and never trip the breaker.
pub fn create_gateway_circuit_breaker() -> GatewayCircuitBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));

    let failure_policy = failure_policy::consecutive_failures(FAILURE_THRESHOLD, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
