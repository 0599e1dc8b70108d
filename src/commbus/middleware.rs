//! Middleware chain wrapped around command/query dispatch (C3).
//!
//! `before_*` runs in registration order and can short-circuit by
//! returning `Err`; `after_*` runs in the same order once the handler (or
//! the short-circuit) has resolved and never fails.

use super::{Command, Event, Query};
use crate::types::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before_command(&self, _command: &Command) -> Result<()> {
        Ok(())
    }
    fn after_command(&self, _command: &Command, _success: bool) {}

    async fn before_query(&self, _query: &Query) -> Result<()> {
        Ok(())
    }
    fn after_query(&self, _query: &Query, _success: bool) {}

    async fn before_event(&self, _event: &Event) -> Result<()> {
        Ok(())
    }
    fn after_event(&self, _event: &Event, _success: bool) {}

    /// Drop any accumulated state (circuit counters, etc).
    fn reset(&self) {}
}

/// Logs every dispatch at debug level. Carries no state.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn before_command(&self, command: &Command) -> Result<()> {
        tracing::debug!(command_type = %command.command_type, source = %command.source, "dispatching command");
        Ok(())
    }

    fn after_command(&self, command: &Command, success: bool) {
        tracing::debug!(command_type = %command.command_type, success, "command dispatched");
    }

    async fn before_query(&self, query: &Query) -> Result<()> {
        tracing::debug!(query_type = %query.query_type, source = %query.source, "dispatching query");
        Ok(())
    }

    fn after_query(&self, query: &Query, success: bool) {
        tracing::debug!(query_type = %query.query_type, success, "query dispatched");
    }

    async fn before_event(&self, event: &Event) -> Result<()> {
        tracing::debug!(event_type = %event.event_type, source = %event.source, "publishing event");
        Ok(())
    }

    fn after_event(&self, event: &Event, success: bool) {
        tracing::debug!(event_type = %event.event_type, success, "event published");
    }
}

/// Per-message-type circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Breaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Trips open after `failure_threshold` consecutive failures for a given
/// message type; after `reset_timeout`, allows one half-open trial through.
pub struct CircuitBreakerMiddleware {
    failure_threshold: u32,
    reset_timeout: Duration,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerMiddleware {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, message_type: &str) -> Result<()> {
        let mut breakers = self.breakers.lock().expect("circuit breaker map poisoned");
        let breaker = breakers.entry(message_type.to_string()).or_default();
        match breaker.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = breaker.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset_timeout {
                    breaker.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(Error::circuit_open(message_type))
                }
            }
        }
    }

    fn record(&self, message_type: &str, success: bool) {
        let mut breakers = self.breakers.lock().expect("circuit breaker map poisoned");
        let breaker = breakers.entry(message_type.to_string()).or_default();
        if success {
            breaker.state = CircuitState::Closed;
            breaker.consecutive_failures = 0;
            breaker.opened_at = None;
        } else {
            breaker.consecutive_failures += 1;
            if breaker.state == CircuitState::HalfOpen
                || breaker.consecutive_failures >= self.failure_threshold
            {
                breaker.state = CircuitState::Open;
                breaker.opened_at = Some(Instant::now());
            }
        }
    }
}

#[async_trait]
impl Middleware for CircuitBreakerMiddleware {
    async fn before_command(&self, command: &Command) -> Result<()> {
        self.check(&command.command_type)
    }

    fn after_command(&self, command: &Command, success: bool) {
        self.record(&command.command_type, success);
    }

    async fn before_query(&self, query: &Query) -> Result<()> {
        self.check(&query.query_type)
    }

    fn after_query(&self, query: &Query, success: bool) {
        self.record(&query.query_type, success);
    }

    async fn before_event(&self, event: &Event) -> Result<()> {
        self.check(&event.event_type)
    }

    fn after_event(&self, event: &Event, success: bool) {
        self.record(&event.event_type, success);
    }

    fn reset(&self) {
        self.breakers.lock().expect("circuit breaker map poisoned").clear();
    }
}
