//! Communication bus (C3) — events, commands, queries, and the middleware
//! chain wrapped around command/query dispatch.
//!
//! Three message kinds, three delivery semantics:
//! - **Event**: pub/sub, fan-out to every matching subscriber, best-effort.
//! - **Command**: exactly one handler per `command_type`, fire-and-forget.
//! - **Query**: exactly one handler per `query_type`, request/response with
//!   a deadline.
//!
//! The bus is a plain struct mutated through `&mut self`, in keeping with
//! the kernel's single-writer model — callers serialize access the same way
//! they serialize access to the rest of `Kernel`.

mod middleware;

pub use middleware::{CircuitBreakerMiddleware, CircuitState, LoggingMiddleware, Middleware};

use crate::types::{BusConfig, Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A published event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub payload: Vec<u8>,
    pub timestamp_ms: i64,
    pub source: String,
}

/// A fire-and-forget command.
#[derive(Debug, Clone)]
pub struct Command {
    pub command_type: String,
    pub payload: Vec<u8>,
    pub source: String,
}

/// A request/response query.
#[derive(Debug, Clone)]
pub struct Query {
    pub query_type: String,
    pub payload: Vec<u8>,
    pub timeout_ms: u64,
    pub source: String,
}

/// Result of a query execution.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub success: bool,
    pub result: Vec<u8>,
    pub error: String,
}

/// A live event subscription. Dropping the matching receiver does not
/// auto-unsubscribe; call `CommBus::unsubscribe` explicitly.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub event_types: Vec<String>,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> std::result::Result<(), String>;
}

#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn handle(&self, query: Query) -> std::result::Result<Vec<u8>, String>;
}

struct Subscriber {
    event_types: Vec<String>,
    tx: mpsc::UnboundedSender<Event>,
}

/// Communication bus (C3): pub/sub events, single-handler commands and
/// queries, and a middleware chain (logging, circuit breaking) wrapped
/// around every command/query dispatch.
pub struct CommBus {
    subscribers: HashMap<String, Subscriber>,
    command_handlers: HashMap<String, Arc<dyn CommandHandler>>,
    query_handlers: HashMap<String, Arc<dyn QueryHandler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    config: BusConfig,
}

impl std::fmt::Debug for CommBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommBus")
            .field("subscribers", &self.subscribers.len())
            .field("command_handlers", &self.command_handlers.keys().collect::<Vec<_>>())
            .field("query_handlers", &self.query_handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        let breaker = Arc::new(CircuitBreakerMiddleware::new(
            config.circuit_failure_threshold,
            config.circuit_reset_timeout,
        ));
        Self {
            subscribers: HashMap::new(),
            command_handlers: HashMap::new(),
            query_handlers: HashMap::new(),
            middleware: vec![Arc::new(LoggingMiddleware), breaker],
            config,
        }
    }

    /// Register the handler for a command type. Errors if one is already
    /// registered — commands have exactly one handler.
    pub fn register_command_handler(
        &mut self,
        command_type: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        if self.command_handlers.contains_key(command_type) {
            return Err(Error::handler_already_registered(command_type));
        }
        self.command_handlers.insert(command_type.to_string(), handler);
        Ok(())
    }

    /// Register the handler for a query type. Errors if one is already
    /// registered — queries have exactly one handler.
    pub fn register_query_handler(
        &mut self,
        query_type: &str,
        handler: Arc<dyn QueryHandler>,
    ) -> Result<()> {
        if self.query_handlers.contains_key(query_type) {
            return Err(Error::handler_already_registered(query_type));
        }
        self.query_handlers.insert(query_type.to_string(), handler);
        Ok(())
    }

    /// Subscribe to one or more event types. Returns the subscription handle
    /// and the receiving end of an unbounded channel fed by `publish`.
    pub async fn subscribe(
        &mut self,
        subscriber_id: String,
        event_types: Vec<String>,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(
            subscriber_id.clone(),
            Subscriber {
                event_types: event_types.clone(),
                tx,
            },
        );
        Ok((
            Subscription {
                id: subscriber_id,
                event_types,
            },
            rx,
        ))
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, subscriber_id: &str) {
        self.subscribers.remove(subscriber_id);
    }

    /// Publish an event to every subscriber registered for its type.
    /// Best-effort fan-out: a disconnected subscriber is dropped silently
    /// and does not fail the publish. Returns the number of subscribers the
    /// event was handed to.
    pub async fn publish(&mut self, event: Event) -> Result<usize> {
        for mw in &self.middleware {
            mw.before_event(&event).await?;
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sub) in self.subscribers.iter() {
            if sub.event_types.iter().any(|t| t == &event.event_type) {
                if sub.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(id.clone());
                }
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }

        for mw in &self.middleware {
            mw.after_event(&event, true);
        }
        Ok(delivered)
    }

    /// Send a command to its single registered handler.
    pub async fn send_command(&mut self, command: Command) -> Result<()> {
        for mw in &self.middleware {
            mw.before_command(&command)?;
        }

        let handler = self
            .command_handlers
            .get(&command.command_type)
            .cloned()
            .ok_or_else(|| Error::no_handler(&command.command_type));

        let outcome = match handler {
            Ok(h) => h.handle(command.clone()).await.map_err(Error::internal),
            Err(e) => Err(e),
        };

        for mw in &self.middleware {
            mw.after_command(&command, outcome.is_ok());
        }
        outcome
    }

    /// Execute a query against its single registered handler, bounded by
    /// `query.timeout_ms` (clamped to `BusConfig::max_query_timeout_ms`).
    pub async fn query(&mut self, query: Query) -> Result<QueryResponse> {
        for mw in &self.middleware {
            mw.before_query(&query)?;
        }

        let handler = self.query_handlers.get(&query.query_type).cloned();

        let result = match handler {
            None => Err(Error::no_handler(&query.query_type)),
            Some(h) => {
                let timeout_ms = query.timeout_ms.min(self.config.max_query_timeout_ms).max(1);
                let started = std::time::Instant::now();
                match tokio::time::timeout(
                    std::time::Duration::from_millis(timeout_ms),
                    h.handle(query.clone()),
                )
                .await
                {
                    Ok(Ok(bytes)) => Ok(QueryResponse {
                        success: true,
                        result: bytes,
                        error: String::new(),
                    }),
                    Ok(Err(message)) => Err(Error::internal(message)),
                    Err(_) => Err(Error::QueryTimeout {
                        message_type: query.query_type.clone(),
                        elapsed_secs: started.elapsed().as_secs_f64(),
                    }),
                }
            }
        };

        for mw in &self.middleware {
            mw.after_query(&query, result.is_ok());
        }
        result
    }

    /// Reset the bus to its initial state: drops all subscribers, handlers,
    /// and circuit breaker state. Used between test runs and on shutdown.
    pub fn clear(&mut self) {
        self.subscribers.clear();
        self.command_handlers.clear();
        self.query_handlers.clear();
        for mw in &self.middleware {
            mw.reset();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for CommBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoCommand;

    #[async_trait]
    impl CommandHandler for EchoCommand {
        async fn handle(&self, _command: Command) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    struct EchoQuery;

    #[async_trait]
    impl QueryHandler for EchoQuery {
        async fn handle(&self, query: Query) -> std::result::Result<Vec<u8>, String> {
            Ok(query.payload)
        }
    }

    struct SlowQuery;

    #[async_trait]
    impl QueryHandler for SlowQuery {
        async fn handle(&self, _query: Query) -> std::result::Result<Vec<u8>, String> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn publish_fans_out_to_matching_subscribers() {
        let mut bus = CommBus::new();
        let (_sub, mut rx) = bus
            .subscribe("s1".to_string(), vec!["order.created".to_string()])
            .await
            .unwrap();
        let delivered = bus
            .publish(Event {
                event_type: "order.created".to_string(),
                payload: vec![],
                timestamp_ms: 0,
                source: "test".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_skips_non_matching_subscribers() {
        let mut bus = CommBus::new();
        let (_sub, _rx) = bus.subscribe("s1".to_string(), vec!["other".to_string()]).await.unwrap();
        let delivered = bus
            .publish(Event {
                event_type: "order.created".to_string(),
                payload: vec![],
                timestamp_ms: 0,
                source: "test".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn send_command_requires_a_registered_handler() {
        let mut bus = CommBus::new();
        let result = bus
            .send_command(Command {
                command_type: "do.thing".to_string(),
                payload: vec![],
                source: "test".to_string(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_command_rejects_duplicate_registration() {
        let mut bus = CommBus::new();
        bus.register_command_handler("do.thing", Arc::new(EchoCommand)).unwrap();
        let result = bus.register_command_handler("do.thing", Arc::new(EchoCommand));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn query_returns_handler_result() {
        let mut bus = CommBus::new();
        bus.register_query_handler("lookup", Arc::new(EchoQuery)).unwrap();
        let response = bus
            .query(Query {
                query_type: "lookup".to_string(),
                payload: b"hi".to_vec(),
                timeout_ms: 1000,
                source: "test".to_string(),
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.result, b"hi".to_vec());
    }

    #[tokio::test]
    async fn query_times_out() {
        let mut bus = CommBus::new();
        bus.register_query_handler("slow", Arc::new(SlowQuery)).unwrap();
        let result = bus
            .query(Query {
                query_type: "slow".to_string(),
                payload: vec![],
                timeout_ms: 5,
                source: "test".to_string(),
            })
            .await;
        assert!(matches!(result, Err(Error::QueryTimeout { .. })));
    }

    #[tokio::test]
    async fn query_trips_circuit_breaker_after_repeated_failures() {
        struct FailingQuery;
        #[async_trait]
        impl QueryHandler for FailingQuery {
            async fn handle(&self, _query: Query) -> std::result::Result<Vec<u8>, String> {
                Err("nope".to_string())
            }
        }

        let mut bus = CommBus::with_config(crate::types::BusConfig {
            circuit_failure_threshold: 2,
            ..Default::default()
        });
        bus.register_query_handler("flaky", Arc::new(FailingQuery)).unwrap();

        for _ in 0..2 {
            let _ = bus
                .query(Query {
                    query_type: "flaky".to_string(),
                    payload: vec![],
                    timeout_ms: 100,
                    source: "test".to_string(),
                })
                .await;
        }

        let result = bus
            .query(Query {
                query_type: "flaky".to_string(),
                payload: vec![],
                timeout_ms: 100,
                source: "test".to_string(),
            })
            .await;
        assert!(matches!(result, Err(Error::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn publish_trips_circuit_breaker_after_repeated_failures() {
        struct AlwaysFail;
        #[async_trait]
        impl Middleware for AlwaysFail {
            async fn before_event(&self, _event: &Event) -> Result<()> {
                Err(Error::internal("nope"))
            }
        }

        let mut bus = CommBus::new();
        bus.middleware.push(Arc::new(AlwaysFail));
        let result = bus
            .publish(Event {
                event_type: "order.created".to_string(),
                payload: vec![],
                timestamp_ms: 0,
                source: "test".to_string(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn clear_removes_subscribers_and_handlers() {
        let mut bus = CommBus::new();
        bus.register_command_handler("do.thing", Arc::new(EchoCommand)).unwrap();
        let (_sub, _rx) = bus.subscribe("s1".to_string(), vec!["x".to_string()]).await.unwrap();
        bus.clear();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .send_command(Command {
                command_type: "do.thing".to_string(),
                payload: vec![],
                source: "test".to_string(),
            })
            .await
            .is_err());
    }
}
