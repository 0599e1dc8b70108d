//! Configuration structures.
//!
//! Configuration is loaded from environment variables and config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Default resource limits.
    #[serde(default)]
    pub defaults: DefaultLimits,

    /// Communication bus configuration.
    #[serde(default)]
    pub bus: BusConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server bind address.
    pub listen_addr: String,

    /// Metrics endpoint bind address.
    pub metrics_addr: String,

    /// Grace period for draining in-flight streams on SIGINT/SIGTERM.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:50051".to_string(),
            metrics_addr: "127.0.0.1:9090".to_string(),
            shutdown_grace_period: Duration::from_secs(30),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,

    /// OTLP exporter endpoint (optional).
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            otlp_endpoint: None,
        }
    }
}

/// Default resource limits, applied when an envelope is created without
/// caller-supplied bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultLimits {
    /// Maximum LLM calls per envelope.
    pub max_llm_calls: u32,

    /// Maximum tool calls per envelope.
    pub max_tool_calls: u32,

    /// Maximum agent hops per envelope.
    pub max_agent_hops: u32,

    /// Maximum iterations per envelope.
    pub max_iterations: u32,

    /// Default process timeout.
    #[serde(with = "humantime_serde")]
    pub process_timeout: Duration,
}

impl Default for DefaultLimits {
    fn default() -> Self {
        Self {
            max_llm_calls: 20,
            max_tool_calls: 50,
            max_agent_hops: 30,
            max_iterations: 5,
            process_timeout: Duration::from_secs(300),
        }
    }
}

/// Communication bus configuration (query timeouts, interrupt sweep cadence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Maximum query timeout clients may request, in milliseconds.
    pub max_query_timeout_ms: u64,

    /// Default query timeout when the caller omits one, in milliseconds.
    pub default_query_timeout_ms: u64,

    /// Circuit breaker: consecutive failures before tripping open.
    pub circuit_failure_threshold: u32,

    /// Circuit breaker: time in open state before a half-open trial.
    #[serde(with = "humantime_serde")]
    pub circuit_reset_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_query_timeout_ms: 30_000,
            default_query_timeout_ms: 5_000,
            circuit_failure_threshold: 5,
            circuit_reset_timeout: Duration::from_secs(30),
        }
    }
}
