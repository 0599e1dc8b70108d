//! Tool executor — dispatches validated calls to registered handlers (C2).
//!
//! The catalog owns metadata; this module owns invocation. A handler is
//! anything that can turn validated parameters into an output value, run
//! concurrently and shared across requests via `Arc`.

use super::{ToolCatalog, ToolHealthTracker};
use crate::envelope::{normalize, RiskSemantic};
use crate::types::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// A tool implementation. Handlers are registered by id and looked up by the
/// executor at call time; they never see unvalidated parameters.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Value) -> std::result::Result<Value, String>;
}

/// Result of a single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub tool_id: String,
    pub output: Value,
    pub latency_ms: u64,
}

/// Combines the catalog (metadata/validation), the access policy (who may
/// call what), the health tracker (circuit breaking), and the registered
/// handlers into a single call path.
pub struct ToolExecutor {
    catalog: Arc<RwLock<ToolCatalog>>,
    access: Arc<RwLock<super::ToolAccessPolicy>>,
    health: Arc<RwLock<ToolHealthTracker>>,
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("call_timeout", &self.call_timeout)
            .field(
                "registered_handlers",
                &self.handlers.read().expect("tool handler map poisoned").len(),
            )
            .finish()
    }
}

impl ToolExecutor {
    pub fn new(
        catalog: Arc<RwLock<ToolCatalog>>,
        access: Arc<RwLock<super::ToolAccessPolicy>>,
        health: Arc<RwLock<ToolHealthTracker>>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            access,
            health,
            handlers: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Register a tool's metadata in the catalog.
    pub fn register_tool(&self, entry: super::ToolEntry) -> Result<()> {
        self.catalog.write().expect("tool catalog poisoned").register(entry)
    }

    /// Register a handler for a tool id. The id must already exist in the
    /// catalog; registering a handler does not itself add catalog metadata.
    pub fn register_handler(&self, tool_id: &str, handler: Arc<dyn ToolHandler>) -> Result<()> {
        if !self.catalog.read().expect("tool catalog poisoned").has_tool(tool_id) {
            return Err(Error::tool_not_found(tool_id));
        }
        self.handlers
            .write()
            .expect("tool handler map poisoned")
            .insert(tool_id.to_string(), handler);
        Ok(())
    }

    /// Grant an agent access to a tool.
    pub fn grant_access(&self, agent_name: &str, tool_id: &str) {
        self.access.write().expect("access policy poisoned").grant(agent_name, tool_id);
    }

    pub fn has_tool(&self, tool_id: &str) -> bool {
        self.catalog.read().expect("tool catalog poisoned").has_tool(tool_id)
    }

    pub fn get_definition(&self, tool_id: &str) -> Option<super::ToolEntry> {
        self.catalog.read().expect("tool catalog poisoned").get(tool_id).cloned()
    }

    pub fn list_definitions(&self) -> Vec<super::ToolEntry> {
        self.catalog
            .read()
            .expect("tool catalog poisoned")
            .list_entries()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Execute a tool call on behalf of `agent_name`.
    ///
    /// Order: access check, catalog lookup, circuit breaker, parameter
    /// validation + default-fill, handler dispatch under a timeout, then
    /// health recording regardless of outcome.
    pub async fn execute(
        &self,
        agent_name: &str,
        tool_id: &str,
        mut params: Value,
    ) -> Result<ToolCallResult> {
        if !self
            .access
            .read()
            .expect("access policy poisoned")
            .check_access(agent_name, tool_id)
        {
            return Err(Error::validation(format!(
                "agent '{agent_name}' has no access to tool '{tool_id}'"
            )));
        }

        let entry = {
            let catalog = self.catalog.read().expect("tool catalog poisoned");
            catalog.get(tool_id).ok_or_else(|| Error::tool_not_found(tool_id))?.clone()
        };

        if self
            .health
            .read()
            .expect("health tracker poisoned")
            .should_circuit_break(tool_id)
        {
            return Err(Error::circuit_open(tool_id));
        }

        let errors = {
            let catalog = self.catalog.read().expect("tool catalog poisoned");
            catalog.validate_params(tool_id, &params)?
        };
        if !errors.is_empty() {
            return Err(Error::validation(errors.join("; ")));
        }
        self.catalog
            .read()
            .expect("tool catalog poisoned")
            .fill_defaults(tool_id, &mut params)?;

        if entry.risk_semantic == RiskSemantic::Destructive {
            // Destructive tools must be approved via a Confirm interrupt
            // before the executor is ever invoked; this is a defense in
            // depth check, not the primary gate.
            tracing::debug!(tool_id, "executing destructive tool");
        }

        let handler = self
            .handlers
            .read()
            .expect("tool handler map poisoned")
            .get(tool_id)
            .cloned()
            .ok_or_else(|| Error::no_handler(tool_id))?;

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout, handler.call(params)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(raw_output)) => {
                // Handlers may still speak a legacy `{status, result, error}`
                // shape; normalize and validate it so an implicit failure
                // encoded in the payload doesn't read back as a success.
                let normalized = match normalize(raw_output.clone()) {
                    Ok(n) => n,
                    Err(e) => {
                        self.health.write().expect("health tracker poisoned").record_execution(
                            tool_id,
                            false,
                            latency_ms,
                            Some(e.to_string()),
                        );
                        return Err(e);
                    }
                };

                if normalized.status == crate::envelope::ResultStatus::Error {
                    let message = normalized
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "tool reported failure".to_string());
                    self.health.write().expect("health tracker poisoned").record_execution(
                        tool_id,
                        false,
                        latency_ms,
                        Some(message.clone()),
                    );
                    return Err(Error::Internal(message));
                }

                self.health.write().expect("health tracker poisoned").record_execution(
                    tool_id, true, latency_ms, None,
                );
                Ok(ToolCallResult {
                    tool_id: tool_id.to_string(),
                    output: normalized.data.unwrap_or(raw_output),
                    latency_ms,
                })
            }
            Ok(Err(message)) => {
                self.health.write().expect("health tracker poisoned").record_execution(
                    tool_id,
                    false,
                    latency_ms,
                    Some(message.clone()),
                );
                Err(Error::Internal(message))
            }
            Err(_) => {
                self.health.write().expect("health tracker poisoned").record_execution(
                    tool_id,
                    false,
                    latency_ms,
                    Some("timeout".to_string()),
                );
                Err(Error::timeout(format!(
                    "tool '{tool_id}' exceeded {:?}",
                    self.call_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ToolCategory;
    use crate::tools::{HealthConfig, ParamDef, ParamType, ToolAccessPolicy, ToolEntry};

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn call(&self, params: Value) -> std::result::Result<Value, String> {
            Ok(params)
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ToolHandler for FailingHandler {
        async fn call(&self, _params: Value) -> std::result::Result<Value, String> {
            Err("boom".to_string())
        }
    }

    fn build_executor() -> (ToolExecutor, Arc<RwLock<ToolCatalog>>) {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(ToolEntry {
                id: "echo".to_string(),
                description: "echoes input".to_string(),
                parameters: vec![ParamDef {
                    name: "text".to_string(),
                    param_type: ParamType::String,
                    description: "text to echo".to_string(),
                    default: None,
                }],
                category: ToolCategory::Internal,
                risk_semantic: RiskSemantic::ReadOnly,
            })
            .unwrap();
        let catalog = Arc::new(RwLock::new(catalog));
        let mut access = ToolAccessPolicy::new();
        access.grant("agent", "echo");
        let executor = ToolExecutor::new(
            catalog.clone(),
            Arc::new(RwLock::new(access)),
            Arc::new(RwLock::new(ToolHealthTracker::new(HealthConfig::default()))),
            Duration::from_secs(1),
        );
        (executor, catalog)
    }

    #[tokio::test]
    async fn execute_dispatches_to_registered_handler() {
        let (executor, _catalog) = build_executor();
        executor
            .register_handler("echo", Arc::new(EchoHandler))
            .unwrap();
        let result = executor
            .execute("agent", "echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result.output, serde_json::json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn execute_rejects_unauthorized_agent() {
        let (executor, _catalog) = build_executor();
        executor
            .register_handler("echo", Arc::new(EchoHandler))
            .unwrap();
        let result = executor
            .execute("stranger", "echo", serde_json::json!({"text": "hi"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_rejects_invalid_params() {
        let (executor, _catalog) = build_executor();
        executor
            .register_handler("echo", Arc::new(EchoHandler))
            .unwrap();
        let result = executor.execute("agent", "echo", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_surfaces_handler_errors_as_health_failures() {
        let (executor, _catalog) = build_executor();
        executor
            .register_handler("echo", Arc::new(FailingHandler))
            .unwrap();
        let result = executor
            .execute("agent", "echo", serde_json::json!({"text": "hi"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_treats_legacy_error_map_as_a_failure() {
        struct LegacyErrorHandler;
        #[async_trait]
        impl ToolHandler for LegacyErrorHandler {
            async fn call(&self, _params: Value) -> std::result::Result<Value, String> {
                Ok(serde_json::json!({"status": "failed", "message": "disk full"}))
            }
        }

        let (executor, _catalog) = build_executor();
        executor
            .register_handler("echo", Arc::new(LegacyErrorHandler))
            .unwrap();
        let result = executor
            .execute("agent", "echo", serde_json::json!({"text": "hi"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_unwraps_legacy_success_map_data() {
        struct LegacySuccessHandler;
        #[async_trait]
        impl ToolHandler for LegacySuccessHandler {
            async fn call(&self, _params: Value) -> std::result::Result<Value, String> {
                Ok(serde_json::json!({"status": "completed", "result": {"ok": true}}))
            }
        }

        let (executor, _catalog) = build_executor();
        executor
            .register_handler("echo", Arc::new(LegacySuccessHandler))
            .unwrap();
        let result = executor
            .execute("agent", "echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result.output, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn execute_rejects_a_non_map_handler_output() {
        struct ScalarHandler;
        #[async_trait]
        impl ToolHandler for ScalarHandler {
            async fn call(&self, _params: Value) -> std::result::Result<Value, String> {
                Ok(serde_json::json!(42))
            }
        }

        let (executor, _catalog) = build_executor();
        executor
            .register_handler("echo", Arc::new(ScalarHandler))
            .unwrap();
        let result = executor
            .execute("agent", "echo", serde_json::json!({"text": "hi"}))
            .await;
        assert!(matches!(result, Err(Error::ResultValidation(_))));
    }

    #[tokio::test]
    async fn execute_fails_without_a_registered_handler() {
        let (executor, _catalog) = build_executor();
        let result = executor
            .execute("agent", "echo", serde_json::json!({"text": "hi"}))
            .await;
        assert!(result.is_err());
    }
}
