//! DAG executor (C6) — wave-based topological scheduling of agent nodes.
//!
//! Generalizes the old linear stage_order walk into a real dependency-graph
//! scheduler: each wave computes a ready set from `requires`, invokes every
//! ready node's handler in parallel, merges results back into the envelope
//! in a deterministic order, and evaluates routing rules to pick each node's
//! next target — including backward (replan/loop_back) edges bounded by
//! per-edge traversal caps rather than rejected outright.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::envelope::{Envelope, FlowInterrupt, InterruptKind, OutcomeTag, TerminalReason};
use crate::types::{Error, Result};

/// Reserved target name meaning "no further node" — reaching it ends the
/// pipeline when no other node remains ready.
pub const SINK: &str = "end";

// =============================================================================
// Routing
// =============================================================================

/// A routing condition evaluated against a completed node's output and
/// outcome tag. Kept as a closed enum rather than a template-string
/// evaluator, since nothing in this system parses predicate expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingPredicate {
    Always,
    FieldPresent { field: String },
    FieldEquals { field: String, value: serde_json::Value },
    OutcomeIs { outcome: OutcomeTag },
}

impl RoutingPredicate {
    fn matches(&self, output: &serde_json::Value, outcome: OutcomeTag) -> bool {
        match self {
            RoutingPredicate::Always => true,
            RoutingPredicate::FieldPresent { field } => output.get(field).is_some(),
            RoutingPredicate::FieldEquals { field, value } => output.get(field) == Some(value),
            RoutingPredicate::OutcomeIs { outcome: want } => outcome == *want,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub predicate: RoutingPredicate,
    pub target: String,
}

// =============================================================================
// DAG config
// =============================================================================

/// One declared node of the pipeline DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub agent_name: String,
    pub stage_order: i32,
    #[serde(default)]
    pub requires: HashSet<String>,
    pub default_next: String,
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,
}

/// A pipeline's full execution config: its node set plus per-edge traversal
/// caps, keyed `"from->to"` to match `Envelope::traverse_edge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub nodes: Vec<DagNode>,
    #[serde(default)]
    pub edge_limits: HashMap<String, u32>,
}

impl PipelineConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("pipeline name is required".to_string());
        }
        if self.nodes.is_empty() {
            return Err("pipeline must declare at least one node".to_string());
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.agent_name.as_str()) {
                return Err(format!("duplicate node agent_name: {}", node.agent_name));
            }
        }
        Ok(())
    }

    fn node(&self, agent_name: &str) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.agent_name == agent_name)
    }

    pub fn stage_order(&self) -> Vec<String> {
        let mut nodes: Vec<&DagNode> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| (n.stage_order, n.agent_name.clone()));
        nodes.into_iter().map(|n| n.agent_name.clone()).collect()
    }
}

// =============================================================================
// Agent handler contract
// =============================================================================

/// What an agent handler returns for a single invocation: the outcome tag
/// that drives merge/routing, its output value, and LLM calls it made.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub outcome: OutcomeTag,
    pub output: serde_json::Value,
    pub llm_calls: i32,
    /// Populated by the handler when `outcome` is `clarify`/`confirm`.
    pub interrupt: Option<FlowInterrupt>,
}

impl AgentOutcome {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            outcome: OutcomeTag::Success,
            output,
            llm_calls: 0,
            interrupt: None,
        }
    }
}

/// A registered agent implementation. Receives a read-only envelope view
/// (the executor owns all mutation — I4) and reports an outcome; returning
/// `Err` signals a handler-level failure distinct from an `error` outcome
/// (spec: "handler errors, not outcomes, are terminal-failure for that
/// node").
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn run(&self, envelope: &Envelope) -> std::result::Result<AgentOutcome, String>;
}

// =============================================================================
// Execution events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    StageStarted,
    StageCompleted,
    StageFailed,
    PipelineCompleted,
    InterruptRaised,
    BoundsExceeded,
    CheckpointCreated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_type: EventType,
    pub stage: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
}

impl ExecutionEvent {
    fn new(event_type: EventType, stage: impl Into<String>) -> Self {
        Self {
            event_type,
            stage: stage.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
            payload: HashMap::new(),
            envelope: None,
        }
    }

    fn with_payload(mut self, key: &str, value: serde_json::Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }
}

// =============================================================================
// DAG executor
// =============================================================================

/// Wave-based scheduler over a pipeline's declared nodes. Stateless across
/// calls to `execute` beyond the registered handlers — all per-run state
/// lives on the `Envelope` passed in, so resuming after an interrupt is
/// just calling `execute` again with the same envelope.
#[derive(Default)]
pub struct DagExecutor {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
}

impl std::fmt::Debug for DagExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagExecutor")
            .field("registered_agents", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DagExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, agent_name: impl Into<String>, handler: Arc<dyn AgentHandler>) {
        self.handlers.insert(agent_name.into(), handler);
    }

    /// Drive waves until the envelope freezes, suspends on an interrupt, or
    /// reaches the sink. Returns the event trace; the envelope is mutated
    /// in place (I4: only the executor mutates it).
    pub async fn execute(
        &self,
        config: &PipelineConfig,
        envelope: &mut Envelope,
    ) -> Result<Vec<ExecutionEvent>> {
        config.validate().map_err(Error::validation)?;

        let mut events = Vec::new();

        loop {
            let (can_continue, reason) = envelope.can_continue();
            if !can_continue {
                let reason = reason.expect("can_continue returns a reason when false");
                envelope.terminate_on_bounds(reason);
                events.push(
                    ExecutionEvent::new(EventType::BoundsExceeded, "pipeline")
                        .with_payload("terminal_reason", serde_json::json!(reason)),
                );
                break;
            }

            if envelope.interrupts.interrupt_pending {
                // Suspended pending external resolution (C4); caller resumes
                // by calling execute again once the interrupt is answered.
                break;
            }

            let pending: Vec<&DagNode> = config
                .nodes
                .iter()
                .filter(|n| {
                    !envelope.is_stage_completed(&n.agent_name) && !envelope.is_stage_failed(&n.agent_name)
                })
                .collect();

            if pending.is_empty() {
                events.push(
                    ExecutionEvent::new(EventType::PipelineCompleted, "pipeline")
                        .with_envelope(envelope.clone()),
                );
                break;
            }

            let ready_stage_order = pending
                .iter()
                .filter(|n| n.requires.iter().all(|r| envelope.is_stage_completed(r)))
                .map(|n| n.stage_order)
                .min();

            let Some(ready_stage_order) = ready_stage_order else {
                // Every remaining node is blocked on a requirement that
                // failed or will never complete (e.g. its dependency is
                // itself stuck). Nothing more can run.
                break;
            };

            let mut ready: Vec<&DagNode> = pending
                .into_iter()
                .filter(|n| {
                    n.stage_order == ready_stage_order
                        && n.requires.iter().all(|r| envelope.is_stage_completed(r))
                })
                .collect();
            ready.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));

            for node in &ready {
                envelope.start_stage(node.agent_name.clone());
                events.push(ExecutionEvent::new(EventType::StageStarted, &node.agent_name));
            }

            let mut tasks = Vec::with_capacity(ready.len());
            for node in &ready {
                let agent_name = node.agent_name.clone();
                let handler = self.handlers.get(&agent_name).cloned();
                let snapshot = envelope.clone();
                tasks.push(tokio::spawn(async move {
                    let started_at = Utc::now();
                    let outcome = match handler {
                        Some(h) => h.run(&snapshot).await,
                        None => Err(format!("no handler registered for agent '{agent_name}'")),
                    };
                    (agent_name, started_at, outcome)
                }));
            }

            let mut results: Vec<(String, DateTime<Utc>, std::result::Result<AgentOutcome, String>)> =
                Vec::with_capacity(tasks.len());
            for task in tasks {
                results.push(task.await.map_err(|e| Error::internal(e.to_string()))?);
            }
            // Deterministic merge order: ascending (stage_order, agent name).
            // All results in this wave share stage_order, so sorting by name
            // alone is sufficient and matches the spec's tie-break rule.
            results.sort_by(|a, b| a.0.cmp(&b.0));

            let mut progressed = false;

            for (agent_name, started_at, outcome) in results {
                let node = config
                    .node(&agent_name)
                    .expect("result agent_name comes from this config's ready set");

                match outcome {
                    Err(handler_err) => {
                        envelope.fail_agent(&agent_name, handler_err.clone());
                        events.push(
                            ExecutionEvent::new(EventType::StageFailed, &agent_name)
                                .with_payload("error", serde_json::json!(handler_err)),
                        );
                    }
                    Ok(outcome) => {
                        let outcome_tag = outcome.outcome;

                        if outcome_tag.raises_interrupt() {
                            // Suspend without running record_agent: the node
                            // isn't done, so it must not be marked completed
                            // or have its hop counted yet (that happens once,
                            // on the successful replay after resume).
                            let kind = match outcome_tag {
                                OutcomeTag::Clarify => InterruptKind::Clarification,
                                OutcomeTag::Confirm => InterruptKind::Confirmation,
                                _ => unreachable!("raises_interrupt is Clarify|Confirm only"),
                            };
                            let interrupt = outcome.interrupt.unwrap_or_else(|| FlowInterrupt::new(kind));
                            events.push(
                                ExecutionEvent::new(EventType::InterruptRaised, &agent_name)
                                    .with_payload("interrupt_id", serde_json::json!(interrupt.id)),
                            );
                            envelope.suspend_on_interrupt(interrupt)?;
                            continue;
                        }

                        envelope.record_agent(
                            &agent_name,
                            node.stage_order,
                            outcome_tag,
                            outcome.output.clone(),
                            outcome.llm_calls,
                            started_at,
                        )?;

                        if outcome_tag.is_terminal() {
                            // Error|Terminate: record_agent already froze the
                            // envelope with AgentError/PolicyViolation.
                            events.push(ExecutionEvent::new(EventType::StageFailed, &agent_name));
                            continue;
                        }

                        events.push(
                            ExecutionEvent::new(EventType::StageCompleted, &agent_name)
                                .with_envelope(envelope.clone()),
                        );
                        progressed = true;
                        envelope.pipeline.current_stage = agent_name.clone();

                        let target = node
                            .routing_rules
                            .iter()
                            .find(|r| r.predicate.matches(&outcome.output, outcome_tag))
                            .map(|r| r.target.clone())
                            .unwrap_or_else(|| node.default_next.clone());

                        if target == SINK {
                            envelope.pipeline.current_stage = SINK.to_string();
                        } else {
                            let limit = config.edge_limits.get(&format!("{agent_name}->{target}")).copied();
                            if envelope.traverse_edge(&agent_name, &target, limit).is_err() {
                                envelope.terminate_on_cycle_limit(&agent_name, &target);
                                events.push(
                                    ExecutionEvent::new(EventType::BoundsExceeded, &agent_name).with_payload(
                                        "terminal_reason",
                                        serde_json::json!(TerminalReason::CycleLimitExceeded),
                                    ),
                                );
                            } else if outcome_tag.requires_loop() {
                                // Backward edge taken successfully: make the
                                // target eligible again instead of leaving it
                                // permanently completed from its earlier run.
                                envelope.reopen_stage(&target);
                            }
                        }
                    }
                }
            }

            if envelope.bounds.is_terminal() || envelope.interrupts.interrupt_pending {
                break;
            }

            // Open Question decision: AdvanceIteration fires on any wave that
            // made at least one successful progression; a wave whose sole
            // outcome was an interrupt or a handler failure does not count.
            if progressed {
                envelope.advance_iteration();
                events.push(ExecutionEvent::new(EventType::CheckpointCreated, "pipeline"));
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CreateParams;

    struct ScriptedHandler {
        outcome: OutcomeTag,
        output: serde_json::Value,
    }

    #[async_trait]
    impl AgentHandler for ScriptedHandler {
        async fn run(&self, _envelope: &Envelope) -> std::result::Result<AgentOutcome, String> {
            Ok(AgentOutcome {
                outcome: self.outcome,
                output: self.output.clone(),
                llm_calls: 1,
                interrupt: None,
            })
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl AgentHandler for FailingHandler {
        async fn run(&self, _envelope: &Envelope) -> std::result::Result<AgentOutcome, String> {
            Err("boom".to_string())
        }
    }

    fn linear_pipeline() -> PipelineConfig {
        PipelineConfig {
            name: "linear".to_string(),
            nodes: vec![
                DagNode {
                    agent_name: "fetch".to_string(),
                    stage_order: 0,
                    requires: HashSet::new(),
                    default_next: "summarize".to_string(),
                    routing_rules: vec![],
                },
                DagNode {
                    agent_name: "summarize".to_string(),
                    stage_order: 1,
                    requires: ["fetch".to_string()].into_iter().collect(),
                    default_next: SINK.to_string(),
                    routing_rules: vec![],
                },
            ],
            edge_limits: HashMap::new(),
        }
    }

    fn test_envelope() -> Envelope {
        Envelope::create(CreateParams {
            raw_input: "hi".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn runs_linear_pipeline_to_completion() {
        let mut executor = DagExecutor::new();
        executor.register_handler(
            "fetch",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Success,
                output: serde_json::json!({"page": 1}),
            }),
        );
        executor.register_handler(
            "summarize",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Success,
                output: serde_json::json!({"summary": "done"}),
            }),
        );

        let mut envelope = test_envelope();
        let events = executor
            .execute(&linear_pipeline(), &mut envelope)
            .await
            .unwrap();

        assert!(!envelope.bounds.is_terminal());
        assert!(envelope.is_stage_completed("fetch"));
        assert!(envelope.is_stage_completed("summarize"));
        assert_eq!(envelope.pipeline.iteration, 1);
        assert!(events.iter().any(|e| e.event_type == EventType::PipelineCompleted));
    }

    #[tokio::test]
    async fn parallel_wave_runs_same_stage_order_nodes_together() {
        let config = PipelineConfig {
            name: "fanout".to_string(),
            nodes: vec![
                DagNode {
                    agent_name: "a".to_string(),
                    stage_order: 0,
                    requires: HashSet::new(),
                    default_next: SINK.to_string(),
                    routing_rules: vec![],
                },
                DagNode {
                    agent_name: "b".to_string(),
                    stage_order: 0,
                    requires: HashSet::new(),
                    default_next: SINK.to_string(),
                    routing_rules: vec![],
                },
            ],
            edge_limits: HashMap::new(),
        };

        let mut executor = DagExecutor::new();
        executor.register_handler(
            "a",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Success,
                output: serde_json::json!({}),
            }),
        );
        executor.register_handler(
            "b",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Success,
                output: serde_json::json!({}),
            }),
        );

        let mut envelope = test_envelope();
        executor.execute(&config, &mut envelope).await.unwrap();

        assert!(envelope.is_stage_completed("a"));
        assert!(envelope.is_stage_completed("b"));
        assert_eq!(envelope.bounds.agent_hop_count, 2);
    }

    #[tokio::test]
    async fn clarify_outcome_suspends_without_freezing() {
        let mut executor = DagExecutor::new();
        executor.register_handler(
            "fetch",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Clarify,
                output: serde_json::json!({}),
            }),
        );

        let mut envelope = test_envelope();
        let events = executor
            .execute(&linear_pipeline(), &mut envelope)
            .await
            .unwrap();

        assert!(!envelope.bounds.is_terminal());
        assert!(envelope.interrupts.interrupt_pending);
        assert!(events.iter().any(|e| e.event_type == EventType::InterruptRaised));
    }

    #[tokio::test]
    async fn error_outcome_freezes_envelope() {
        let mut executor = DagExecutor::new();
        executor.register_handler(
            "fetch",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Error,
                output: serde_json::json!({}),
            }),
        );

        let mut envelope = test_envelope();
        executor.execute(&linear_pipeline(), &mut envelope).await.unwrap();

        assert_eq!(envelope.bounds.terminal_reason, Some(TerminalReason::AgentError));
    }

    #[tokio::test]
    async fn handler_error_fails_node_without_panicking() {
        let mut executor = DagExecutor::new();
        executor.register_handler("fetch", Arc::new(FailingHandler));

        let mut envelope = test_envelope();
        let events = executor
            .execute(&linear_pipeline(), &mut envelope)
            .await
            .unwrap();

        assert!(envelope.is_stage_failed("fetch"));
        assert!(envelope.bounds.is_terminal());
        assert!(events.iter().any(|e| e.event_type == EventType::StageFailed));
    }

    #[tokio::test]
    async fn missing_handler_fails_node_rather_than_panicking() {
        let executor = DagExecutor::new();
        let mut envelope = test_envelope();
        executor.execute(&linear_pipeline(), &mut envelope).await.unwrap();

        assert!(envelope.is_stage_failed("fetch"));
        assert!(envelope.bounds.is_terminal());
    }

    #[tokio::test]
    async fn loop_back_takes_backward_edge_until_cap() {
        let config = PipelineConfig {
            name: "loop".to_string(),
            nodes: vec![DagNode {
                agent_name: "retry".to_string(),
                stage_order: 0,
                requires: HashSet::new(),
                default_next: "retry".to_string(),
                routing_rules: vec![],
            }],
            edge_limits: [("retry->retry".to_string(), 2)].into_iter().collect(),
        };

        struct LoopingHandler;
        #[async_trait]
        impl AgentHandler for LoopingHandler {
            async fn run(&self, envelope: &Envelope) -> std::result::Result<AgentOutcome, String> {
                // First call completes and is not yet in completed_stage_set
                // at call time (executor merges after this returns), so the
                // ready-set keeps re-selecting "retry" via the backward edge.
                let _ = envelope;
                Ok(AgentOutcome {
                    outcome: OutcomeTag::LoopBack,
                    output: serde_json::json!({}),
                    llm_calls: 0,
                    interrupt: None,
                })
            }
        }
        let mut executor = DagExecutor::new();
        executor.register_handler("retry", Arc::new(LoopingHandler));

        let mut envelope = test_envelope();
        envelope.pipeline.max_iterations = 100;
        executor.execute(&config, &mut envelope).await.unwrap();

        assert_eq!(
            envelope.bounds.terminal_reason,
            Some(TerminalReason::CycleLimitExceeded)
        );
    }

    #[test]
    fn pipeline_validation_rejects_empty_and_duplicate_nodes() {
        let mut config = linear_pipeline();
        assert!(config.validate().is_ok());

        config.name = String::new();
        assert!(config.validate().is_err());

        let mut dup = linear_pipeline();
        dup.name = "dup".to_string();
        dup.nodes.push(DagNode {
            agent_name: "fetch".to_string(),
            stage_order: 2,
            requires: HashSet::new(),
            default_next: SINK.to_string(),
            routing_rules: vec![],
        });
        assert!(dup.validate().is_err());
    }

    #[test]
    fn routing_predicate_field_equals_matches_output() {
        let predicate = RoutingPredicate::FieldEquals {
            field: "status".to_string(),
            value: serde_json::json!("ok"),
        };
        assert!(predicate.matches(&serde_json::json!({"status": "ok"}), OutcomeTag::Success));
        assert!(!predicate.matches(&serde_json::json!({"status": "bad"}), OutcomeTag::Success));
    }

    #[tokio::test]
    async fn current_stage_reaches_end_on_completion() {
        let mut executor = DagExecutor::new();
        executor.register_handler(
            "fetch",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Success,
                output: serde_json::json!({}),
            }),
        );
        executor.register_handler(
            "summarize",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Success,
                output: serde_json::json!({}),
            }),
        );

        let mut envelope = test_envelope();
        executor.execute(&linear_pipeline(), &mut envelope).await.unwrap();

        assert_eq!(envelope.pipeline.current_stage, SINK);
    }

    /// A node that raises `confirm` must be replayed (not skipped) on resume,
    /// and its hop must be counted exactly once: at the successful replay,
    /// not at the original suspension.
    #[tokio::test]
    async fn resume_after_interrupt_replays_the_suspended_node() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct OnceThenSucceed {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl AgentHandler for OnceThenSucceed {
            async fn run(&self, _envelope: &Envelope) -> std::result::Result<AgentOutcome, String> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Ok(AgentOutcome {
                        outcome: OutcomeTag::Confirm,
                        output: serde_json::json!({}),
                        llm_calls: 1,
                        interrupt: None,
                    })
                } else {
                    Ok(AgentOutcome {
                        outcome: OutcomeTag::Success,
                        output: serde_json::json!({}),
                        llm_calls: 1,
                        interrupt: None,
                    })
                }
            }
        }

        let mut executor = DagExecutor::new();
        executor.register_handler("fetch", Arc::new(OnceThenSucceed { calls: AtomicUsize::new(0) }));
        executor.register_handler(
            "summarize",
            Arc::new(ScriptedHandler {
                outcome: OutcomeTag::Success,
                output: serde_json::json!({}),
            }),
        );

        let mut envelope = test_envelope();
        let events = executor
            .execute(&linear_pipeline(), &mut envelope)
            .await
            .unwrap();

        assert!(envelope.interrupts.interrupt_pending);
        assert!(!envelope.is_stage_completed("fetch"));
        assert!(events.iter().any(|e| e.event_type == EventType::InterruptRaised));
        assert_eq!(envelope.bounds.agent_hop_count, 0);

        envelope.clear_interrupt();
        executor.execute(&linear_pipeline(), &mut envelope).await.unwrap();

        assert!(!envelope.bounds.is_terminal());
        assert!(envelope.is_stage_completed("fetch"));
        assert!(envelope.is_stage_completed("summarize"));
        assert_eq!(envelope.bounds.agent_hop_count, 2);
    }
}
