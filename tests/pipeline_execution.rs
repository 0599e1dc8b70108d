//! End-to-end DAG pipeline execution — drives a `Kernel` through a linear
//! pipeline, a branching pipeline, and a bounds-exhaustion scenario via the
//! registered `AgentHandler` trait.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use pipeline_kernel::envelope::{CreateParams, Envelope, OutcomeTag};
use pipeline_kernel::kernel::orchestrator::{
    AgentHandler, AgentOutcome, DagNode, PipelineConfig, RoutingPredicate, RoutingRule, SINK,
};
use pipeline_kernel::kernel::Kernel;
use pipeline_kernel::types::ProcessId;

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

fn register(kernel: &mut Kernel, name: &str, outcome: OutcomeTag, output: serde_json::Value) {
    kernel.register_agent_handler(
        name,
        Arc::new(ScriptedHandler { outcome, output }),
    );
}

#[tokio::test]
async fn linear_pipeline_runs_both_stages_to_completion() {
    let mut kernel = Kernel::new();
    register(&mut kernel, "fetch", OutcomeTag::Success, serde_json::json!({"fetched": true}));
    register(&mut kernel, "summarize", OutcomeTag::Success, serde_json::json!({"summary": "ok"}));

    let envelope = Envelope::create(CreateParams {
        raw_input: "hi".to_string(),
        stage_order: vec!["fetch".to_string(), "summarize".to_string()],
        ..Default::default()
    });
    let envelope_id = envelope.identity.envelope_id.clone();
    kernel.store_envelope(envelope);

    let config = PipelineConfig {
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
    };
    config.validate().unwrap();

    let pid = ProcessId::must(envelope_id.clone());
    let events = kernel.execute_pipeline(&pid, &config).await.unwrap();

    assert!(events.iter().any(|e| e.stage == "fetch"));
    assert!(events.iter().any(|e| e.stage == "summarize"));

    let envelope = kernel.get_envelope(&envelope_id).unwrap();
    assert!(envelope.is_stage_completed("fetch"));
    assert!(envelope.is_stage_completed("summarize"));
}

#[tokio::test]
async fn routing_rule_match_picks_the_recorded_edge_over_default_next() {
    let mut kernel = Kernel::new();
    register(&mut kernel, "classify", OutcomeTag::Partial, serde_json::json!({}));
    register(&mut kernel, "clarify_path", OutcomeTag::Success, serde_json::json!({}));
    register(&mut kernel, "direct_path", OutcomeTag::Success, serde_json::json!({}));

    let envelope = Envelope::create(CreateParams {
        raw_input: "hi".to_string(),
        stage_order: vec!["classify".to_string(), "clarify_path".to_string(), "direct_path".to_string()],
        ..Default::default()
    });
    let envelope_id = envelope.identity.envelope_id.clone();
    kernel.store_envelope(envelope);

    let config = PipelineConfig {
        name: "branching".to_string(),
        nodes: vec![
            DagNode {
                agent_name: "classify".to_string(),
                stage_order: 0,
                requires: HashSet::new(),
                default_next: "direct_path".to_string(),
                routing_rules: vec![RoutingRule {
                    predicate: RoutingPredicate::OutcomeIs { outcome: OutcomeTag::Partial },
                    target: "clarify_path".to_string(),
                }],
            },
            DagNode {
                agent_name: "clarify_path".to_string(),
                stage_order: 1,
                requires: ["classify".to_string()].into_iter().collect(),
                default_next: SINK.to_string(),
                routing_rules: vec![],
            },
            DagNode {
                agent_name: "direct_path".to_string(),
                stage_order: 1,
                requires: ["classify".to_string()].into_iter().collect(),
                default_next: SINK.to_string(),
                routing_rules: vec![],
            },
        ],
        edge_limits: HashMap::new(),
    };
    config.validate().unwrap();

    let pid = ProcessId::must(envelope_id.clone());
    kernel.execute_pipeline(&pid, &config).await.unwrap();

    let envelope = kernel.get_envelope(&envelope_id).unwrap();
    // Both downstream nodes share `requires: {classify}` at the same stage
    // order, so both run once classify completes; routing only decides which
    // edge gets recorded for cycle-limit bookkeeping.
    assert!(envelope.is_stage_completed("clarify_path"));
    assert!(envelope.is_stage_completed("direct_path"));
    assert_eq!(
        envelope.pipeline.edge_traversals.get("classify->clarify_path").copied(),
        Some(1)
    );
    assert!(!envelope.pipeline.edge_traversals.contains_key("classify->direct_path"));
}

#[tokio::test]
async fn pipeline_stops_when_bounds_are_already_exhausted() {
    let mut kernel = Kernel::new();
    register(&mut kernel, "work", OutcomeTag::Success, serde_json::json!({}));

    let envelope = Envelope::create(CreateParams {
        raw_input: "hi".to_string(),
        stage_order: vec!["work".to_string()],
        max_agent_hops: Some(0),
        ..Default::default()
    });
    let envelope_id = envelope.identity.envelope_id.clone();
    kernel.store_envelope(envelope);

    let config = PipelineConfig {
        name: "single".to_string(),
        nodes: vec![DagNode {
            agent_name: "work".to_string(),
            stage_order: 0,
            requires: HashSet::new(),
            default_next: SINK.to_string(),
            routing_rules: vec![],
        }],
        edge_limits: HashMap::new(),
    };
    config.validate().unwrap();

    let pid = ProcessId::must(envelope_id.clone());
    kernel.execute_pipeline(&pid, &config).await.unwrap();

    let envelope = kernel.get_envelope(&envelope_id).unwrap();
    let (can_continue, reason) = envelope.can_continue();
    assert!(!can_continue);
    assert_eq!(reason, Some(pipeline_kernel::envelope::TerminalReason::MaxAgentHopsExceeded));
    assert!(!envelope.is_stage_completed("work"));
}
