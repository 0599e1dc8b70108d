//! Envelope - the core state container and bounds authority (C1).
//!
//! The Envelope represents the mutable state of a request as it flows through
//! the DAG pipeline. It tracks inputs, outputs, bounds, and interrupts, and is
//! the single source of truth the executor reads and merges into per wave.
//!
//! Fields are organized into semantic sub-structs:
//! - **Identity**: envelope/request/user/session IDs
//! - **Pipeline**: stage sequencing and parallel execution
//! - **Bounds**: resource limits and counters
//! - **InterruptState**: human-in-the-loop flow control
//! - **Execution**: multi-stage goal tracking
//! - **Audit**: processing history, errors, timing, metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub mod enums;
pub mod export;
pub mod import;
pub mod result;

pub use enums::*;
pub use result::{normalize, AgentResult, ResultErrorDetail, ResultStatus};

/// Response to a flow interrupt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,

    pub received_at: DateTime<Utc>,
}

/// Flow interrupt (clarification, confirmation, etc.).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowInterrupt {
    pub kind: InterruptKind,
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<InterruptResponse>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FlowInterrupt {
    pub fn new(kind: InterruptKind) -> Self {
        Self {
            kind,
            id: format!("int_{}", &uuid::Uuid::new_v4().simple().to_string()[..16]),
            question: None,
            message: None,
            data: None,
            response: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_question(mut self, q: String) -> Self {
        self.question = Some(q);
        self
    }

    pub fn with_message(mut self, m: String) -> Self {
        self.message = Some(m);
        self
    }

    pub fn with_data(mut self, d: HashMap<String, serde_json::Value>) -> Self {
        self.data = Some(d);
        self
    }

    pub fn with_expiry(mut self, duration: std::time::Duration) -> Self {
        self.expires_at = Some(Utc::now() + chrono::Duration::from_std(duration).unwrap_or_default());
        self
    }
}

/// Processing record for audit trail — one per agent invocation
/// (`(agent_name, started_at, completed_at, outcome, output_fingerprint)`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingRecord {
    pub agent: String,
    pub stage_order: i32,
    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub duration_ms: i64,
    pub outcome: OutcomeTag,

    /// Hash of the agent's output, used for replay/dedup comparisons
    /// without carrying the full output twice in the history.
    pub output_fingerprint: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub llm_calls: i32,
}

// =============================================================================
// Sub-structs
// =============================================================================

/// Envelope identity fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub envelope_id: String,
    pub request_id: String,
    pub user_id: String,
    pub session_id: String,
}

/// Pipeline sequencing and parallel execution state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    pub current_stage: String,
    pub stage_order: Vec<String>,
    pub iteration: i32,
    pub max_iterations: i32,

    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub active_stages: HashSet<String>,

    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub completed_stage_set: HashSet<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub failed_stages: HashMap<String, String>,

    /// Per-edge traversal counts this execution, keyed `"from->to"`, checked
    /// against the DAG's declared `edge_limits` on every traversal.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub edge_traversals: HashMap<String, u32>,
}

/// Resource limits and usage counters (I1: each counter <= its bound at
/// every observable point).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub llm_call_count: i32,
    pub max_llm_calls: i32,
    pub tool_call_count: i32,
    pub agent_hop_count: i32,
    pub max_agent_hops: i32,
    pub tokens_in: i64,
    pub tokens_out: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<TerminalReason>,

    /// Free-text detail accompanying `terminal_reason` (e.g. the failing
    /// agent's name for `AgentError`, or the edge for `CycleLimitExceeded`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_detail: Option<String>,
}

impl Bounds {
    pub fn is_terminal(&self) -> bool {
        self.terminal_reason.is_some()
    }
}

/// Human-in-the-loop interrupt state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptState {
    pub interrupt_pending: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<FlowInterrupt>,
}

/// Multi-stage execution tracking (goals, retries, replan feedback).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub all_goals: Vec<String>,
    pub remaining_goals: Vec<String>,
    pub goal_completion_status: HashMap<String, String>,
    pub prior_plans: Vec<HashMap<String, serde_json::Value>>,
    pub loop_feedback: Vec<String>,
}

/// Audit trail: history, errors, timing, metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Audit {
    pub processing_history: Vec<ProcessingRecord>,
    pub errors: Vec<HashMap<String, serde_json::Value>>,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub metadata: HashMap<String, serde_json::Value>,
}

// =============================================================================
// Envelope
// =============================================================================

/// Caller-supplied parameters for `Envelope::create`. Any field left `None`
/// falls back to the system default.
#[derive(Debug, Clone, Default)]
pub struct CreateParams {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub raw_input: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub stage_order: Vec<String>,
    pub max_iterations: Option<i32>,
    pub max_llm_calls: Option<i32>,
    pub max_agent_hops: Option<i32>,
}

/// System default bounds per spec: 5 iterations, 20 LLM calls, 30 agent hops.
pub const DEFAULT_MAX_ITERATIONS: i32 = 5;
pub const DEFAULT_MAX_LLM_CALLS: i32 = 20;
pub const DEFAULT_MAX_AGENT_HOPS: i32 = 30;

/// Main envelope structure — the pipeline's single unit of state.
///
/// Unlike hardcoded per-agent output fields, Envelope uses a dynamic `outputs`
/// map where any agent can write a result keyed by agent name (last writer
/// wins per agent per spec's data model).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub identity: Identity,
    pub raw_input: String,

    /// Outputs from agents: agent_name -> opaque output value.
    pub outputs: HashMap<String, serde_json::Value>,

    pub pipeline: Pipeline,
    pub bounds: Bounds,
    pub interrupts: InterruptState,
    pub execution: Execution,
    pub audit: Audit,
}

fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

impl Envelope {
    /// `Create(params)`: allocates IDs, zeroes counters, copies bounds from
    /// params or system defaults, sets `current_stage = "start"`.
    pub fn create(params: CreateParams) -> Self {
        let now = Utc::now();
        Self {
            identity: Identity {
                envelope_id: format!("env_{}", short_uuid()),
                request_id: format!("req_{}", short_uuid()),
                user_id: params.user_id.unwrap_or_else(|| "anonymous".to_string()),
                session_id: params
                    .session_id
                    .unwrap_or_else(|| format!("sess_{}", short_uuid())),
            },
            raw_input: params.raw_input,
            outputs: HashMap::new(),
            pipeline: Pipeline {
                current_stage: "start".to_string(),
                stage_order: params.stage_order,
                iteration: 0,
                max_iterations: params.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
                active_stages: HashSet::new(),
                completed_stage_set: HashSet::new(),
                failed_stages: HashMap::new(),
                edge_traversals: HashMap::new(),
            },
            bounds: Bounds {
                llm_call_count: 0,
                max_llm_calls: params.max_llm_calls.unwrap_or(DEFAULT_MAX_LLM_CALLS),
                tool_call_count: 0,
                agent_hop_count: 0,
                max_agent_hops: params.max_agent_hops.unwrap_or(DEFAULT_MAX_AGENT_HOPS),
                tokens_in: 0,
                tokens_out: 0,
                terminal_reason: None,
                termination_detail: None,
            },
            interrupts: InterruptState {
                interrupt_pending: false,
                interrupt: None,
            },
            execution: Execution {
                all_goals: Vec::new(),
                remaining_goals: Vec::new(),
                goal_completion_status: HashMap::new(),
                prior_plans: Vec::new(),
                loop_feedback: Vec::new(),
            },
            audit: Audit {
                processing_history: Vec::new(),
                errors: Vec::new(),
                created_at: now,
                completed_at: None,
                metadata: params.metadata,
            },
        }
    }

    pub fn new() -> Self {
        Self::create(CreateParams::default())
    }

    /// `updated_at`-equivalent: the timestamp of the most recent mutation,
    /// derived from the last history entry (or `created_at` if none).
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.audit
            .processing_history
            .last()
            .and_then(|r| r.completed_at.or(Some(r.started_at)))
            .unwrap_or(self.audit.created_at)
    }

    /// `CanContinue(env) -> (bool, terminal_reason?)`.
    pub fn can_continue(&self) -> (bool, Option<TerminalReason>) {
        if let Some(reason) = self.bounds.terminal_reason {
            return (false, Some(reason));
        }
        if self.pipeline.iteration >= self.pipeline.max_iterations {
            return (false, Some(TerminalReason::MaxIterationsExceeded));
        }
        if self.bounds.llm_call_count >= self.bounds.max_llm_calls {
            return (false, Some(TerminalReason::MaxLlmCallsExceeded));
        }
        if self.bounds.agent_hop_count >= self.bounds.max_agent_hops {
            return (false, Some(TerminalReason::MaxAgentHopsExceeded));
        }
        (true, None)
    }

    /// Freeze the envelope with a terminal reason (I2 boundary: no further
    /// mutation of outputs/counters is observable after this call). Never
    /// overwrites an already-set reason.
    fn freeze(&mut self, reason: TerminalReason, detail: Option<String>) {
        if self.bounds.terminal_reason.is_none() {
            self.bounds.terminal_reason = Some(reason);
            self.bounds.termination_detail = detail;
            self.audit.completed_at = Some(Utc::now());
        }
    }

    /// `RecordAgent(env, name, outcome, output, llm_calls_made)`.
    ///
    /// Errors if the envelope is already terminal (I2).
    pub fn record_agent(
        &mut self,
        name: &str,
        stage_order: i32,
        outcome: OutcomeTag,
        output: serde_json::Value,
        llm_calls_made: i32,
        started_at: DateTime<Utc>,
    ) -> crate::types::Result<()> {
        if self.bounds.is_terminal() {
            return Err(crate::types::Error::terminal_already(
                self.identity.envelope_id.clone(),
            ));
        }

        let fingerprint = fingerprint_output(&output);
        self.outputs.insert(name.to_string(), output);
        self.bounds.agent_hop_count += 1;
        self.bounds.llm_call_count += llm_calls_made;

        let completed_at = Utc::now();
        self.audit.processing_history.push(ProcessingRecord {
            agent: name.to_string(),
            stage_order,
            started_at,
            completed_at: Some(completed_at),
            duration_ms: (completed_at - started_at).num_milliseconds().max(0),
            outcome,
            output_fingerprint: fingerprint,
            error: None,
            llm_calls: llm_calls_made,
        });

        self.pipeline.completed_stage_set.insert(name.to_string());
        self.pipeline.active_stages.remove(name);

        if outcome.is_terminal() && !outcome.raises_interrupt() {
            let reason = match outcome {
                OutcomeTag::Terminate => TerminalReason::PolicyViolation,
                OutcomeTag::Error => TerminalReason::AgentError,
                _ => unreachable!("raises_interrupt outcomes excluded above"),
            };
            self.freeze(reason, Some(format!("agent_error:{name}")));
        }

        Ok(())
    }

    /// Record a handler-level error (not an outcome) for a node: terminal
    /// failure without panicking the executor.
    pub fn fail_agent(&mut self, name: &str, error_msg: impl Into<String>) {
        let msg = error_msg.into();
        self.pipeline.failed_stages.insert(name.to_string(), msg.clone());
        self.pipeline.active_stages.remove(name);
        self.freeze(TerminalReason::AgentError, Some(format!("agent_error:{name}")));
        if let Some(last) = self
            .audit
            .processing_history
            .iter_mut()
            .rev()
            .find(|r| r.agent == name)
        {
            last.error = Some(msg);
        }
    }

    /// Freeze due to an exceeded bound, using the reason `can_continue`
    /// already computed.
    pub fn terminate_on_bounds(&mut self, reason: TerminalReason) {
        self.freeze(reason, None);
    }

    /// Freeze due to an edge-traversal cap violation.
    pub fn terminate_on_cycle_limit(&mut self, from: &str, to: &str) {
        self.freeze(TerminalReason::CycleLimitExceeded, Some(format!("{from}->{to}")));
    }

    /// Freeze due to caller/client cancellation.
    pub fn terminate_on_cancel(&mut self) {
        self.freeze(TerminalReason::UserCancelled, Some("cancelled".to_string()));
    }

    /// `AdvanceIteration(env)`: one full sweep through the declared pipeline
    /// counts as one iteration. Per the recorded Open Question decision, only
    /// called for waves that made at least one successful progression.
    pub fn advance_iteration(&mut self) {
        self.pipeline.iteration += 1;
    }

    /// Check and increment the traversal count for a directed edge against
    /// its configured limit. Returns `Err` (without mutating the count) if
    /// the edge is already at its cap.
    pub fn traverse_edge(&mut self, from: &str, to: &str, limit: Option<u32>) -> crate::types::Result<()> {
        let key = format!("{from}->{to}");
        let count = self.pipeline.edge_traversals.get(&key).copied().unwrap_or(0);
        if let Some(limit) = limit {
            if count >= limit {
                return Err(crate::types::Error::CycleLimitExceeded {
                    from: from.to_string(),
                    to: to.to_string(),
                    limit,
                });
            }
        }
        self.pipeline.edge_traversals.insert(key, count + 1);
        Ok(())
    }

    /// Start a stage (mark as actively executing).
    pub fn start_stage(&mut self, stage_name: impl Into<String>) {
        self.pipeline.active_stages.insert(stage_name.into());
    }

    /// Check if a stage is completed.
    pub fn is_stage_completed(&self, stage_name: &str) -> bool {
        self.pipeline.completed_stage_set.contains(stage_name)
    }

    /// Check if a stage failed.
    pub fn is_stage_failed(&self, stage_name: &str) -> bool {
        self.pipeline.failed_stages.contains_key(stage_name)
    }

    /// Set interrupt pending; does not freeze the envelope (interrupts
    /// suspend execution, they don't terminate it).
    pub fn set_interrupt(&mut self, interrupt: FlowInterrupt) {
        self.interrupts.interrupt_pending = true;
        self.interrupts.interrupt = Some(interrupt);
    }

    /// Suspend a node on a raised interrupt (`clarify`/`confirm` outcomes).
    ///
    /// Deliberately does not run `record_agent`'s bookkeeping: the node is
    /// not yet done, so it must not enter `completed_stage_set` and its hop
    /// is not yet counted. `active_stages` keeps the node marked in-flight so
    /// a resume can find and replay it. Errors if already terminal (I2).
    pub fn suspend_on_interrupt(&mut self, interrupt: FlowInterrupt) -> crate::types::Result<()> {
        if self.bounds.is_terminal() {
            return Err(crate::types::Error::terminal_already(
                self.identity.envelope_id.clone(),
            ));
        }
        self.set_interrupt(interrupt);
        Ok(())
    }

    /// Make a previously completed stage eligible to run again.
    ///
    /// Called on the routing target of a `replan`/`loop_back` outcome once
    /// its backward edge traversal succeeds, so the wave scheduler's
    /// ready-set computation picks it back up.
    pub fn reopen_stage(&mut self, stage_name: &str) {
        self.pipeline.completed_stage_set.remove(stage_name);
    }

    /// Freeze due to a pending interrupt expiring before resolution (C4 Sweep).
    pub fn terminate_on_interrupt_timeout(&mut self, interrupt_id: &str) {
        self.clear_interrupt();
        self.freeze(
            TerminalReason::InterruptTimeout,
            Some(format!("interrupt_timeout:{interrupt_id}")),
        );
    }

    /// Clear interrupt (on resume).
    pub fn clear_interrupt(&mut self) {
        self.interrupts.interrupt_pending = false;
        self.interrupts.interrupt = None;
    }

    /// `Clone(env) -> Envelope`: deep copy with new `envelope_id`/`request_id`,
    /// retained session/user, zeroed counters, new timestamps.
    pub fn clone_fresh(&self) -> Self {
        let params = CreateParams {
            user_id: Some(self.identity.user_id.clone()),
            session_id: Some(self.identity.session_id.clone()),
            raw_input: self.raw_input.clone(),
            metadata: self.audit.metadata.clone(),
            stage_order: self.pipeline.stage_order.clone(),
            max_iterations: Some(self.pipeline.max_iterations),
            max_llm_calls: Some(self.bounds.max_llm_calls),
            max_agent_hops: Some(self.bounds.max_agent_hops),
        };
        Envelope::create(params)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic fingerprint of an agent output, used in history entries.
/// Canonical (sorted-key) JSON so the fingerprint is stable across encodings.
fn fingerprint_output(value: &serde_json::Value) -> String {
    let canonical = export::to_canonical_string(value);
    format!("{:x}", fnv1a(canonical.as_bytes()))
}

/// FNV-1a — no external hashing dependency needed for a best-effort
/// replay/dedup fingerprint.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
