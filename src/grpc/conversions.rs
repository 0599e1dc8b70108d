//! Conversions between domain types and generated proto messages.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};

use crate::envelope::{
    Audit, Bounds, Envelope, Execution as DomainExecution, FlowInterrupt, Identity, InterruptKind,
    InterruptResponse, InterruptState, OutcomeTag, Pipeline, ProcessingRecord, TerminalReason,
};
use crate::kernel::orchestrator::{
    DagNode, EventType, ExecutionEvent, PipelineConfig, RoutingPredicate, RoutingRule,
};
use crate::kernel::types::{ProcessControlBlock, ResourceQuota, ResourceUsage};
use crate::kernel::{ProcessState, SchedulingPriority};
use crate::proto;
use crate::types::Error;

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn to_json_bytes<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn from_json_bytes<T: serde::de::DeserializeOwned + Default>(bytes: &[u8]) -> T {
    if bytes.is_empty() {
        return T::default();
    }
    serde_json::from_slice(bytes).unwrap_or_default()
}

// =============================================================================
// Enums
// =============================================================================

impl From<OutcomeTag> for proto::OutcomeTag {
    fn from(o: OutcomeTag) -> Self {
        match o {
            OutcomeTag::Success => proto::OutcomeTag::Success,
            OutcomeTag::Partial => proto::OutcomeTag::Partial,
            OutcomeTag::Skip => proto::OutcomeTag::Skip,
            OutcomeTag::Error => proto::OutcomeTag::Error,
            OutcomeTag::Clarify => proto::OutcomeTag::Clarify,
            OutcomeTag::Confirm => proto::OutcomeTag::Confirm,
            OutcomeTag::Replan => proto::OutcomeTag::Replan,
            OutcomeTag::LoopBack => proto::OutcomeTag::LoopBack,
            OutcomeTag::Terminate => proto::OutcomeTag::Terminate,
        }
    }
}

impl TryFrom<proto::OutcomeTag> for OutcomeTag {
    type Error = Error;
    fn try_from(o: proto::OutcomeTag) -> Result<Self, Self::Error> {
        match o {
            proto::OutcomeTag::Success => Ok(OutcomeTag::Success),
            proto::OutcomeTag::Partial => Ok(OutcomeTag::Partial),
            proto::OutcomeTag::Skip => Ok(OutcomeTag::Skip),
            proto::OutcomeTag::Error => Ok(OutcomeTag::Error),
            proto::OutcomeTag::Clarify => Ok(OutcomeTag::Clarify),
            proto::OutcomeTag::Confirm => Ok(OutcomeTag::Confirm),
            proto::OutcomeTag::Replan => Ok(OutcomeTag::Replan),
            proto::OutcomeTag::LoopBack => Ok(OutcomeTag::LoopBack),
            proto::OutcomeTag::Terminate => Ok(OutcomeTag::Terminate),
            proto::OutcomeTag::Unspecified => Err(Error::validation("outcome_tag is unspecified")),
        }
    }
}

impl From<TerminalReason> for proto::TerminalReason {
    fn from(r: TerminalReason) -> Self {
        match r {
            TerminalReason::Completed => proto::TerminalReason::Completed,
            TerminalReason::MaxIterationsExceeded => proto::TerminalReason::MaxIterationsExceeded,
            TerminalReason::MaxLlmCallsExceeded => proto::TerminalReason::MaxLlmCallsExceeded,
            TerminalReason::MaxAgentHopsExceeded => proto::TerminalReason::MaxAgentHopsExceeded,
            TerminalReason::MaxStageVisitsExceeded => proto::TerminalReason::MaxStageVisitsExceeded,
            TerminalReason::CycleLimitExceeded => proto::TerminalReason::CycleLimitExceeded,
            TerminalReason::UserCancelled => proto::TerminalReason::UserCancelled,
            TerminalReason::AgentError => proto::TerminalReason::AgentError,
            TerminalReason::ToolFailedFatally => proto::TerminalReason::ToolFailedFatally,
            TerminalReason::LlmFailedFatally => proto::TerminalReason::LlmFailedFatally,
            TerminalReason::PolicyViolation => proto::TerminalReason::PolicyViolation,
            TerminalReason::InterruptTimeout => proto::TerminalReason::InterruptTimeout,
        }
    }
}

impl TryFrom<proto::TerminalReason> for TerminalReason {
    type Error = Error;
    fn try_from(r: proto::TerminalReason) -> Result<Self, Self::Error> {
        match r {
            proto::TerminalReason::Completed => Ok(TerminalReason::Completed),
            proto::TerminalReason::MaxIterationsExceeded => Ok(TerminalReason::MaxIterationsExceeded),
            proto::TerminalReason::MaxLlmCallsExceeded => Ok(TerminalReason::MaxLlmCallsExceeded),
            proto::TerminalReason::MaxAgentHopsExceeded => Ok(TerminalReason::MaxAgentHopsExceeded),
            proto::TerminalReason::MaxStageVisitsExceeded => Ok(TerminalReason::MaxStageVisitsExceeded),
            proto::TerminalReason::CycleLimitExceeded => Ok(TerminalReason::CycleLimitExceeded),
            proto::TerminalReason::UserCancelled => Ok(TerminalReason::UserCancelled),
            proto::TerminalReason::AgentError => Ok(TerminalReason::AgentError),
            proto::TerminalReason::ToolFailedFatally => Ok(TerminalReason::ToolFailedFatally),
            proto::TerminalReason::LlmFailedFatally => Ok(TerminalReason::LlmFailedFatally),
            proto::TerminalReason::PolicyViolation => Ok(TerminalReason::PolicyViolation),
            proto::TerminalReason::InterruptTimeout => Ok(TerminalReason::InterruptTimeout),
            proto::TerminalReason::Unspecified => Err(Error::validation("terminal_reason is unspecified")),
        }
    }
}

impl From<InterruptKind> for proto::InterruptKind {
    fn from(k: InterruptKind) -> Self {
        match k {
            InterruptKind::Clarification => proto::InterruptKind::Clarification,
            InterruptKind::Confirmation => proto::InterruptKind::Confirmation,
            InterruptKind::AgentReview => proto::InterruptKind::AgentReview,
            InterruptKind::Checkpoint => proto::InterruptKind::Checkpoint,
            InterruptKind::ResourceExhausted => proto::InterruptKind::ResourceExhausted,
            InterruptKind::Timeout => proto::InterruptKind::Timeout,
            InterruptKind::SystemError => proto::InterruptKind::SystemError,
        }
    }
}

impl TryFrom<proto::InterruptKind> for InterruptKind {
    type Error = Error;
    fn try_from(k: proto::InterruptKind) -> Result<Self, Self::Error> {
        match k {
            proto::InterruptKind::Clarification => Ok(InterruptKind::Clarification),
            proto::InterruptKind::Confirmation => Ok(InterruptKind::Confirmation),
            proto::InterruptKind::AgentReview => Ok(InterruptKind::AgentReview),
            proto::InterruptKind::Checkpoint => Ok(InterruptKind::Checkpoint),
            proto::InterruptKind::ResourceExhausted => Ok(InterruptKind::ResourceExhausted),
            proto::InterruptKind::Timeout => Ok(InterruptKind::Timeout),
            proto::InterruptKind::SystemError => Ok(InterruptKind::SystemError),
            proto::InterruptKind::Unspecified => Err(Error::validation("interrupt_kind is unspecified")),
        }
    }
}

impl From<ProcessState> for proto::ProcessState {
    fn from(s: ProcessState) -> Self {
        match s {
            ProcessState::New => proto::ProcessState::New,
            ProcessState::Ready => proto::ProcessState::Ready,
            ProcessState::Running => proto::ProcessState::Running,
            ProcessState::Waiting => proto::ProcessState::Waiting,
            ProcessState::Blocked => proto::ProcessState::Blocked,
            ProcessState::Terminated => proto::ProcessState::Terminated,
            ProcessState::Zombie => proto::ProcessState::Zombie,
        }
    }
}

impl TryFrom<proto::ProcessState> for ProcessState {
    type Error = Error;
    fn try_from(s: proto::ProcessState) -> Result<Self, Self::Error> {
        match s {
            proto::ProcessState::New => Ok(ProcessState::New),
            proto::ProcessState::Ready => Ok(ProcessState::Ready),
            proto::ProcessState::Running => Ok(ProcessState::Running),
            proto::ProcessState::Waiting => Ok(ProcessState::Waiting),
            proto::ProcessState::Blocked => Ok(ProcessState::Blocked),
            proto::ProcessState::Terminated => Ok(ProcessState::Terminated),
            proto::ProcessState::Zombie => Ok(ProcessState::Zombie),
            proto::ProcessState::Unspecified => Err(Error::validation("process_state is unspecified")),
        }
    }
}

impl TryFrom<i32> for ProcessState {
    type Error = Error;
    fn try_from(v: i32) -> Result<Self, Self::Error> {
        let p = proto::ProcessState::try_from(v)
            .map_err(|_| Error::validation(format!("invalid process_state {v}")))?;
        ProcessState::try_from(p)
    }
}

impl From<SchedulingPriority> for proto::SchedulingPriority {
    fn from(p: SchedulingPriority) -> Self {
        match p {
            SchedulingPriority::Realtime => proto::SchedulingPriority::Realtime,
            SchedulingPriority::High => proto::SchedulingPriority::High,
            SchedulingPriority::Normal => proto::SchedulingPriority::Normal,
            SchedulingPriority::Low => proto::SchedulingPriority::Low,
            SchedulingPriority::Idle => proto::SchedulingPriority::Idle,
        }
    }
}

impl TryFrom<proto::SchedulingPriority> for SchedulingPriority {
    type Error = Error;
    fn try_from(p: proto::SchedulingPriority) -> Result<Self, Self::Error> {
        match p {
            proto::SchedulingPriority::Realtime => Ok(SchedulingPriority::Realtime),
            proto::SchedulingPriority::High => Ok(SchedulingPriority::High),
            proto::SchedulingPriority::Normal => Ok(SchedulingPriority::Normal),
            proto::SchedulingPriority::Low => Ok(SchedulingPriority::Low),
            proto::SchedulingPriority::Idle => Ok(SchedulingPriority::Idle),
            proto::SchedulingPriority::Unspecified => Ok(SchedulingPriority::Normal),
        }
    }
}

impl TryFrom<i32> for SchedulingPriority {
    type Error = Error;
    fn try_from(v: i32) -> Result<Self, Self::Error> {
        let p = proto::SchedulingPriority::try_from(v)
            .map_err(|_| Error::validation(format!("invalid scheduling_priority {v}")))?;
        SchedulingPriority::try_from(p)
    }
}

impl From<EventType> for proto::ExecutionEventType {
    fn from(e: EventType) -> Self {
        match e {
            EventType::StageStarted => proto::ExecutionEventType::StageStarted,
            EventType::StageCompleted => proto::ExecutionEventType::StageCompleted,
            EventType::StageFailed => proto::ExecutionEventType::StageFailed,
            EventType::PipelineCompleted => proto::ExecutionEventType::PipelineCompleted,
            EventType::InterruptRaised => proto::ExecutionEventType::InterruptRaised,
            EventType::BoundsExceeded => proto::ExecutionEventType::BoundsExceeded,
            EventType::CheckpointCreated => proto::ExecutionEventType::CheckpointCreated,
        }
    }
}

// =============================================================================
// ResourceQuota / ResourceUsage
// =============================================================================

impl From<&ResourceQuota> for proto::ResourceQuota {
    fn from(q: &ResourceQuota) -> Self {
        Self {
            max_llm_calls: q.max_llm_calls as u32,
            max_tool_calls: q.max_tool_calls as u32,
            max_agent_hops: q.max_agent_hops as u32,
            max_iterations: q.max_iterations as u32,
            timeout_seconds: q.timeout_seconds as u32,
            soft_timeout_seconds: q.soft_timeout_seconds as u32,
            max_input_tokens: q.max_input_tokens,
            max_output_tokens: q.max_output_tokens,
            max_context_tokens: q.max_context_tokens,
            rate_limit_rpm: q.rate_limit_rpm as u32,
            rate_limit_rph: q.rate_limit_rph as u32,
            rate_limit_burst: q.rate_limit_burst as u32,
            max_inference_requests: q.max_inference_requests as u32,
            max_inference_input_chars: q.max_inference_input_chars,
        }
    }
}

impl From<proto::ResourceQuota> for ResourceQuota {
    fn from(q: proto::ResourceQuota) -> Self {
        Self {
            max_llm_calls: q.max_llm_calls as i32,
            max_tool_calls: q.max_tool_calls as i32,
            max_agent_hops: q.max_agent_hops as i32,
            max_iterations: q.max_iterations as i32,
            timeout_seconds: q.timeout_seconds as i32,
            soft_timeout_seconds: q.soft_timeout_seconds as i32,
            max_input_tokens: q.max_input_tokens,
            max_output_tokens: q.max_output_tokens,
            max_context_tokens: q.max_context_tokens,
            rate_limit_rpm: q.rate_limit_rpm as i32,
            rate_limit_rph: q.rate_limit_rph as i32,
            rate_limit_burst: q.rate_limit_burst as i32,
            max_inference_requests: q.max_inference_requests as i32,
            max_inference_input_chars: q.max_inference_input_chars,
        }
    }
}

impl From<&ResourceUsage> for proto::ResourceUsage {
    fn from(u: &ResourceUsage) -> Self {
        Self {
            llm_calls: u.llm_calls as u32,
            tool_calls: u.tool_calls as u32,
            agent_hops: u.agent_hops as u32,
            iterations: u.iterations as u32,
            tokens_in: u.tokens_in,
            tokens_out: u.tokens_out,
            elapsed_seconds: u.elapsed_seconds,
            inference_requests: u.inference_requests as u32,
            inference_input_chars: u.inference_input_chars,
        }
    }
}

// =============================================================================
// ProcessControlBlock
// =============================================================================

impl From<&ProcessControlBlock> for proto::ProcessControlBlock {
    fn from(pcb: &ProcessControlBlock) -> Self {
        Self {
            pid: pcb.pid.clone(),
            request_id: pcb.request_id.clone(),
            user_id: pcb.user_id.clone(),
            session_id: pcb.session_id.clone(),
            state: proto::ProcessState::from(pcb.state) as i32,
            priority: proto::SchedulingPriority::from(pcb.priority) as i32,
            quota: Some(proto::ResourceQuota::from(&pcb.quota)),
            usage: Some(proto::ResourceUsage::from(&pcb.usage)),
            created_at_ms: datetime_to_ms(pcb.created_at),
            started_at_ms: pcb.started_at.map(datetime_to_ms),
            completed_at_ms: pcb.completed_at.map(datetime_to_ms),
            last_scheduled_at_ms: pcb.last_scheduled_at.map(datetime_to_ms),
            current_stage: pcb.current_stage.clone(),
            current_service: pcb.current_service.clone(),
            pending_interrupt: pcb
                .pending_interrupt
                .map(|k| proto::InterruptKind::from(k) as i32),
            interrupt_data_json: pcb
                .interrupt_data
                .as_ref()
                .map(to_json_bytes)
                .unwrap_or_default(),
            parent_pid: pcb.parent_pid.clone(),
            child_pids: pcb.child_pids.clone(),
        }
    }
}

// =============================================================================
// Envelope sub-structs
// =============================================================================

impl From<&Identity> for proto::Identity {
    fn from(id: &Identity) -> Self {
        Self {
            envelope_id: id.envelope_id.clone(),
            request_id: id.request_id.clone(),
            user_id: id.user_id.clone(),
            session_id: id.session_id.clone(),
        }
    }
}

impl From<&Pipeline> for proto::PipelineState {
    fn from(p: &Pipeline) -> Self {
        Self {
            current_stage: p.current_stage.clone(),
            stage_order: p.stage_order.clone(),
            iteration: p.iteration as u32,
            max_iterations: p.max_iterations as u32,
            active_stages: p.active_stages.iter().cloned().collect(),
            completed_stage_set: p.completed_stage_set.iter().cloned().collect(),
            failed_stages: p.failed_stages.clone(),
            edge_traversals: p.edge_traversals.clone(),
        }
    }
}

impl From<&Bounds> for proto::Bounds {
    fn from(b: &Bounds) -> Self {
        Self {
            llm_call_count: b.llm_call_count as u32,
            max_llm_calls: b.max_llm_calls as u32,
            tool_call_count: b.tool_call_count as u32,
            agent_hop_count: b.agent_hop_count as u32,
            max_agent_hops: b.max_agent_hops as u32,
            tokens_in: b.tokens_in,
            tokens_out: b.tokens_out,
            terminal_reason: b.terminal_reason.map(|r| proto::TerminalReason::from(r) as i32),
            termination_detail: b.termination_detail.clone(),
        }
    }
}

impl From<&InterruptResponse> for proto::InterruptResponse {
    fn from(r: &InterruptResponse) -> Self {
        Self {
            text: r.text.clone(),
            approved: r.approved,
            decision: r.decision.clone(),
            data_json: r.data.as_ref().map(to_json_bytes).unwrap_or_default(),
            received_at_ms: datetime_to_ms(r.received_at),
        }
    }
}

impl From<&FlowInterrupt> for proto::FlowInterrupt {
    fn from(i: &FlowInterrupt) -> Self {
        Self {
            kind: proto::InterruptKind::from(i.kind) as i32,
            id: i.id.clone(),
            question: i.question.clone(),
            message: i.message.clone(),
            data_json: i.data.as_ref().map(to_json_bytes).unwrap_or_default(),
            response: i.response.as_ref().map(proto::InterruptResponse::from),
            created_at_ms: datetime_to_ms(i.created_at),
            expires_at_ms: i.expires_at.map(datetime_to_ms),
        }
    }
}

impl From<&InterruptState> for proto::InterruptState {
    fn from(s: &InterruptState) -> Self {
        Self {
            interrupt_pending: s.interrupt_pending,
            interrupt: s.interrupt.as_ref().map(proto::FlowInterrupt::from),
        }
    }
}

impl From<&DomainExecution> for proto::ExecutionState {
    fn from(e: &DomainExecution) -> Self {
        Self {
            all_goals: e.all_goals.clone(),
            remaining_goals: e.remaining_goals.clone(),
            goal_completion_status: e.goal_completion_status.clone(),
            prior_plans_json: e.prior_plans.iter().map(to_json_bytes).collect(),
            loop_feedback: e.loop_feedback.clone(),
        }
    }
}

impl From<&ProcessingRecord> for proto::ProcessingRecord {
    fn from(r: &ProcessingRecord) -> Self {
        Self {
            agent: r.agent.clone(),
            stage_order: r.stage_order as u32,
            started_at_ms: datetime_to_ms(r.started_at),
            completed_at_ms: r.completed_at.map(datetime_to_ms),
            duration_ms: r.duration_ms,
            outcome: proto::OutcomeTag::from(r.outcome) as i32,
            output_fingerprint: r.output_fingerprint.clone(),
            error: r.error.clone(),
            llm_calls: r.llm_calls as u32,
        }
    }
}

impl From<&Audit> for proto::AuditTrail {
    fn from(a: &Audit) -> Self {
        Self {
            processing_history: a.processing_history.iter().map(proto::ProcessingRecord::from).collect(),
            errors_json: a.errors.iter().map(to_json_bytes).collect(),
            created_at_ms: datetime_to_ms(a.created_at),
            completed_at_ms: a.completed_at.map(datetime_to_ms),
            metadata_json: to_json_bytes(&a.metadata),
        }
    }
}

impl From<&Envelope> for proto::Envelope {
    fn from(env: &Envelope) -> Self {
        Self {
            identity: Some(proto::Identity::from(&env.identity)),
            pipeline: Some(proto::PipelineState::from(&env.pipeline)),
            bounds: Some(proto::Bounds::from(&env.bounds)),
            interrupt_state: Some(proto::InterruptState::from(&env.interrupts)),
            execution: Some(proto::ExecutionState::from(&env.execution)),
            audit: Some(proto::AuditTrail::from(&env.audit)),
        }
    }
}

impl TryFrom<proto::Envelope> for Envelope {
    type Error = Error;

    fn try_from(p: proto::Envelope) -> Result<Self, Self::Error> {
        let identity = p.identity.ok_or_else(|| Error::validation("envelope.identity is required"))?;
        let pipeline = p.pipeline.ok_or_else(|| Error::validation("envelope.pipeline is required"))?;
        let bounds = p.bounds.ok_or_else(|| Error::validation("envelope.bounds is required"))?;
        let interrupt_state = p
            .interrupt_state
            .ok_or_else(|| Error::validation("envelope.interrupt_state is required"))?;
        let execution = p
            .execution
            .ok_or_else(|| Error::validation("envelope.execution is required"))?;
        let audit = p.audit.ok_or_else(|| Error::validation("envelope.audit is required"))?;

        let terminal_reason = bounds
            .terminal_reason
            .map(|v| {
                proto::TerminalReason::try_from(v)
                    .map_err(|_| Error::validation("invalid terminal_reason"))
                    .and_then(TerminalReason::try_from)
            })
            .transpose()?;

        let interrupt = interrupt_state
            .interrupt
            .map(flow_interrupt_from_proto)
            .transpose()?;

        Ok(Envelope {
            identity: Identity {
                envelope_id: identity.envelope_id,
                request_id: identity.request_id,
                user_id: identity.user_id,
                session_id: identity.session_id,
            },
            raw_input: String::new(),
            outputs: HashMap::new(),
            pipeline: Pipeline {
                current_stage: pipeline.current_stage,
                stage_order: pipeline.stage_order,
                iteration: pipeline.iteration as i32,
                max_iterations: pipeline.max_iterations as i32,
                active_stages: pipeline.active_stages.into_iter().collect::<HashSet<_>>(),
                completed_stage_set: pipeline.completed_stage_set.into_iter().collect::<HashSet<_>>(),
                failed_stages: pipeline.failed_stages,
                edge_traversals: pipeline.edge_traversals,
            },
            bounds: Bounds {
                llm_call_count: bounds.llm_call_count as i32,
                max_llm_calls: bounds.max_llm_calls as i32,
                tool_call_count: bounds.tool_call_count as i32,
                agent_hop_count: bounds.agent_hop_count as i32,
                max_agent_hops: bounds.max_agent_hops as i32,
                tokens_in: bounds.tokens_in,
                tokens_out: bounds.tokens_out,
                terminal_reason,
                termination_detail: bounds.termination_detail,
            },
            interrupts: InterruptState {
                interrupt_pending: interrupt_state.interrupt_pending,
                interrupt,
            },
            execution: DomainExecution {
                all_goals: execution.all_goals,
                remaining_goals: execution.remaining_goals,
                goal_completion_status: execution.goal_completion_status,
                prior_plans: execution
                    .prior_plans_json
                    .iter()
                    .map(|b| from_json_bytes(b))
                    .collect(),
                loop_feedback: execution.loop_feedback,
            },
            audit: Audit {
                processing_history: audit
                    .processing_history
                    .into_iter()
                    .map(processing_record_from_proto)
                    .collect::<Result<Vec<_>, _>>()?,
                errors: audit.errors_json.iter().map(|b| from_json_bytes(b)).collect(),
                created_at: ms_to_datetime(audit.created_at_ms),
                completed_at: audit.completed_at_ms.map(ms_to_datetime),
                metadata: from_json_bytes(&audit.metadata_json),
            },
        })
    }
}

fn processing_record_from_proto(r: proto::ProcessingRecord) -> Result<ProcessingRecord, Error> {
    let outcome = proto::OutcomeTag::try_from(r.outcome)
        .map_err(|_| Error::validation("invalid outcome tag"))
        .and_then(OutcomeTag::try_from)?;
    Ok(ProcessingRecord {
        agent: r.agent,
        stage_order: r.stage_order as i32,
        started_at: ms_to_datetime(r.started_at_ms),
        completed_at: r.completed_at_ms.map(ms_to_datetime),
        duration_ms: r.duration_ms,
        outcome,
        output_fingerprint: r.output_fingerprint,
        error: r.error,
        llm_calls: r.llm_calls as i32,
    })
}

fn flow_interrupt_from_proto(i: proto::FlowInterrupt) -> Result<FlowInterrupt, Error> {
    let kind = proto::InterruptKind::try_from(i.kind)
        .map_err(|_| Error::validation("invalid interrupt kind"))
        .and_then(InterruptKind::try_from)?;
    Ok(FlowInterrupt {
        kind,
        id: i.id,
        question: i.question,
        message: i.message,
        data: if i.data_json.is_empty() {
            None
        } else {
            Some(from_json_bytes(&i.data_json))
        },
        response: i.response.map(|r| InterruptResponse {
            text: r.text,
            approved: r.approved,
            decision: r.decision,
            data: if r.data_json.is_empty() {
                None
            } else {
                Some(from_json_bytes(&r.data_json))
            },
            received_at: ms_to_datetime(r.received_at_ms),
        }),
        created_at: ms_to_datetime(i.created_at_ms),
        expires_at: i.expires_at_ms.map(ms_to_datetime),
    })
}

// =============================================================================
// DAG orchestrator config
// =============================================================================

impl TryFrom<proto::RoutingRule> for RoutingRule {
    type Error = Error;
    fn try_from(r: proto::RoutingRule) -> Result<Self, Self::Error> {
        let predicate = match r.predicate_kind.as_str() {
            "always" => RoutingPredicate::Always,
            "field_present" => RoutingPredicate::FieldPresent {
                field: r.field.ok_or_else(|| Error::validation("field_present requires field"))?,
            },
            "field_equals" => RoutingPredicate::FieldEquals {
                field: r.field.ok_or_else(|| Error::validation("field_equals requires field"))?,
                value: r
                    .value_json
                    .map(|s| serde_json::from_str(&s).unwrap_or(serde_json::Value::Null))
                    .unwrap_or(serde_json::Value::Null),
            },
            "outcome_is" => {
                let outcome_str = r.value_json.ok_or_else(|| Error::validation("outcome_is requires value_json"))?;
                let outcome: OutcomeTag =
                    serde_json::from_str(&outcome_str).map_err(|e| Error::validation(e.to_string()))?;
                RoutingPredicate::OutcomeIs { outcome }
            }
            other => return Err(Error::validation(format!("unknown routing predicate kind: {other}"))),
        };
        Ok(RoutingRule {
            predicate,
            target: r.target,
        })
    }
}

impl TryFrom<proto::DagNode> for DagNode {
    type Error = Error;
    fn try_from(n: proto::DagNode) -> Result<Self, Self::Error> {
        Ok(DagNode {
            agent_name: n.agent_name,
            stage_order: n.stage_order as i32,
            requires: n.requires.into_iter().collect(),
            default_next: n.default_next.unwrap_or_else(|| crate::kernel::orchestrator::SINK.to_string()),
            routing_rules: n
                .routing_rules
                .into_iter()
                .map(RoutingRule::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl TryFrom<proto::PipelineConfig> for PipelineConfig {
    type Error = Error;
    fn try_from(p: proto::PipelineConfig) -> Result<Self, Self::Error> {
        Ok(PipelineConfig {
            name: p.name,
            nodes: p
                .nodes
                .into_iter()
                .map(DagNode::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            edge_limits: p.edge_limits,
        })
    }
}

impl From<&ExecutionEvent> for proto::ExecutionEvent {
    fn from(e: &ExecutionEvent) -> Self {
        Self {
            event_type: proto::ExecutionEventType::from(e.event_type) as i32,
            stage: e.stage.clone(),
            timestamp_ms: e.timestamp_ms,
            payload_json: to_json_bytes(&e.payload),
            envelope: e.envelope.as_ref().map(proto::Envelope::from),
        }
    }
}
