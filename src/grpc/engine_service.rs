//! EngineService — envelope lifecycle and pipeline execution.

use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use crate::envelope::{CreateParams, Envelope};
use crate::kernel::Kernel;
use crate::types::ProcessId;

use crate::proto::engine_service_server::EngineService as EngineServiceTrait;
use crate::proto::{
    CheckBoundsRequest, CheckBoundsResponse, CloneEnvelopeRequest, CloneEnvelopeResponse,
    CreateEnvelopeRequest, CreateEnvelopeResponse, ExecuteAgentRequest, ExecuteAgentResponse,
    ExecutePipelineRequest, ExecutionEvent, UpdateEnvelopeRequest, UpdateEnvelopeResponse,
};

/// EngineService implementation — owns no state of its own beyond the
/// shared kernel handle (single-writer actor, accessed via `&mut self`
/// behind the mutex).
#[derive(Debug, Clone)]
pub struct EngineServiceImpl {
    kernel: Arc<Mutex<Kernel>>,
}

impl EngineServiceImpl {
    pub fn new(kernel: Arc<Mutex<Kernel>>) -> Self {
        Self { kernel }
    }
}

#[tonic::async_trait]
impl EngineServiceTrait for EngineServiceImpl {
    async fn create_envelope(
        &self,
        request: Request<CreateEnvelopeRequest>,
    ) -> Result<Response<CreateEnvelopeResponse>, Status> {
        let req = request.into_inner();

        let params = CreateParams {
            user_id: none_if_empty(req.user_id),
            session_id: none_if_empty(req.session_id),
            raw_input: String::new(),
            metadata: Default::default(),
            stage_order: req.stage_order,
            max_iterations: positive(req.max_iterations),
            max_llm_calls: positive(req.max_llm_calls),
            max_agent_hops: positive(req.max_agent_hops),
        };
        let mut envelope = Envelope::create(params);
        if !req.request_id.is_empty() {
            envelope.identity.request_id = req.request_id;
        }
        envelope.execution.all_goals = req.all_goals.clone();
        envelope.execution.remaining_goals = req.all_goals;

        let mut kernel = self.kernel.lock().await;
        kernel.store_envelope(envelope.clone());

        Ok(Response::new(CreateEnvelopeResponse {
            envelope: Some((&envelope).into()),
        }))
    }

    async fn update_envelope(
        &self,
        request: Request<UpdateEnvelopeRequest>,
    ) -> Result<Response<UpdateEnvelopeResponse>, Status> {
        let req = request.into_inner();
        let proto_envelope = req
            .envelope
            .ok_or_else(|| Status::invalid_argument("envelope is required"))?;
        let envelope: Envelope = proto_envelope
            .try_into()
            .map_err(|e: crate::types::Error| e.to_grpc_status())?;

        let mut kernel = self.kernel.lock().await;
        if kernel.get_envelope(&req.envelope_id).is_none() {
            return Err(Status::not_found(format!("envelope not found: {}", req.envelope_id)));
        }
        kernel.store_envelope(envelope.clone());

        Ok(Response::new(UpdateEnvelopeResponse {
            envelope: Some((&envelope).into()),
        }))
    }

    async fn check_bounds(
        &self,
        request: Request<CheckBoundsRequest>,
    ) -> Result<Response<CheckBoundsResponse>, Status> {
        let req = request.into_inner();
        let kernel = self.kernel.lock().await;
        let envelope = kernel
            .get_envelope(&req.envelope_id)
            .ok_or_else(|| Status::not_found(format!("envelope not found: {}", req.envelope_id)))?;

        let (can_continue, reason) = envelope.can_continue();
        Ok(Response::new(CheckBoundsResponse {
            is_terminal: !can_continue,
            reason: reason.map(|r| crate::proto::TerminalReason::from(r) as i32),
        }))
    }

    type ExecutePipelineStream = Pin<Box<dyn Stream<Item = Result<ExecutionEvent, Status>> + Send>>;

    async fn execute_pipeline(
        &self,
        request: Request<ExecutePipelineRequest>,
    ) -> Result<Response<Self::ExecutePipelineStream>, Status> {
        let req = request.into_inner();
        let proto_config = req
            .pipeline
            .ok_or_else(|| Status::invalid_argument("pipeline is required"))?;
        let config: crate::kernel::orchestrator::PipelineConfig = proto_config
            .try_into()
            .map_err(|e: crate::types::Error| e.to_grpc_status())?;

        let process_id = ProcessId::must(req.envelope_id.clone());
        let kernel = self.kernel.clone();

        let stream = async_stream::stream! {
            let mut kernel_guard = kernel.lock().await;
            match kernel_guard.execute_pipeline(&process_id, &config).await {
                Ok(events) => {
                    for event in &events {
                        yield Ok(ExecutionEvent::from(event));
                    }
                }
                Err(e) => {
                    yield Err(e.to_grpc_status());
                }
            }
        };

        Ok(Response::new(Box::pin(stream)))
    }

    async fn execute_agent(
        &self,
        request: Request<ExecuteAgentRequest>,
    ) -> Result<Response<ExecuteAgentResponse>, Status> {
        let req = request.into_inner();
        let kernel = self.kernel.lock().await;
        let envelope = kernel
            .get_envelope(&req.envelope_id)
            .ok_or_else(|| Status::not_found(format!("envelope not found: {}", req.envelope_id)))?;

        let output = envelope
            .outputs
            .get(&req.agent_name)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let outcome = envelope
            .audit
            .processing_history
            .iter()
            .rev()
            .find(|r| r.agent == req.agent_name)
            .map(|r| r.outcome)
            .unwrap_or(crate::envelope::OutcomeTag::Skip);

        Ok(Response::new(ExecuteAgentResponse {
            outcome: crate::proto::OutcomeTag::from(outcome) as i32,
            output_json: serde_json::to_vec(&output).unwrap_or_default(),
            llm_calls: 0,
            interrupt: envelope.interrupts.interrupt.as_ref().map(crate::proto::FlowInterrupt::from),
        }))
    }

    async fn clone_envelope(
        &self,
        request: Request<CloneEnvelopeRequest>,
    ) -> Result<Response<CloneEnvelopeResponse>, Status> {
        let req = request.into_inner();
        let mut kernel = self.kernel.lock().await;
        let envelope = kernel
            .get_envelope(&req.envelope_id)
            .ok_or_else(|| Status::not_found(format!("envelope not found: {}", req.envelope_id)))?;

        let cloned = envelope.clone_fresh();
        kernel.store_envelope(cloned.clone());

        Ok(Response::new(CloneEnvelopeResponse {
            envelope: Some((&cloned).into()),
        }))
    }
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn positive(v: u32) -> Option<i32> {
    if v == 0 {
        None
    } else {
        Some(v as i32)
    }
}
