//! OrchestrationService — session bootstrap and state introspection.
//!
//! Execution itself runs through `EngineService::ExecutePipeline`; this
//! service only creates the envelope/process pair a session needs and lets
//! callers read back its state.

use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::{Request, Response, Status};

use crate::envelope::{CreateParams, Envelope};
use crate::kernel::orchestrator::PipelineConfig;
use crate::kernel::{Kernel, SchedulingPriority};
use crate::proto::orchestration_service_server::OrchestrationService as OrchestrationServiceTrait;
use crate::proto::{
    GetSessionStateRequest, GetSessionStateResponse, InitializeSessionRequest,
    InitializeSessionResponse,
};
use crate::types::{ProcessId, RequestId, SessionId, UserId};

#[derive(Debug, Clone)]
pub struct OrchestrationServiceImpl {
    kernel: Arc<Mutex<Kernel>>,
}

impl OrchestrationServiceImpl {
    pub fn new(kernel: Arc<Mutex<Kernel>>) -> Self {
        Self { kernel }
    }
}

#[tonic::async_trait]
impl OrchestrationServiceTrait for OrchestrationServiceImpl {
    async fn initialize_session(
        &self,
        request: Request<InitializeSessionRequest>,
    ) -> Result<Response<InitializeSessionResponse>, Status> {
        let req = request.into_inner();
        let proto_config = req
            .pipeline
            .ok_or_else(|| Status::invalid_argument("pipeline is required"))?;
        let config: PipelineConfig = proto_config
            .try_into()
            .map_err(|e: crate::types::Error| e.to_grpc_status())?;
        config.validate().map_err(Status::invalid_argument)?;

        let stage_order = config.stage_order();
        let params = CreateParams {
            user_id: Some(req.user_id.clone()),
            session_id: Some(req.session_id.clone()),
            raw_input: String::new(),
            metadata: Default::default(),
            stage_order,
            max_iterations: None,
            max_llm_calls: None,
            max_agent_hops: None,
        };
        let mut envelope = Envelope::create(params);
        if !req.request_id.is_empty() {
            envelope.identity.request_id = req.request_id.clone();
        }
        envelope.execution.all_goals = req.all_goals.clone();
        envelope.execution.remaining_goals = req.all_goals;

        let envelope_id = envelope.identity.envelope_id.clone();

        let mut kernel = self.kernel.lock().await;
        kernel
            .create_process(
                ProcessId::must(envelope_id.clone()),
                RequestId::from_string(envelope.identity.request_id.clone())
                    .map_err(Status::invalid_argument)?,
                UserId::from_string(envelope.identity.user_id.clone())
                    .map_err(Status::invalid_argument)?,
                SessionId::from_string(envelope.identity.session_id.clone())
                    .map_err(Status::invalid_argument)?,
                SchedulingPriority::Normal,
                None,
            )
            .map_err(|e| e.to_grpc_status())?;
        kernel.store_envelope(envelope.clone());

        Ok(Response::new(InitializeSessionResponse {
            envelope_id,
            envelope: Some((&envelope).into()),
        }))
    }

    async fn get_session_state(
        &self,
        request: Request<GetSessionStateRequest>,
    ) -> Result<Response<GetSessionStateResponse>, Status> {
        let req = request.into_inner();
        let kernel = self.kernel.lock().await;
        let envelope = kernel
            .get_envelope(&req.envelope_id)
            .ok_or_else(|| Status::not_found(format!("envelope not found: {}", req.envelope_id)))?;

        Ok(Response::new(GetSessionStateResponse {
            envelope: Some(envelope.into()),
        }))
    }
}
