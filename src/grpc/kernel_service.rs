//! KernelService — process lifecycle gRPC implementation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::{Request, Response, Status};

use crate::kernel::{Kernel, ProcessState, SchedulingPriority};
use crate::proto::kernel_service_server::KernelService;
use crate::proto::{
    CreateProcessRequest, CreateProcessResponse, GetProcessRequest, GetProcessResponse,
    GetSystemStatusRequest, GetSystemStatusResponse, ListProcessesRequest, ListProcessesResponse,
    ProcessControlBlock, TerminateProcessRequest, TerminateProcessResponse,
    TransitionProcessRequest, TransitionProcessResponse,
};
use crate::types::{Error, ProcessId, RequestId, SessionId, UserId};

/// KernelService implementation wrapping the shared `Kernel` actor.
#[derive(Debug)]
pub struct KernelServiceImpl {
    kernel: Arc<Mutex<Kernel>>,
}

impl KernelServiceImpl {
    pub fn new(kernel: Arc<Mutex<Kernel>>) -> Self {
        Self { kernel }
    }
}

fn id<T>(from_string: impl Fn(String) -> Result<T, &'static str>, value: String) -> Result<T, Status> {
    from_string(value).map_err(|e| Status::invalid_argument(e))
}

#[tonic::async_trait]
impl KernelService for KernelServiceImpl {
    async fn create_process(
        &self,
        request: Request<CreateProcessRequest>,
    ) -> Result<Response<CreateProcessResponse>, Status> {
        let req = request.into_inner();

        let pid = id(ProcessId::from_string, req.pid)?;
        let request_id = id(RequestId::from_string, req.request_id)?;
        let user_id = id(UserId::from_string, req.user_id)?;
        let session_id = id(SessionId::from_string, req.session_id)?;
        let priority = SchedulingPriority::try_from(req.priority).map_err(|e| e.to_grpc_status())?;
        let quota = req.quota.map(crate::kernel::ResourceQuota::from);

        let mut kernel = self.kernel.lock().await;
        let pcb = kernel
            .create_process(pid, request_id, user_id, session_id, priority, quota)
            .map_err(|e| e.to_grpc_status())?;

        Ok(Response::new(CreateProcessResponse {
            pcb: Some(ProcessControlBlock::from(&pcb)),
        }))
    }

    async fn get_process(
        &self,
        request: Request<GetProcessRequest>,
    ) -> Result<Response<GetProcessResponse>, Status> {
        let req = request.into_inner();
        let pid = id(ProcessId::from_string, req.pid)?;

        let kernel = self.kernel.lock().await;
        let pcb = kernel
            .get_process(&pid)
            .ok_or_else(|| Error::not_found(format!("process {pid} not found")).to_grpc_status())?;

        Ok(Response::new(GetProcessResponse {
            pcb: Some(ProcessControlBlock::from(pcb)),
        }))
    }

    async fn transition_process(
        &self,
        request: Request<TransitionProcessRequest>,
    ) -> Result<Response<TransitionProcessResponse>, Status> {
        let req = request.into_inner();
        let pid = id(ProcessId::from_string, req.pid)?;
        let new_state = ProcessState::try_from(req.new_state).map_err(|e| e.to_grpc_status())?;

        let mut kernel = self.kernel.lock().await;
        let current = kernel
            .get_process(&pid)
            .ok_or_else(|| Error::not_found(format!("process {pid} not found")).to_grpc_status())?
            .state;

        if !current.can_transition_to(new_state) {
            return Err(
                Error::state_transition(format!("cannot transition {current:?} -> {new_state:?}"))
                    .to_grpc_status(),
            );
        }

        match new_state {
            ProcessState::Ready => kernel.lifecycle.schedule(&pid).map_err(|e| e.to_grpc_status())?,
            ProcessState::Running => kernel.start_process(&pid).map_err(|e| e.to_grpc_status())?,
            ProcessState::Terminated => kernel.terminate_process(&pid).map_err(|e| e.to_grpc_status())?,
            ProcessState::Blocked => kernel
                .block_process(&pid, "requested by caller".to_string())
                .map_err(|e| e.to_grpc_status())?,
            ProcessState::Waiting | ProcessState::New | ProcessState::Zombie => {}
        }

        let pcb = kernel
            .get_process(&pid)
            .ok_or_else(|| Error::not_found(format!("process {pid} not found")).to_grpc_status())?;
        Ok(Response::new(TransitionProcessResponse {
            pcb: Some(ProcessControlBlock::from(pcb)),
        }))
    }

    async fn terminate_process(
        &self,
        request: Request<TerminateProcessRequest>,
    ) -> Result<Response<TerminateProcessResponse>, Status> {
        let req = request.into_inner();
        let pid = id(ProcessId::from_string, req.pid)?;

        let mut kernel = self.kernel.lock().await;
        kernel.terminate_process(&pid).map_err(|e| e.to_grpc_status())?;

        let pcb = kernel
            .get_process(&pid)
            .ok_or_else(|| Error::not_found(format!("process {pid} not found")).to_grpc_status())?;
        Ok(Response::new(TerminateProcessResponse {
            pcb: Some(ProcessControlBlock::from(pcb)),
        }))
    }

    async fn list_processes(
        &self,
        request: Request<ListProcessesRequest>,
    ) -> Result<Response<ListProcessesResponse>, Status> {
        let req = request.into_inner();
        let kernel = self.kernel.lock().await;
        let processes = kernel.list_processes();

        let filtered = match req.filter_state {
            Some(s) => {
                let state = ProcessState::try_from(s).map_err(|e| e.to_grpc_status())?;
                processes.into_iter().filter(|p| p.state == state).collect()
            }
            None => processes,
        };

        Ok(Response::new(ListProcessesResponse {
            processes: filtered.iter().map(ProcessControlBlock::from).collect(),
        }))
    }

    async fn get_system_status(
        &self,
        _request: Request<GetSystemStatusRequest>,
    ) -> Result<Response<GetSystemStatusResponse>, Status> {
        let kernel = self.kernel.lock().await;
        let status = kernel.get_system_status();

        let by_state: HashMap<String, u32> = status
            .processes_by_state
            .into_iter()
            .map(|(state, count)| (format!("{state:?}").to_lowercase(), count as u32))
            .collect();

        Ok(Response::new(GetSystemStatusResponse {
            total_processes: status.processes_total as u32,
            by_state,
        }))
    }
}
