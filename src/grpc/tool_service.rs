//! ToolService — read-only catalog introspection plus dispatch over the
//! kernel's `ToolExecutor`. Handlers themselves are registered in-process
//! (`Kernel::tools::register_handler`); there is no RPC for that because a
//! handler is a closure, not data that crosses the wire.

use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::{Request, Response, Status};

use crate::kernel::Kernel;
use crate::proto::tool_service_server::ToolService as ToolServiceTrait;
use crate::proto::{
    ExecuteToolRequest, ExecuteToolResponse, GetToolDefinitionRequest, GetToolDefinitionResponse,
    HasToolRequest, HasToolResponse, ListToolsRequest, ListToolsResponse, ToolDefinition, ToolParam,
};
use crate::envelope::enums::{RiskSemantic, ToolCategory};
use crate::tools::ToolEntry;

fn risk_semantic_str(r: RiskSemantic) -> &'static str {
    match r {
        RiskSemantic::ReadOnly => "read_only",
        RiskSemantic::Write => "write",
        RiskSemantic::Destructive => "destructive",
    }
}

fn category_str(c: ToolCategory) -> &'static str {
    match c {
        ToolCategory::Read => "read",
        ToolCategory::Write => "write",
        ToolCategory::Execute => "execute",
        ToolCategory::Network => "network",
        ToolCategory::System => "system",
        ToolCategory::Unified => "unified",
        ToolCategory::Composite => "composite",
        ToolCategory::Resilient => "resilient",
        ToolCategory::Standalone => "standalone",
        ToolCategory::Internal => "internal",
    }
}

#[derive(Debug, Clone)]
pub struct ToolServiceImpl {
    kernel: Arc<Mutex<Kernel>>,
}

impl ToolServiceImpl {
    pub fn new(kernel: Arc<Mutex<Kernel>>) -> Self {
        Self { kernel }
    }
}

fn to_proto_definition(entry: &ToolEntry) -> ToolDefinition {
    ToolDefinition {
        id: entry.id.clone(),
        description: entry.description.clone(),
        parameters: entry
            .parameters
            .iter()
            .map(|p| ToolParam {
                name: p.name.clone(),
                param_type: p.param_type.display_name(),
                description: p.description.clone(),
                required: p.is_required(),
                default_json: p.default.as_ref().map(|v| serde_json::to_vec(v).unwrap_or_default()),
            })
            .collect(),
        category: category_str(entry.category).to_string(),
        risk_semantic: risk_semantic_str(entry.risk_semantic).to_string(),
    }
}

#[tonic::async_trait]
impl ToolServiceTrait for ToolServiceImpl {
    async fn list_tools(
        &self,
        _request: Request<ListToolsRequest>,
    ) -> Result<Response<ListToolsResponse>, Status> {
        let kernel = self.kernel.lock().await;
        let tools = kernel.tools.list_definitions().iter().map(to_proto_definition).collect();
        Ok(Response::new(ListToolsResponse { tools }))
    }

    async fn get_tool_definition(
        &self,
        request: Request<GetToolDefinitionRequest>,
    ) -> Result<Response<GetToolDefinitionResponse>, Status> {
        let req = request.into_inner();
        let kernel = self.kernel.lock().await;
        let tool = kernel.tools.get_definition(&req.tool_id).as_ref().map(to_proto_definition);
        Ok(Response::new(GetToolDefinitionResponse { tool }))
    }

    async fn has_tool(
        &self,
        request: Request<HasToolRequest>,
    ) -> Result<Response<HasToolResponse>, Status> {
        let req = request.into_inner();
        let kernel = self.kernel.lock().await;
        Ok(Response::new(HasToolResponse { exists: kernel.tools.has_tool(&req.tool_id) }))
    }

    async fn execute_tool(
        &self,
        request: Request<ExecuteToolRequest>,
    ) -> Result<Response<ExecuteToolResponse>, Status> {
        let req = request.into_inner();
        let params: serde_json::Value =
            serde_json::from_slice(&req.params_json).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let kernel = self.kernel.lock().await;
        let result = kernel
            .tools
            .execute(&req.agent_name, &req.tool_id, params)
            .await
            .map_err(|e| e.to_grpc_status())?;

        Ok(Response::new(ExecuteToolResponse {
            output_json: serde_json::to_vec(&result.output).unwrap_or_default(),
            latency_ms: result.latency_ms,
        }))
    }
}
