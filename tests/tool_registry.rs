//! ToolService — catalog introspection and dispatch wired through the kernel.

use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::Request;

use pipeline_kernel::envelope::enums::{RiskSemantic, ToolCategory};
use pipeline_kernel::grpc::ToolServiceImpl;
use pipeline_kernel::kernel::Kernel;
use pipeline_kernel::proto::tool_service_server::ToolService as _;
use pipeline_kernel::proto::{
    ExecuteToolRequest, GetToolDefinitionRequest, HasToolRequest, ListToolsRequest,
};
use pipeline_kernel::tools::{ParamDef, ParamType, ToolEntry, ToolHandler};

struct EchoHandler;

#[async_trait::async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, params: serde_json::Value) -> Result<serde_json::Value, String> {
        Ok(params)
    }
}

fn kernel_with_echo_tool(grant_to: &[&str]) -> Arc<Mutex<Kernel>> {
    let kernel = Kernel::new();
    kernel
        .tools
        .register_tool(ToolEntry {
            id: "echo".to_string(),
            description: "echoes its input".to_string(),
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
    kernel.tools.register_handler("echo", Arc::new(EchoHandler)).unwrap();
    for agent in grant_to {
        kernel.tools.grant_access(agent, "echo");
    }
    Arc::new(Mutex::new(kernel))
}

#[tokio::test]
async fn list_tools_reports_registered_catalog_entries() {
    let kernel = kernel_with_echo_tool(&[]);
    let service = ToolServiceImpl::new(kernel);

    let response = service.list_tools(Request::new(ListToolsRequest {})).await.unwrap().into_inner();
    assert_eq!(response.tools.len(), 1);
    assert_eq!(response.tools[0].id, "echo");
    assert_eq!(response.tools[0].risk_semantic, "read_only");
}

#[tokio::test]
async fn has_tool_and_get_definition_agree_with_the_catalog() {
    let kernel = kernel_with_echo_tool(&[]);
    let service = ToolServiceImpl::new(kernel);

    let has = service
        .has_tool(Request::new(HasToolRequest { tool_id: "echo".to_string() }))
        .await
        .unwrap()
        .into_inner();
    assert!(has.exists);

    let missing = service
        .has_tool(Request::new(HasToolRequest { tool_id: "nope".to_string() }))
        .await
        .unwrap()
        .into_inner();
    assert!(!missing.exists);

    let definition = service
        .get_tool_definition(Request::new(GetToolDefinitionRequest { tool_id: "echo".to_string() }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(definition.tool.unwrap().parameters[0].name, "text");
}

#[tokio::test]
async fn execute_tool_rejects_unauthorized_agent() {
    let kernel = kernel_with_echo_tool(&[]);
    let service = ToolServiceImpl::new(kernel);

    let result = service
        .execute_tool(Request::new(ExecuteToolRequest {
            agent_name: "reporter".to_string(),
            tool_id: "echo".to_string(),
            params_json: serde_json::to_vec(&serde_json::json!({"text": "hi"})).unwrap(),
        }))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn execute_tool_dispatches_for_a_granted_agent() {
    let kernel = kernel_with_echo_tool(&["reporter"]);
    let service = ToolServiceImpl::new(kernel);

    let response = service
        .execute_tool(Request::new(ExecuteToolRequest {
            agent_name: "reporter".to_string(),
            tool_id: "echo".to_string(),
            params_json: serde_json::to_vec(&serde_json::json!({"text": "hi"})).unwrap(),
        }))
        .await
        .unwrap()
        .into_inner();
    let output: serde_json::Value = serde_json::from_slice(&response.output_json).unwrap();
    assert_eq!(output, serde_json::json!({"text": "hi"}));
}
