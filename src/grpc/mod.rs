//! gRPC service implementations.
//!
//! Implements the five services defined in `proto/engine.proto`:
//! - EngineService: envelope lifecycle and pipeline execution
//! - KernelService: process lifecycle
//! - OrchestrationService: session bootstrap and state introspection
//! - CommBusService: pub/sub, commands, and queries over the kernel's bus
//! - ToolService: tool catalog introspection and dispatch

mod commbus_service;
mod conversions;
mod engine_service;
mod kernel_service;
mod orchestration_service;
mod tool_service;

pub use commbus_service::CommBusServiceImpl;
pub use engine_service::EngineServiceImpl;
pub use kernel_service::KernelServiceImpl;
pub use orchestration_service::OrchestrationServiceImpl;
pub use tool_service::ToolServiceImpl;
