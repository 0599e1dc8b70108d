//! Tool registry (C2) — catalog, validation, access control, health
//! tracking, and dispatch to registered handlers.

pub mod access;
pub mod catalog;
pub mod executor;
pub mod health;

pub use access::ToolAccessPolicy;
pub use catalog::{ParamDef, ParamType, ToolCatalog, ToolEntry};
pub use executor::{ToolCallResult, ToolExecutor, ToolHandler};
pub use health::{HealthConfig, ToolHealthTracker};
