//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the pipeline kernel.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation errors (map to gRPC INVALID_ARGUMENT).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (map to gRPC NOT_FOUND).
    #[error("not found: {0}")]
    NotFound(String),

    /// Quota or resource exhaustion (map to gRPC RESOURCE_EXHAUSTED).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Invalid state transition (map to gRPC FAILED_PRECONDITION).
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Internal errors (map to gRPC INTERNAL).
    #[error("internal error: {0}")]
    Internal(String),

    /// Cancellation — distinct terminal reason, never retried.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Timeout (map to gRPC DEADLINE_EXCEEDED).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Envelope counter bound exceeded (I1). Soft failure surfaced via
    /// `CanContinue`/`GetResult`, also stamped as the envelope terminal reason.
    #[error("bounds exceeded: {0}")]
    BoundsExceeded(String),

    /// A DAG edge was traversed more times than its `edge_limits` cap allows.
    #[error("cycle limit exceeded on edge {from} -> {to} (limit {limit})")]
    CycleLimitExceeded {
        from: String,
        to: String,
        limit: u32,
    },

    /// Mutation attempted on an envelope whose `terminal_reason` is already set.
    #[error("envelope already terminal: {0}")]
    TerminalAlready(String),

    /// A second handler was registered for a command type that already has one.
    #[error("handler already registered for: {0}")]
    HandlerAlreadyRegistered(String),

    /// A standard agent result failed its own `Validate` check.
    #[error("result validation error: {0}")]
    ResultValidation(String),

    /// Tool executor: no tool registered under this name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Communication bus: no handler registered for this command/query type.
    #[error("no handler registered for: {0}")]
    NoHandler(String),

    /// Interrupt store: no pending interaction with this id.
    #[error("interrupt not found: {0}")]
    InterruptNotFound(String),

    /// Interrupt store: `Resolve`/`Cancel`/`Expire` attempted on a non-pending row.
    #[error("interrupt already resolved: {0}")]
    AlreadyResolved(String),

    /// Communication bus query exceeded its deadline before the handler replied.
    #[error("query timed out after {elapsed_secs}s: {message_type}")]
    QueryTimeout {
        message_type: String,
        elapsed_secs: f64,
    },

    /// Communication bus circuit breaker is open for this message type.
    #[error("circuit open for: {0}")]
    CircuitOpen(String),

    /// Malformed wire/frame payload.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Transport read failure.
    #[error("read error: {0}")]
    ReadError(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// gRPC transport errors (boxed to reduce Result size).
    #[error("grpc error: {0}")]
    Grpc(#[from] Box<tonic::Status>),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convert to gRPC status code.
    pub fn to_grpc_status(&self) -> tonic::Status {
        match self {
            Error::Validation(msg) => tonic::Status::invalid_argument(msg),
            Error::NotFound(msg) => tonic::Status::not_found(msg),
            Error::ToolNotFound(msg) => tonic::Status::not_found(msg),
            Error::InterruptNotFound(msg) => tonic::Status::not_found(msg),
            Error::QuotaExceeded(msg) => tonic::Status::resource_exhausted(msg),
            Error::BoundsExceeded(msg) => tonic::Status::resource_exhausted(msg),
            Error::StateTransition(msg) => tonic::Status::failed_precondition(msg),
            Error::TerminalAlready(msg) => tonic::Status::failed_precondition(msg),
            Error::AlreadyResolved(msg) => tonic::Status::failed_precondition(msg),
            Error::HandlerAlreadyRegistered(msg) => tonic::Status::already_exists(msg),
            Error::CycleLimitExceeded { from, to, limit } => tonic::Status::resource_exhausted(
                format!("cycle limit exceeded on edge {from} -> {to} (limit {limit})"),
            ),
            Error::Cancelled(msg) => tonic::Status::cancelled(msg),
            Error::Timeout(msg) => tonic::Status::deadline_exceeded(msg),
            Error::QueryTimeout {
                message_type,
                elapsed_secs,
            } => tonic::Status::deadline_exceeded(format!(
                "query timed out after {elapsed_secs}s: {message_type}"
            )),
            Error::CircuitOpen(msg) => tonic::Status::unavailable(msg),
            Error::ResultValidation(msg) => tonic::Status::invalid_argument(msg),
            Error::NoHandler(msg) => tonic::Status::not_found(msg),
            Error::ParseError(msg) => tonic::Status::invalid_argument(msg),
            Error::ReadError(msg) => tonic::Status::unavailable(msg),
            Error::Internal(msg) => tonic::Status::internal(msg),
            Error::Serialization(e) => tonic::Status::internal(format!("serialization error: {e}")),
            Error::Grpc(status) => (**status).clone(),
            Error::Io(e) => tonic::Status::internal(format!("io error: {e}")),
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn bounds_exceeded(msg: impl Into<String>) -> Self {
        Self::BoundsExceeded(msg.into())
    }

    pub fn terminal_already(msg: impl Into<String>) -> Self {
        Self::TerminalAlready(msg.into())
    }

    pub fn handler_already_registered(msg: impl Into<String>) -> Self {
        Self::HandlerAlreadyRegistered(msg.into())
    }

    pub fn result_validation(msg: impl Into<String>) -> Self {
        Self::ResultValidation(msg.into())
    }

    pub fn tool_not_found(msg: impl Into<String>) -> Self {
        Self::ToolNotFound(msg.into())
    }

    pub fn no_handler(msg: impl Into<String>) -> Self {
        Self::NoHandler(msg.into())
    }

    pub fn interrupt_not_found(msg: impl Into<String>) -> Self {
        Self::InterruptNotFound(msg.into())
    }

    pub fn already_resolved(msg: impl Into<String>) -> Self {
        Self::AlreadyResolved(msg.into())
    }

    pub fn circuit_open(msg: impl Into<String>) -> Self {
        Self::CircuitOpen(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn read_error(msg: impl Into<String>) -> Self {
        Self::ReadError(msg.into())
    }
}

// Implement From<Error> for Status to enable ? operator in gRPC handlers
impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        err.to_grpc_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_exceeded_maps_to_resource_exhausted() {
        let status = Error::bounds_exceeded("iterations").to_grpc_status();
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);
    }

    #[test]
    fn cycle_limit_exceeded_carries_edge() {
        let err = Error::CycleLimitExceeded {
            from: "b".into(),
            to: "a".into(),
            limit: 1,
        };
        assert!(err.to_string().contains("b -> a"));
    }

    #[test]
    fn handler_already_registered_maps_to_already_exists() {
        let status = Error::handler_already_registered("command.foo").to_grpc_status();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
    }
}
