//! Core enumerations for envelope and kernel.
//!
//! Canonical definitions for the pipeline wire protocol.

use serde::{Deserialize, Serialize};

/// Why processing terminated. Stamped on the envelope exactly once (I2);
/// a free-text detail (e.g. the failing agent name) lives alongside in
/// `Bounds::termination_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalReason {
    Completed,
    MaxIterationsExceeded,
    MaxLlmCallsExceeded,
    MaxAgentHopsExceeded,
    MaxStageVisitsExceeded,
    CycleLimitExceeded,
    UserCancelled,
    AgentError,
    ToolFailedFatally,
    LlmFailedFatally,
    PolicyViolation,
    /// A pending interrupt expired (TTL swept) before it was resolved.
    InterruptTimeout,
}

/// Qualitative result of a single agent invocation.
///
/// Drives both the executor's merge/route decision and the interrupt-raising
/// path: `Clarify`/`Confirm` suspend via the interrupt store, `Error`/
/// `Terminate` freeze the envelope, `Replan`/`LoopBack` take a backward edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTag {
    Success,
    Partial,
    Skip,
    Error,
    Clarify,
    Confirm,
    Replan,
    LoopBack,
    Terminate,
}

impl OutcomeTag {
    /// True for outcomes that end the pipeline or suspend it pending external input.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OutcomeTag::Error | OutcomeTag::Clarify | OutcomeTag::Confirm | OutcomeTag::Terminate
        )
    }

    /// True for outcomes that count as forward progress for routing purposes.
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeTag::Success | OutcomeTag::Partial | OutcomeTag::Skip)
    }

    /// True for outcomes that take a backward (loop) edge.
    pub fn requires_loop(self) -> bool {
        matches!(self, OutcomeTag::Replan | OutcomeTag::LoopBack)
    }

    /// True for outcomes that raise a pending interaction (C4) rather than
    /// freezing the envelope outright.
    pub fn raises_interrupt(self) -> bool {
        matches!(self, OutcomeTag::Clarify | OutcomeTag::Confirm)
    }
}

/// Interrupt type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    Clarification,
    Confirmation,
    AgentReview,
    Checkpoint,
    ResourceExhausted,
    Timeout,
    SystemError,
}

/// Risk semantic for tool/agent execution behavior.
///
/// Only `Destructive` requires confirmation before execution; idempotency
/// class is derived one-to-one from this enum (see `idempotency_class`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSemantic {
    ReadOnly,
    Write,
    Destructive,
}

/// Idempotency class implied by a risk semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyClass {
    Safe,
    NonIdempotent,
    Idempotent,
}

impl RiskSemantic {
    /// Only destructive operations gate execution on caller confirmation.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, RiskSemantic::Destructive)
    }

    pub fn idempotency_class(self) -> IdempotencyClass {
        match self {
            RiskSemantic::ReadOnly => IdempotencyClass::Safe,
            RiskSemantic::Write => IdempotencyClass::NonIdempotent,
            RiskSemantic::Destructive => IdempotencyClass::Idempotent,
        }
    }
}

/// Tool category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    // Operation types
    Read,
    Write,
    Execute,
    Network,
    System,
    // Organization
    Unified,
    Composite,
    Resilient,
    Standalone,
    Internal,
}

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Loop control verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopVerdict {
    Proceed,
    LoopBack,
    Advance,
    Escalate,
}

/// Risk approval status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskApproval {
    Approved,
    Denied,
    Pending,
}

/// Tool access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAccess {
    None,
    Read,
    Write,
    All,
}

/// Operation result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Error,
    NotFound,
    Timeout,
    ValidationError,
    Partial,
    InvalidParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_classification_partitions_the_taxonomy() {
        let terminal = [
            OutcomeTag::Error,
            OutcomeTag::Clarify,
            OutcomeTag::Confirm,
            OutcomeTag::Terminate,
        ];
        let success = [OutcomeTag::Success, OutcomeTag::Partial, OutcomeTag::Skip];
        let loops = [OutcomeTag::Replan, OutcomeTag::LoopBack];

        for t in terminal {
            assert!(t.is_terminal());
            assert!(!t.is_success());
            assert!(!t.requires_loop());
        }
        for s in success {
            assert!(s.is_success());
            assert!(!s.is_terminal());
            assert!(!s.requires_loop());
        }
        for l in loops {
            assert!(l.requires_loop());
            assert!(!l.is_terminal());
            assert!(!l.is_success());
        }
    }

    #[test]
    fn only_destructive_requires_confirmation() {
        assert!(!RiskSemantic::ReadOnly.requires_confirmation());
        assert!(!RiskSemantic::Write.requires_confirmation());
        assert!(RiskSemantic::Destructive.requires_confirmation());
    }

    #[test]
    fn idempotency_class_follows_risk() {
        assert_eq!(RiskSemantic::ReadOnly.idempotency_class(), IdempotencyClass::Safe);
        assert_eq!(
            RiskSemantic::Write.idempotency_class(),
            IdempotencyClass::NonIdempotent
        );
        assert_eq!(
            RiskSemantic::Destructive.idempotency_class(),
            IdempotencyClass::Idempotent
        );
    }
}
