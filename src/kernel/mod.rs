//! Kernel - the main orchestration actor.
//!
//! The Kernel owns all mutable state and processes IPC commands via a single
//! message channel. Subsystems (lifecycle, resources, interrupts, rate limiter)
//! are plain structs owned by the Kernel, not separate actors.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

// Core types
pub mod types;

// Subsystem modules
pub mod cleanup;
pub mod interrupts;
pub mod lifecycle;
pub mod orchestrator;
pub mod rate_limiter;
pub mod recovery;
pub mod resources;

// Re-export key types
pub use cleanup::{CleanupConfig, CleanupService, CleanupStats};
pub use interrupts::{InterruptConfig, InterruptService, InterruptStatus, KernelInterrupt};
pub use lifecycle::LifecycleManager;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use recovery::with_recovery;
pub use resources::ResourceTracker;
pub use types::{
    ProcessControlBlock, ProcessState, ResourceQuota, ResourceUsage, SchedulingPriority,
};

use crate::envelope::{Envelope, FlowInterrupt, InterruptResponse};
use crate::tools::{HealthConfig, ToolAccessPolicy, ToolCatalog, ToolExecutor, ToolHealthTracker};
use crate::types::{Error, ProcessId, RequestId, Result, SessionId, UserId};

/// Default ceiling on a single tool call's wall-clock time.
const DEFAULT_TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Kernel - the main orchestrator.
///
/// Owns all subsystems and provides unified interface for process management.
/// NOT an actor in the message-passing sense - called directly via &mut self.
#[derive(Debug)]
pub struct Kernel {
    /// Process lifecycle management
    pub lifecycle: LifecycleManager,

    /// Resource tracking and quota enforcement
    pub resources: ResourceTracker,

    /// Rate limiting per user
    pub rate_limiter: RateLimiter,

    /// Interrupt handling (human-in-the-loop)
    pub interrupts: interrupts::InterruptService,

    /// Pipeline orchestration (kernel-driven DAG execution)
    pub orchestrator: orchestrator::DagExecutor,

    /// Communication bus (kernel-mediated IPC)
    pub commbus: crate::commbus::CommBus,

    /// Tool registry: catalog, access policy, health, and dispatch.
    pub tools: ToolExecutor,

    /// Envelope storage (envelope_id -> envelope). Named for the pid-keyed
    /// access pattern the cleanup sweep uses when it evicts a stale
    /// session's envelope alongside the session itself.
    pub(crate) process_envelopes: HashMap<String, Envelope>,
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            lifecycle: LifecycleManager::default(),
            resources: ResourceTracker::default(),
            rate_limiter: RateLimiter::default(),
            interrupts: interrupts::InterruptService::new(),
            orchestrator: orchestrator::DagExecutor::new(),
            commbus: crate::commbus::CommBus::new(),
            tools: default_tool_executor(),
            process_envelopes: HashMap::new(),
        }
    }

    pub fn with_config(
        default_quota: Option<ResourceQuota>,
        rate_limit_config: Option<RateLimitConfig>,
    ) -> Self {
        Self {
            lifecycle: LifecycleManager::new(default_quota),
            resources: ResourceTracker::new(),
            rate_limiter: RateLimiter::new(rate_limit_config),
            interrupts: interrupts::InterruptService::new(),
            orchestrator: orchestrator::DagExecutor::new(),
            commbus: crate::commbus::CommBus::new(),
            tools: default_tool_executor(),
            process_envelopes: HashMap::new(),
        }
    }

    /// Create a new process.
    pub fn create_process(
        &mut self,
        pid: ProcessId,
        request_id: RequestId,
        user_id: UserId,
        session_id: SessionId,
        priority: SchedulingPriority,
        quota: Option<ResourceQuota>,
    ) -> Result<ProcessControlBlock> {
        // Check rate limit
        self.rate_limiter.check_rate_limit(user_id.as_str())?;

        // Submit process to lifecycle manager
        let pcb = self.lifecycle.submit(
            pid.clone(),
            request_id,
            user_id,
            session_id,
            priority,
            quota,
        )?;

        // Schedule it
        self.lifecycle.schedule(&pid)?;

        Ok(pcb)
    }

    /// Get process by PID.
    pub fn get_process(&self, pid: &ProcessId) -> Option<&ProcessControlBlock> {
        self.lifecycle.get(pid)
    }

    /// Store envelope.
    pub fn store_envelope(&mut self, envelope: Envelope) {
        self.process_envelopes
            .insert(envelope.identity.envelope_id.to_string(), envelope);
    }

    /// Get envelope by ID.
    pub fn get_envelope(&self, envelope_id: &str) -> Option<&Envelope> {
        self.process_envelopes.get(envelope_id)
    }

    /// Get mutable envelope by ID.
    pub fn get_envelope_mut(&mut self, envelope_id: &str) -> Option<&mut Envelope> {
        self.process_envelopes.get_mut(envelope_id)
    }

    /// Remove envelope.
    pub fn remove_envelope(&mut self, envelope_id: &str) -> Option<Envelope> {
        self.process_envelopes.remove(envelope_id)
    }

    /// Check process quota.
    pub fn check_quota(&self, pid: &ProcessId) -> Result<()> {
        let pcb = self
            .lifecycle
            .get(pid)
            .ok_or_else(|| Error::not_found(format!("Process {} not found", pid)))?;
        self.resources.check_quota(pcb)
    }

    /// Record resource usage.
    pub fn record_usage(
        &mut self,
        user_id: &str,
        llm_calls: i32,
        tool_calls: i32,
        tokens_in: i64,
        tokens_out: i64,
    ) {
        self.resources
            .record_usage(user_id, llm_calls, tool_calls, tokens_in, tokens_out);
    }

    /// Get next runnable process.
    pub fn get_next_runnable(&mut self) -> Option<ProcessControlBlock> {
        self.lifecycle.get_next_runnable()
    }

    /// Start a process.
    pub fn start_process(&mut self, pid: &ProcessId) -> Result<()> {
        self.lifecycle.start(pid)
    }

    /// Block a process (e.g., resource exhausted).
    pub fn block_process(&mut self, pid: &ProcessId, reason: String) -> Result<()> {
        self.lifecycle.block(pid, reason)
    }

    /// Wait a process (e.g., awaiting interrupt response).
    pub fn wait_process(&mut self, pid: &ProcessId, interrupt: FlowInterrupt) -> Result<()> {
        self.lifecycle.wait(pid, interrupt.kind)?;
        // Also set interrupt on envelope
        if let Some(env) = self.process_envelopes.get_mut(pid.as_str()) {
            env.set_interrupt(interrupt);
        }
        Ok(())
    }

    /// Resume a process from waiting/blocked.
    pub fn resume_process(&mut self, pid: &ProcessId) -> Result<()> {
        self.lifecycle.resume(pid)?;
        // Clear interrupt on envelope
        if let Some(env) = self.process_envelopes.get_mut(pid.as_str()) {
            env.clear_interrupt();
        }
        Ok(())
    }

    /// Terminate a process.
    pub fn terminate_process(&mut self, pid: &ProcessId) -> Result<()> {
        self.lifecycle.terminate(pid)?;
        // Freeze its envelope the same way a caller cancellation would.
        if let Some(env) = self.process_envelopes.get_mut(pid.as_str()) {
            env.terminate_on_cancel();
        }
        Ok(())
    }

    /// Cleanup and remove a terminated process.
    pub fn cleanup_process(&mut self, pid: &ProcessId) -> Result<()> {
        self.lifecycle.cleanup(pid)?;
        self.lifecycle.remove(pid)?;
        self.process_envelopes.remove(pid.as_str());
        Ok(())
    }

    /// List all processes.
    pub fn list_processes(&self) -> Vec<ProcessControlBlock> {
        self.lifecycle.list()
    }

    /// Count processes.
    pub fn process_count(&self) -> usize {
        self.lifecycle.count()
    }

    /// Count processes by state.
    pub fn process_count_by_state(&self, state: ProcessState) -> usize {
        self.lifecycle.count_by_state(state)
    }

    // =============================================================================
    // Interrupt Methods (Delegation to InterruptService)
    // =============================================================================

    /// Create a new interrupt for a process.
    pub fn create_interrupt(
        &mut self,
        params: interrupts::CreateInterruptParams,
    ) -> interrupts::KernelInterrupt {
        self.interrupts.create_interrupt(params)
    }

    /// Resolve an interrupt with a response.
    pub fn resolve_interrupt(
        &mut self,
        interrupt_id: &str,
        response: InterruptResponse,
        user_id: Option<&str>,
    ) -> bool {
        self.interrupts.resolve(interrupt_id, response, user_id)
    }

    /// Get the most recent pending interrupt for a request.
    pub fn get_pending_interrupt(&self, request_id: &str) -> Option<&interrupts::KernelInterrupt> {
        self.interrupts.get_pending_for_request(request_id)
    }

    /// `Sweep(now)`: expire interrupts past their TTL and, for each one still
    /// suspending an execution, resume that envelope with a terminal timeout
    /// outcome. Returns the ids of the interrupts that were expired.
    pub fn sweep_expired_interrupts(&mut self) -> Vec<String> {
        let expired_ids = self.interrupts.sweep_expired();
        for id in &expired_ids {
            let Some(record) = self.interrupts.get(id) else {
                continue;
            };
            let envelope_id = record.envelope_id.clone();
            if let Some(env) = self.process_envelopes.get_mut(&envelope_id) {
                let still_waiting = env
                    .interrupts
                    .interrupt
                    .as_ref()
                    .map(|i| i.id == *id)
                    .unwrap_or(false);
                if still_waiting {
                    env.terminate_on_interrupt_timeout(id);
                }
            }
        }
        expired_ids
    }

    // =============================================================================
    // Orchestrator Methods (Delegation to DagExecutor)
    // =============================================================================

    /// Register an in-process agent handler under its node name.
    pub fn register_agent_handler(
        &mut self,
        agent_name: impl Into<String>,
        handler: std::sync::Arc<dyn orchestrator::AgentHandler>,
    ) {
        self.orchestrator.register_handler(agent_name, handler);
    }

    /// Drive a pipeline's DAG to completion, suspension, or a bounds freeze
    /// for the process's stored envelope. The envelope is updated in place
    /// and left in `process_envelopes` for the caller to inspect or resume.
    pub async fn execute_pipeline(
        &mut self,
        pid: &ProcessId,
        config: &orchestrator::PipelineConfig,
    ) -> Result<Vec<orchestrator::ExecutionEvent>> {
        let envelope = self
            .process_envelopes
            .get_mut(pid.as_str())
            .ok_or_else(|| Error::not_found(format!("envelope for process {} not found", pid)))?;
        self.orchestrator.execute(config, envelope).await
    }

    // =============================================================================
    // Resource Tracking (Additional Methods)
    // =============================================================================

    /// Record a tool call for a process (PCB is the single source of truth).
    pub fn record_tool_call(&mut self, pid: &ProcessId) -> Result<()> {
        if let Some(pcb) = self.lifecycle.get_mut(pid) {
            pcb.usage.tool_calls += 1;
        }
        Ok(())
    }

    /// Record an agent hop for a process (PCB is the single source of truth).
    pub fn record_agent_hop(&mut self, pid: &ProcessId) -> Result<()> {
        if let Some(pcb) = self.lifecycle.get_mut(pid) {
            pcb.usage.agent_hops += 1;
        }
        Ok(())
    }

    // =============================================================================
    // Quota Defaults (Single Source of Truth)
    // =============================================================================

    /// Get the kernel's default quota.
    pub fn get_default_quota(&self) -> &ResourceQuota {
        self.lifecycle.get_default_quota()
    }

    /// Merge overrides into the default quota (non-zero fields overwrite).
    pub fn set_default_quota(&mut self, overrides: &ResourceQuota) {
        self.lifecycle.set_default_quota(overrides);
    }

    // =============================================================================
    // System Status Aggregation
    // =============================================================================

    /// Get a full system status snapshot.
    pub fn get_system_status(&self) -> SystemStatus {
        let total = self.lifecycle.count();
        let mut by_state = HashMap::new();
        for state in &[
            ProcessState::New,
            ProcessState::Ready,
            ProcessState::Running,
            ProcessState::Waiting,
            ProcessState::Blocked,
            ProcessState::Terminated,
            ProcessState::Zombie,
        ] {
            by_state.insert(*state, self.lifecycle.count_by_state(*state));
        }

        let active_envelopes = self
            .process_envelopes
            .values()
            .filter(|e| !e.bounds.is_terminal())
            .count();

        SystemStatus {
            processes_total: total,
            processes_by_state: by_state,
            active_orchestration_sessions: active_envelopes,
        }
    }

    /// Get remaining resource budget for a process.
    pub fn get_remaining_budget(&self, pid: &ProcessId) -> Option<RemainingBudget> {
        let pcb = self.lifecycle.get(pid)?;
        Some(RemainingBudget {
            llm_calls_remaining: (pcb.quota.max_llm_calls - pcb.usage.llm_calls).max(0),
            iterations_remaining: (pcb.quota.max_iterations - pcb.usage.iterations).max(0),
            agent_hops_remaining: (pcb.quota.max_agent_hops - pcb.usage.agent_hops).max(0),
            tokens_in_remaining: (pcb.quota.max_input_tokens as i64 - pcb.usage.tokens_in).max(0),
            tokens_out_remaining: (pcb.quota.max_output_tokens as i64 - pcb.usage.tokens_out)
                .max(0),
            time_remaining_seconds: if pcb.quota.timeout_seconds > 0 {
                (pcb.quota.timeout_seconds as f64 - pcb.usage.elapsed_seconds).max(0.0)
            } else {
                f64::MAX
            },
        })
    }
}

/// Remaining resource budget for a process.
#[derive(Debug, Clone)]
pub struct RemainingBudget {
    pub llm_calls_remaining: i32,
    pub iterations_remaining: i32,
    pub agent_hops_remaining: i32,
    pub tokens_in_remaining: i64,
    pub tokens_out_remaining: i64,
    pub time_remaining_seconds: f64,
}

/// Full system status snapshot returned by `Kernel::get_system_status()`.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub processes_total: usize,
    pub processes_by_state: HashMap<ProcessState, usize>,
    pub active_orchestration_sessions: usize,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

fn default_tool_executor() -> ToolExecutor {
    ToolExecutor::new(
        Arc::new(RwLock::new(ToolCatalog::new())),
        Arc::new(RwLock::new(ToolAccessPolicy::new())),
        Arc::new(RwLock::new(ToolHealthTracker::new(HealthConfig::default()))),
        DEFAULT_TOOL_CALL_TIMEOUT,
    )
}
