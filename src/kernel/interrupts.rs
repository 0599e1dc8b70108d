//! Pending interrupt store (C4) — human-in-the-loop clarify/confirm flow.
//!
//! An interrupt raised against a running envelope (`FlowInterrupt`) is
//! mirrored here so the kernel can list, resolve, or expire it independently
//! of the envelope itself. Resolution writes the response back onto the
//! stored interrupt but does NOT touch the envelope — callers (the DAG
//! executor) are responsible for clearing `envelope.interrupts` once they
//! observe the resolution and resume the process.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::envelope::{FlowInterrupt, InterruptKind, InterruptResponse};

/// Lifecycle status of a kernel-tracked interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptStatus {
    Pending,
    Resolved,
    Cancelled,
    Expired,
}

/// Parameters to raise a new interrupt.
#[derive(Debug, Clone)]
pub struct CreateInterruptParams {
    pub request_id: String,
    pub envelope_id: String,
    pub kind: InterruptKind,
    pub question: Option<String>,
    pub message: Option<String>,
    pub data: Option<HashMap<String, serde_json::Value>>,
    pub ttl: Option<std::time::Duration>,
}

/// A kernel-tracked interrupt: the `FlowInterrupt` plus bookkeeping the
/// envelope itself doesn't need (which request/envelope raised it, its
/// resolution status).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelInterrupt {
    pub request_id: String,
    pub envelope_id: String,
    pub interrupt: FlowInterrupt,
    pub status: InterruptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl KernelInterrupt {
    pub fn is_pending(&self) -> bool {
        self.status == InterruptStatus::Pending
    }
}

/// Tunables for the interrupt store.
#[derive(Debug, Clone)]
pub struct InterruptConfig {
    /// Default TTL applied when a raise doesn't specify one.
    pub default_ttl: std::time::Duration,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            default_ttl: std::time::Duration::from_secs(3600),
        }
    }
}

/// Pending interrupt store, owned by the Kernel and called via `&mut self`.
#[derive(Debug)]
pub struct InterruptService {
    config: InterruptConfig,
    interrupts: HashMap<String, KernelInterrupt>,
}

impl InterruptService {
    pub fn new() -> Self {
        Self::with_config(InterruptConfig::default())
    }

    pub fn with_config(config: InterruptConfig) -> Self {
        Self {
            config,
            interrupts: HashMap::new(),
        }
    }

    /// Raise a new interrupt and store it pending.
    pub fn create_interrupt(&mut self, params: CreateInterruptParams) -> KernelInterrupt {
        let ttl = params.ttl.unwrap_or(self.config.default_ttl);
        let mut interrupt = FlowInterrupt::new(params.kind).with_expiry(ttl);
        if let Some(q) = params.question {
            interrupt = interrupt.with_question(q);
        }
        if let Some(m) = params.message {
            interrupt = interrupt.with_message(m);
        }
        if let Some(d) = params.data {
            interrupt = interrupt.with_data(d);
        }

        let record = KernelInterrupt {
            request_id: params.request_id,
            envelope_id: params.envelope_id,
            interrupt: interrupt.clone(),
            status: InterruptStatus::Pending,
            resolved_by: None,
            resolved_at: None,
        };
        self.interrupts.insert(interrupt.id.clone(), record.clone());
        record
    }

    /// Attach a response and mark resolved. Returns false if the interrupt
    /// is unknown or already resolved/cancelled/expired.
    pub fn resolve(
        &mut self,
        interrupt_id: &str,
        response: InterruptResponse,
        user_id: Option<&str>,
    ) -> bool {
        let Some(record) = self.interrupts.get_mut(interrupt_id) else {
            return false;
        };
        if record.status != InterruptStatus::Pending {
            return false;
        }
        record.interrupt.response = Some(response);
        record.status = InterruptStatus::Resolved;
        record.resolved_by = user_id.map(str::to_string);
        record.resolved_at = Some(Utc::now());
        true
    }

    /// Cancel a pending interrupt without a response (e.g. pipeline aborted).
    pub fn cancel(&mut self, interrupt_id: &str) -> bool {
        let Some(record) = self.interrupts.get_mut(interrupt_id) else {
            return false;
        };
        if record.status != InterruptStatus::Pending {
            return false;
        }
        record.status = InterruptStatus::Cancelled;
        record.resolved_at = Some(Utc::now());
        true
    }

    /// Mark a single interrupt expired if its TTL has passed.
    pub fn expire(&mut self, interrupt_id: &str) -> bool {
        let Some(record) = self.interrupts.get_mut(interrupt_id) else {
            return false;
        };
        if record.status != InterruptStatus::Pending {
            return false;
        }
        let expired = record
            .interrupt
            .expires_at
            .map(|exp| Utc::now() >= exp)
            .unwrap_or(false);
        if expired {
            record.status = InterruptStatus::Expired;
            record.resolved_at = Some(Utc::now());
        }
        expired
    }

    /// Sweep all pending interrupts past their TTL, marking them expired.
    /// Returns the ids that were expired by this sweep.
    pub fn sweep_expired(&mut self) -> Vec<String> {
        let now = Utc::now();
        let mut expired_ids = Vec::new();
        for (id, record) in self.interrupts.iter_mut() {
            if record.status == InterruptStatus::Pending
                && record.interrupt.expires_at.map(|exp| now >= exp).unwrap_or(false)
            {
                record.status = InterruptStatus::Expired;
                record.resolved_at = Some(now);
                expired_ids.push(id.clone());
            }
        }
        expired_ids
    }

    pub fn get(&self, interrupt_id: &str) -> Option<&KernelInterrupt> {
        self.interrupts.get(interrupt_id)
    }

    /// Most recent pending interrupt for a request, if any.
    pub fn get_pending_for_request(&self, request_id: &str) -> Option<&KernelInterrupt> {
        self.interrupts
            .values()
            .filter(|i| i.request_id == request_id && i.is_pending())
            .max_by_key(|i| i.interrupt.created_at)
    }

    pub fn list_pending(&self) -> Vec<&KernelInterrupt> {
        self.interrupts.values().filter(|i| i.is_pending()).collect()
    }

    pub fn list_for_envelope(&self, envelope_id: &str) -> Vec<&KernelInterrupt> {
        self.interrupts
            .values()
            .filter(|i| i.envelope_id == envelope_id)
            .collect()
    }

    /// Drop resolved/cancelled/expired interrupts older than `retention`.
    /// Pending interrupts are never removed here (use `sweep_expired` first).
    pub fn cleanup_resolved(&mut self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let before = self.interrupts.len();
        self.interrupts.retain(|_, record| {
            record.status == InterruptStatus::Pending
                || record.resolved_at.map(|at| at > cutoff).unwrap_or(true)
        });
        before - self.interrupts.len()
    }

    pub fn count(&self) -> usize {
        self.interrupts.len()
    }
}

impl Default for InterruptService {
    fn default() -> Self {
        Self::new()
    }
}
