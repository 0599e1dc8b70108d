//! Tool access control — agent-scoped tool permissions.
//!
//! Controls which agents can use which tools. Replaces Python's
//! stringly-typed access checks with compile-time-safe lookups.

use std::collections::{HashMap, HashSet};

/// Agent → tools access policy.
///
/// An agent can only execute tools it has been granted access to.
/// If no policy is set for an agent, it has access to nothing.
#[derive(Debug, Default)]
pub struct ToolAccessPolicy {
    /// agent_name → set of allowed tool_ids
    grants: HashMap<String, HashSet<String>>,
}

impl ToolAccessPolicy {
    pub fn new() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    /// Grant an agent access to a tool.
    pub fn grant(&mut self, agent_name: &str, tool_id: &str) {
        self.grants
            .entry(agent_name.to_string())
            .or_default()
            .insert(tool_id.to_string());
    }

    /// Grant an agent access to multiple tools at once.
    pub fn grant_many(&mut self, agent_name: &str, tool_ids: &[String]) {
        let set = self.grants.entry(agent_name.to_string()).or_default();
        for id in tool_ids {
            set.insert(id.clone());
        }
    }

    /// Revoke an agent's access to a tool.
    pub fn revoke(&mut self, agent_name: &str, tool_id: &str) {
        if let Some(set) = self.grants.get_mut(agent_name) {
            set.remove(tool_id);
        }
    }

    /// Check if an agent has access to a tool.
    pub fn check_access(&self, agent_name: &str, tool_id: &str) -> bool {
        self.grants
            .get(agent_name)
            .map_or(false, |set| set.contains(tool_id))
    }

    /// Get all tool ids an agent has access to.
    pub fn tools_for_agent(&self, agent_name: &str) -> Vec<String> {
        self.grants
            .get(agent_name)
            .map(|set| {
                let mut ids: Vec<String> = set.iter().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    /// Clear all grants for an agent.
    pub fn clear_agent(&mut self, agent_name: &str) {
        self.grants.remove(agent_name);
    }
}
