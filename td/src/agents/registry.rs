//! AgentRegistry - agentKind -> AgentDefinition map

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use super::definition::{AgentDefinition, ExecutionMode, ToolProfile};
use super::policy::SecurityLevel;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent kind `{0}` is not registered")]
    NotFound(String),
    #[error("custom agent `{0}` collides with a built-in agent kind")]
    DuplicateOfBuiltin(String),
}

/// In-process map from agent kind to its definition. Built-ins are loaded
/// at construction; custom agents are merged in afterward and may not
/// shadow a built-in name.
pub struct AgentRegistry {
    definitions: HashMap<String, AgentDefinition>,
    builtin_kinds: Vec<String>,
}

impl AgentRegistry {
    /// The registry with the daemon's own built-in agent kinds: the
    /// implementation agent, the QA reviewer/fixer pair, the merge
    /// resolver, and the spec-factory decomposer.
    pub fn standard() -> Self {
        debug!("AgentRegistry::standard: called");
        let mut registry = Self {
            definitions: HashMap::new(),
            builtin_kinds: Vec::new(),
        };

        registry.insert_builtin(
            AgentDefinition::new("build", SecurityLevel::Allowlist, ToolProfile::Coding)
                .with_system_prompt("Implement the task described in the plan file. Commit your work before finishing.")
                .with_execution_mode(ExecutionMode::Agentic),
        );
        registry.insert_builtin(
            AgentDefinition::new("qa_reviewer", SecurityLevel::Readonly, ToolProfile::Readonly)
                .with_system_prompt("Review the validator evidence and the diff. Approve or reject with specific issues.")
                .with_execution_mode(ExecutionMode::SingleTurn),
        );
        registry.insert_builtin(
            AgentDefinition::new("qa_fixer", SecurityLevel::Allowlist, ToolProfile::Qa)
                .with_system_prompt("Address every issue in QA_FIX_REQUEST.md, then commit.")
                .with_execution_mode(ExecutionMode::Agentic),
        );
        registry.insert_builtin(
            AgentDefinition::new("merge_resolver", SecurityLevel::Allowlist, ToolProfile::Coding)
                .with_system_prompt("Resolve the merge conflict between this task's branch and the main branch.")
                .with_execution_mode(ExecutionMode::Agentic),
        );
        registry.insert_builtin(
            AgentDefinition::new("design", SecurityLevel::Readonly, ToolProfile::Full)
                .with_system_prompt("Decompose this task into a batch of child specs via the spec factory tool.")
                .with_execution_mode(ExecutionMode::Agentic),
        );

        registry
    }

    fn insert_builtin(&mut self, definition: AgentDefinition) {
        self.builtin_kinds.push(definition.agent_kind.clone());
        self.definitions.insert(definition.agent_kind.clone(), definition);
    }

    /// Merge a project-local custom agent in. Rejects a custom agent whose
    /// kind collides with a built-in name.
    pub fn register_custom(&mut self, definition: AgentDefinition) -> Result<(), RegistryError> {
        debug!(agent_kind = %definition.agent_kind, "AgentRegistry::register_custom: called");
        if self.builtin_kinds.contains(&definition.agent_kind) {
            warn!(agent_kind = %definition.agent_kind, "AgentRegistry::register_custom: collides with builtin");
            return Err(RegistryError::DuplicateOfBuiltin(definition.agent_kind));
        }
        self.definitions.insert(definition.agent_kind.clone(), definition);
        Ok(())
    }

    pub fn get(&self, agent_kind: &str) -> Result<&AgentDefinition, RegistryError> {
        self.definitions
            .get(agent_kind)
            .ok_or_else(|| RegistryError::NotFound(agent_kind.to_string()))
    }

    pub fn kinds(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_builtin_kinds() {
        let registry = AgentRegistry::standard();
        assert!(registry.get("build").is_ok());
        assert!(registry.get("qa_reviewer").is_ok());
        assert!(registry.get("nonexistent").is_err());
    }

    #[test]
    fn custom_agent_cannot_shadow_builtin() {
        let mut registry = AgentRegistry::standard();
        let collision = AgentDefinition::new("build", SecurityLevel::Full, ToolProfile::Full);
        assert!(matches!(
            registry.register_custom(collision),
            Err(RegistryError::DuplicateOfBuiltin(_))
        ));
    }

    #[test]
    fn custom_agent_with_new_kind_registers() {
        let mut registry = AgentRegistry::standard();
        let custom = AgentDefinition::new("translator", SecurityLevel::Readonly, ToolProfile::Readonly);
        assert!(registry.register_custom(custom).is_ok());
        assert!(registry.get("translator").is_ok());
    }
}
