// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(modules: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", modules.join(" → ")),
                "Review declared dependencies and the implicit dependency table".into(),
                "Modules must form a directed acyclic graph (DAG)".into(),
            ],
            commands: vec![
                "# Visualize the module graph:".into(),
                "convoflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest re-running after an upstream module failed or was skipped
    pub fn fix_missing_dependency(module: &str, missing: &[String]) -> Self {
        Self {
            action: format!("Repair upstream modules of '{}'", module),
            steps: vec![
                format!("'{}' needs: {}", module, missing.join(", ")),
                "Those modules failed, were skipped, or were never scheduled in this run".into(),
                "Fix the upstream fault first; cached results are reused on the next run".into(),
            ],
            commands: vec![
                "# Show why each module is in the plan:".into(),
                format!("convoflow plan --module {}", module),
            ],
        }
    }

    /// Suggest next steps after a module fault
    pub fn fix_module_failure(module: &str, message: &str) -> Self {
        let lowered = message.to_lowercase();
        let mut steps = vec![format!("Module '{}' reported: {}", module, message)];

        if lowered.contains("speaker") {
            steps.push("Label speakers with real names before running this module".into());
        } else {
            steps.push("Failed runs are never cached; the module re-executes next time".into());
        }

        Self {
            action: format!("Investigate '{}' failure", module),
            steps,
            commands: vec![
                "# Re-run with detailed logs:".into(),
                format!("RUST_LOG=convoflow=debug convoflow run <TRANSCRIPT> --module {}", module),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
