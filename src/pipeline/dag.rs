// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! DAG (Directed Acyclic Graph) builder for module dependencies
//!
//! Builds and validates the dependency graph of registered modules,
//! detecting unknown dependencies and cycles, and renders it for humans.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::BTreeMap;

use crate::errors::ConvoflowError;
use crate::registry::{Category, ModuleSpec};

/// Dependency graph over module names; edges point from dependency to dependent
#[derive(Debug, Clone, Default)]
pub struct DagBuilder {
    graph: DiGraph<String, ()>,
    name_to_index: BTreeMap<String, NodeIndex>,
    categories: BTreeMap<String, Category>,
}

impl DagBuilder {
    /// Create an empty DAG builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a DAG from module declarations plus implicit edges
    pub fn build<'a>(
        modules: impl IntoIterator<Item = &'a ModuleSpec>,
        implicit: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, ConvoflowError> {
        let mut builder = Self::new();
        let modules: Vec<&ModuleSpec> = modules.into_iter().collect();

        for spec in &modules {
            let node = builder.graph.add_node(spec.name.clone());
            builder.name_to_index.insert(spec.name.clone(), node);
            builder.categories.insert(spec.name.clone(), spec.category);
        }

        for spec in &modules {
            let extra = implicit.get(&spec.name).map(Vec::as_slice).unwrap_or(&[]);
            for dep in spec.dependencies.iter().chain(extra) {
                builder.add_dependency(&spec.name, dep)?;
            }
        }

        builder.validate_acyclic()?;

        Ok(builder)
    }

    fn add_dependency(&mut self, module: &str, dependency: &str) -> Result<(), ConvoflowError> {
        let module_node = self.name_to_index[module];
        let dep_node = *self.name_to_index.get(dependency).ok_or_else(|| {
            ConvoflowError::UnknownDependency {
                module: module.to_string(),
                dependency: dependency.to_string(),
            }
        })?;

        if !self.graph.contains_edge(dep_node, module_node) {
            self.graph.add_edge(dep_node, module_node, ());
        }
        Ok(())
    }

    /// Validate that the graph is acyclic
    fn validate_acyclic(&self) -> Result<(), ConvoflowError> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(_) => Err(ConvoflowError::CircularDependency {
                modules: self.cycle_members(),
            }),
        }
    }

    /// Names of every module that sits on a cycle, sorted
    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|n| self.graph[n].clone())
            .collect();
        members.sort();
        members
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get topologically sorted module names
    pub fn topological_order_names(&self) -> Result<Vec<String>, ConvoflowError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n].clone()).collect())
            .map_err(|_| ConvoflowError::CircularDependency {
                modules: self.cycle_members(),
            })
    }

    /// Direct dependencies of a module (modules that must run before it)
    pub fn dependencies(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Direct dependents of a module (modules that need it)
    pub fn dependents(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(name)?;
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        names.sort();
        Some(names)
    }

    /// Check if module A depends (directly or transitively) on module B
    pub fn depends_on(&self, module_a: &str, module_b: &str) -> bool {
        let (Some(a), Some(b)) = (self.name_to_index.get(module_a), self.name_to_index.get(module_b))
        else {
            return false;
        };

        a != b && has_path_connecting(&self.graph, *b, *a, None)
    }

    fn edges_sorted(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .graph
            .edge_references()
            .map(|e| (self.graph[e.source()].as_str(), self.graph[e.target()].as_str()))
            .collect();
        edges.sort();
        edges
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (name, category) in &self.categories {
            out.push_str(&format!("    {}[\"{} ({})\"]\n", name, name, category));
        }

        for (from, to) in self.edges_sorted() {
            out.push_str(&format!("    {} --> {}\n", from, to));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph modules {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (from, to) in self.edges_sorted() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        for (name, node) in &self.name_to_index {
            if self.graph.neighbors_undirected(*node).count() == 0 {
                out.push_str(&format!("    \"{}\";\n", name));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate a numbered text listing in the given order
    pub fn to_text(&self, order: &[String]) -> String {
        let mut out = String::new();

        for (i, name) in order.iter().enumerate() {
            let category = self
                .categories
                .get(name)
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".into());
            out.push_str(&format!("{}. {} ({})", i + 1, name, category));

            let deps = self.dependencies(name).unwrap_or_default();
            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(modules: Vec<(&str, Vec<&str>)>) -> Vec<ModuleSpec> {
        modules
            .into_iter()
            .map(|(name, deps)| ModuleSpec::new(name, Category::Light).depends_on(&deps))
            .collect()
    }

    fn build(modules: Vec<(&str, Vec<&str>)>) -> Result<DagBuilder, ConvoflowError> {
        DagBuilder::build(&specs(modules), &BTreeMap::new())
    }

    #[test]
    fn test_linear_dag() {
        let dag = build(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]).unwrap();
        let order = dag.topological_order_names().unwrap();

        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_dag() {
        let dag = build(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ])
        .unwrap();
        let order = dag.topological_order_names().unwrap();

        assert_eq!(order[0], "a");
        assert_eq!(order[3], "d");
        assert_eq!(dag.dependencies("d").unwrap(), vec!["b", "c"]);
        assert_eq!(dag.dependents("a").unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_circular_dependency_lists_members() {
        let result = build(vec![("a", vec!["c"]), ("b", vec!["a"]), ("c", vec!["b"]), ("d", vec![])]);

        match result {
            Err(ConvoflowError::CircularDependency { modules }) => {
                assert_eq!(modules, vec!["a", "b", "c"]);
            }
            _ => panic!("expected a cycle"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = build(vec![("a", vec!["a"])]);
        assert!(matches!(result, Err(ConvoflowError::CircularDependency { .. })));
    }

    #[test]
    fn test_unknown_dependency() {
        let result = build(vec![("a", vec!["nonexistent"])]);
        assert!(matches!(result, Err(ConvoflowError::UnknownDependency { .. })));
    }

    #[test]
    fn test_implicit_edges() {
        let mut implicit = BTreeMap::new();
        implicit.insert("b".to_string(), vec!["a".to_string()]);
        let dag = DagBuilder::build(&specs(vec![("a", vec![]), ("b", vec![])]), &implicit).unwrap();

        assert!(dag.depends_on("b", "a"));
    }

    #[test]
    fn test_depends_on_check() {
        let dag = build(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]).unwrap();

        assert!(dag.depends_on("c", "a"));
        assert!(dag.depends_on("c", "b"));
        assert!(!dag.depends_on("a", "c"));
        assert!(!dag.depends_on("a", "a"));
    }

    #[test]
    fn test_renderings() {
        let dag = build(vec![("a", vec![]), ("b", vec!["a"]), ("lonely", vec![])]).unwrap();

        assert!(dag.to_mermaid().contains("a --> b"));
        assert!(dag.to_dot().contains("\"a\" -> \"b\";"));
        assert!(dag.to_dot().contains("\"lonely\";"));
        assert_eq!(
            dag.to_text(&["a".into(), "b".into()]),
            "1. a (light)\n2. b (light) [depends: a]\n"
        );
    }
}
