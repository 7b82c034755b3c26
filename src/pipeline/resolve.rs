// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Dependency resolution
//!
//! Expands a selection to its dependency closure, sorts it with Kahn's
//! algorithm (lexicographic tie-break), then re-walks the result so that
//! among modules ready at the same time the cheapest category goes first.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::registry::Registry;

/// Why a module is part of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InclusionReason {
    Requested,
    /// Pulled in by the named requested module
    DependencyOf(String),
}

impl std::fmt::Display for InclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::DependencyOf(root) => write!(f, "dependency of {}", root),
        }
    }
}

/// Result of resolving a module selection
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Known requested modules, first occurrence order
    pub requested: Vec<String>,
    /// Requested names the registry does not know
    pub unknown: Vec<String>,
    /// Execution order
    pub order: Vec<String>,
    pub reasons: BTreeMap<String, InclusionReason>,
}

impl Resolution {
    /// Modules present only because something requested needs them
    pub fn added_as_dependencies(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|m| matches!(self.reasons.get(*m), Some(InclusionReason::DependencyOf(_))))
            .cloned()
            .collect()
    }

    pub fn position(&self, module: &str) -> Option<usize> {
        self.order.iter().position(|m| m == module)
    }
}

/// Resolves selections against a finalized registry
pub struct DependencyResolver<'a> {
    registry: &'a Registry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Resolve a selection into a dependency-closed, ordered module list
    pub fn resolve(&self, selected: &[String]) -> ConvoflowResult<Resolution> {
        let mut requested = Vec::new();
        let mut unknown = Vec::new();
        let mut seen = BTreeSet::new();

        for name in selected {
            if !seen.insert(name.as_str()) {
                continue;
            }
            if self.registry.contains(name) {
                requested.push(name.clone());
            } else {
                unknown.push(name.clone());
            }
        }

        let reasons = self.closure(&requested);
        let members: BTreeSet<&str> = reasons.keys().map(String::as_str).collect();
        let topo = self.kahn(&members)?;
        let order = self.cost_aware(&topo)?;

        tracing::debug!(requested = ?requested, order = ?order, "resolved modules");

        Ok(Resolution {
            requested,
            unknown,
            order,
            reasons,
        })
    }

    /// Fixed point of declared and implicit dependencies
    fn closure(&self, requested: &[String]) -> BTreeMap<String, InclusionReason> {
        let mut reasons = BTreeMap::new();
        let mut roots: BTreeMap<String, String> = BTreeMap::new();
        let mut queue = VecDeque::new();

        for name in requested {
            reasons.insert(name.clone(), InclusionReason::Requested);
            roots.insert(name.clone(), name.clone());
            queue.push_back(name.clone());
        }

        while let Some(module) = queue.pop_front() {
            let root = roots.get(&module).cloned().unwrap_or_else(|| module.clone());
            for dep in self.registry.effective_dependencies(&module) {
                if reasons.contains_key(&dep) {
                    continue;
                }
                reasons.insert(dep.clone(), InclusionReason::DependencyOf(root.clone()));
                roots.insert(dep.clone(), root.clone());
                queue.push_back(dep);
            }
        }

        reasons
    }

    /// Kahn's algorithm; ready modules are taken in name order
    fn kahn(&self, members: &BTreeSet<&str>) -> ConvoflowResult<Vec<String>> {
        let mut indegree: BTreeMap<&str, usize> = members.iter().map(|m| (*m, 0)).collect();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for module in members {
            for dep in self.registry.effective_dependencies(module) {
                if members.contains(dep.as_str()) {
                    if let Some(d) = indegree.get_mut(module) {
                        *d += 1;
                    }
                    dependents.entry(dep).or_default().push(module.to_string());
                }
            }
        }

        let mut ready: BTreeSet<String> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(m, _)| m.to_string())
            .collect();
        let mut order = Vec::with_capacity(members.len());

        while let Some(next) = ready.pop_first() {
            for dependent in dependents.get(&next).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(dependent.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(dependent.clone());
                    }
                }
            }
            order.push(next);
        }

        if order.len() != members.len() {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            return Err(ConvoflowError::CircularDependency {
                modules: members
                    .iter()
                    .filter(|m| !placed.contains(*m))
                    .map(|m| m.to_string())
                    .collect(),
            });
        }

        Ok(order)
    }

    /// Place one module per step: the cheapest ready module, then by name
    fn cost_aware(&self, topo: &[String]) -> ConvoflowResult<Vec<String>> {
        let mut remaining: Vec<&str> = topo.iter().map(String::as_str).collect();
        let members: BTreeSet<&str> = remaining.iter().copied().collect();
        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(topo.len());

        while !remaining.is_empty() {
            let pick = remaining
                .iter()
                .copied()
                .enumerate()
                .filter(|&(_, m)| {
                    self.registry
                        .effective_dependencies(m)
                        .iter()
                        .all(|d| placed.contains(d.as_str()) || !members.contains(d.as_str()))
                })
                .min_by_key(|&(_, m)| {
                    let rank = self.registry.get(m).map(|s| s.category.rank()).unwrap_or(u8::MAX);
                    (rank, m)
                })
                .map(|(i, _)| i);

            let Some(index) = pick else {
                return Err(ConvoflowError::CircularDependency {
                    modules: remaining.iter().map(|m| m.to_string()).collect(),
                });
            };

            let module = remaining.remove(index);
            placed.insert(module);
            order.push(module.to_string());
        }

        Ok(order)
    }
}
