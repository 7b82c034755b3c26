// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Pipeline planning and execution
//!
//! Resolution turns a module selection into an ordered plan; the executor
//! walks that plan against one transcript.

mod context;
mod dag;
mod executor;
mod plan;
mod resolve;
mod summary;
mod validation;

pub use context::{ContextSnapshot, ModuleContext, PipelineContext};
pub use dag::DagBuilder;
pub use executor::{ExecutionOptions, PipelineExecutor, PIPELINE_VERSION};
pub use plan::{ExecutionPlan, PlanEntry, PLAN_FILE};
pub use resolve::{DependencyResolver, InclusionReason, Resolution};
pub use summary::{RunOutcome, RunSummary, SkippedModule, SUMMARY_FILE};
pub use validation::{PipelineValidator, ValidationResult};
