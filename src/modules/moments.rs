// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Peaks and lulls of momentum

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::cmp::Ordering;

use super::{resolved_config, AnalysisModule, ModuleOutput, ModuleResult};
use crate::pipeline::ModuleContext;

const DEFAULT_TOP: usize = 3;

pub struct MomentsModule;

fn momentum_of(window: &Value) -> f64 {
    window.get("momentum").and_then(Value::as_f64).unwrap_or(0.0)
}

fn index_of(window: &Value) -> u64 {
    window.get("index").and_then(Value::as_u64).unwrap_or(u64::MAX)
}

#[async_trait]
impl AnalysisModule for MomentsModule {
    fn name(&self) -> &str {
        "moments"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn cache_affecting_config(&self, section: &Value) -> Value {
        resolved_config(section, &[("top", json!(DEFAULT_TOP))])
    }

    async fn run(&self, ctx: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let started_at = Utc::now();
        let top = ctx.config_usize("top", DEFAULT_TOP)?;

        let mut windows: Vec<Value> = ctx
            .require_result("momentum")?
            .get("windows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        windows.sort_by(|a, b| {
            momentum_of(b)
                .partial_cmp(&momentum_of(a))
                .unwrap_or(Ordering::Equal)
                .then_with(|| index_of(a).cmp(&index_of(b)))
        });
        let peaks: Vec<Value> = windows.iter().take(top).cloned().collect();

        windows.sort_by(|a, b| {
            momentum_of(a)
                .partial_cmp(&momentum_of(b))
                .unwrap_or(Ordering::Equal)
                .then_with(|| index_of(a).cmp(&index_of(b)))
        });
        let lulls: Vec<Value> = windows.iter().take(top).cloned().collect();

        let payload = json!({ "top": top, "peaks": peaks, "lulls": lulls });
        let artifact = ctx.write_json("data/global/moments.json", &payload).await?;

        Ok(ModuleOutput::success(started_at, payload).with_artifact(artifact))
    }
}
