// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Silences between consecutive segments

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::{resolved_config, AnalysisModule, ModuleError, ModuleOutput, ModuleResult};
use crate::input::Segment;
use crate::pipeline::ModuleContext;

const DEFAULT_MIN_GAP_SECONDS: f64 = 1.0;

pub struct PausesModule;

#[async_trait]
impl AnalysisModule for PausesModule {
    fn name(&self) -> &str {
        "pauses"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn cache_affecting_config(&self, section: &Value) -> Value {
        resolved_config(section, &[("min_gap_seconds", json!(DEFAULT_MIN_GAP_SECONDS))])
    }

    async fn run(&self, ctx: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let started_at = Utc::now();
        let min_gap = ctx.config_f64("min_gap_seconds", DEFAULT_MIN_GAP_SECONDS)?;
        if min_gap < 0.0 {
            return Err(ModuleError::Config("'min_gap_seconds' must not be negative".into()));
        }

        let mut timed: Vec<&Segment> = ctx
            .transcript()
            .segments()
            .iter()
            .filter(|s| s.start.is_some() && s.end.is_some())
            .collect();
        timed.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

        let mut pauses = Vec::new();
        for pair in timed.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let (Some(end), Some(start)) = (prev.end, next.start) else {
                continue;
            };
            let gap = start - end;
            if gap >= min_gap && gap > 0.0 {
                pauses.push(json!({
                    "start": end,
                    "end": start,
                    "duration": gap,
                    "after_speaker": prev.speaker,
                    "before_speaker": next.speaker,
                }));
            }
        }

        let count = pauses.len();
        let total: f64 = pauses.iter().filter_map(|p| p["duration"].as_f64()).sum();
        let longest = pauses
            .iter()
            .filter_map(|p| p["duration"].as_f64())
            .fold(0.0, f64::max);

        let payload = json!({
            "min_gap_seconds": min_gap,
            "count": count,
            "total_pause_seconds": total,
            "longest_pause_seconds": longest,
            "pauses": pauses,
        });
        let artifact = ctx.write_json("data/global/pauses.json", &payload).await?;

        Ok(ModuleOutput::success(started_at, payload)
            .with_artifact(artifact)
            .with_metric("count", count)
            .with_metric("total_pause_seconds", total))
    }
}
