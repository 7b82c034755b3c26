// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Conversational momentum per fixed time window
//!
//! Momentum is speech rate (words per minute) damped by how much of the
//! window was spent in pauses found by the `pauses` module.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::{resolved_config, AnalysisModule, ModuleError, ModuleOutput, ModuleResult};
use crate::pipeline::ModuleContext;

const DEFAULT_WINDOW_SECONDS: f64 = 60.0;
const DEFAULT_MAX_WINDOWS: usize = 10_000;

pub struct MomentumModule;

#[async_trait]
impl AnalysisModule for MomentumModule {
    fn name(&self) -> &str {
        "momentum"
    }

    fn version(&self) -> &str {
        "1.2.0"
    }

    fn cache_affecting_config(&self, section: &Value) -> Value {
        resolved_config(
            section,
            &[
                ("window_seconds", json!(DEFAULT_WINDOW_SECONDS)),
                ("max_windows", json!(DEFAULT_MAX_WINDOWS)),
            ],
        )
    }

    async fn run(&self, ctx: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let started_at = Utc::now();
        let window = ctx.config_f64("window_seconds", DEFAULT_WINDOW_SECONDS)?;
        if !window.is_finite() || window <= 0.0 {
            return Err(ModuleError::Config("'window_seconds' must be positive".into()));
        }
        let max_windows = ctx.config_usize("max_windows", DEFAULT_MAX_WINDOWS)?;

        let pauses: Vec<(f64, f64)> = ctx
            .require_result("pauses")?
            .get("pauses")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|p| Some((p.get("start")?.as_f64()?, p.get("end")?.as_f64()?)))
                    .collect()
            })
            .unwrap_or_default();

        let segments = ctx.transcript().segments();
        // Windows span the timed part of the conversation only
        let origin = segments
            .iter()
            .filter_map(|s| s.start)
            .fold(f64::INFINITY, f64::min);
        let origin = if origin.is_finite() { origin } else { 0.0 };
        let last_end = segments
            .iter()
            .filter_map(|s| s.end.or(s.start))
            .fold(origin, f64::max);

        let needed = ((last_end - origin) / window).ceil().max(1.0);
        if needed > max_windows as f64 {
            return Err(ModuleError::Config(format!(
                "{:.0}s of conversation would need {:.0} windows of {}s, more than 'max_windows' ({})",
                last_end - origin,
                needed,
                window,
                max_windows
            )));
        }
        let count = needed as usize;

        let mut words = vec![0usize; count];
        for segment in segments {
            let Some(start) = segment.start else {
                continue;
            };
            let index = ((start - origin) / window).floor();
            if index >= 0.0 && (index as usize) < count {
                words[index as usize] += segment.word_count();
            }
        }

        let windows: Vec<Value> = words
            .iter()
            .enumerate()
            .map(|(index, &words)| {
                let start = origin + index as f64 * window;
                let end = start + window;

                let pause_seconds: f64 = pauses
                    .iter()
                    .map(|(ps, pe)| (pe.min(end) - ps.max(start)).max(0.0))
                    .sum();

                let stall_index = (pause_seconds / window).min(1.0);
                let words_per_minute = words as f64 * 60.0 / window;

                json!({
                    "index": index,
                    "start": start,
                    "end": end,
                    "words": words,
                    "pause_seconds": pause_seconds,
                    "stall_index": stall_index,
                    "momentum": words_per_minute * (1.0 - stall_index),
                })
            })
            .collect();

        let payload = json!({
            "window_seconds": window,
            "origin_seconds": origin,
            "windows": windows,
        });
        let artifact = ctx.write_json("data/global/momentum.json", &payload).await?;

        Ok(ModuleOutput::success(started_at, payload)
            .with_artifact(artifact)
            .with_metric("windows", count))
    }
}
