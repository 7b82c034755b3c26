// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Speaker statistics

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::{resolved_config, AnalysisModule, ModuleError, ModuleOutput, ModuleResult};
use crate::pipeline::ModuleContext;

#[derive(Debug, Default)]
struct SpeakerTotals {
    segments: usize,
    words: usize,
    talk_time_seconds: f64,
}

/// Per-speaker segment, word and talk-time counts
pub struct StatsModule;

#[async_trait]
impl AnalysisModule for StatsModule {
    fn name(&self) -> &str {
        "stats"
    }

    fn version(&self) -> &str {
        "1.2.0"
    }

    fn cache_affecting_config(&self, section: &Value) -> Value {
        resolved_config(section, &[("require_named_speakers", json!(false))])
    }

    async fn run(&self, ctx: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let started_at = Utc::now();
        let transcript = ctx.transcript();

        if ctx.config_bool("require_named_speakers", false)? && transcript.named_speakers().is_empty() {
            return Err(ModuleError::SpeakerIdentificationRequired(format!(
                "no named speakers in {}",
                transcript.stem()
            )));
        }

        let mut totals: BTreeMap<String, SpeakerTotals> = BTreeMap::new();
        for segment in transcript.segments() {
            let speaker = segment
                .speaker
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("unknown");
            let entry = totals.entry(speaker.to_string()).or_default();
            entry.segments += 1;
            entry.words += segment.word_count();
            entry.talk_time_seconds += segment.duration().unwrap_or(0.0);
        }

        let total_words: usize = totals.values().map(|t| t.words).sum();
        let mut speakers = Map::new();
        let mut output = ModuleOutput::success(started_at, Value::Null);

        for (speaker, t) in &totals {
            let share = if total_words == 0 {
                0.0
            } else {
                t.words as f64 / total_words as f64
            };
            let row = json!({
                "segments": t.segments,
                "words": t.words,
                "talk_time_seconds": t.talk_time_seconds,
                "word_share": share,
            });

            let file = format!("data/speakers/{}.json", file_safe(speaker));
            output = output.with_artifact(ctx.write_json(&file, &row).await?);
            speakers.insert(speaker.clone(), row);
        }

        let payload = json!({
            "speaker_count": totals.len(),
            "total_segments": transcript.segments().len(),
            "total_words": total_words,
            "speakers": speakers,
        });
        let summary = ctx.write_json("data/global/summary.json", &payload).await?;

        output.payload = payload;
        output.finished_at = Utc::now();
        Ok(output
            .with_artifact(summary)
            .with_metric("total_words", total_words)
            .with_metric("speaker_count", totals.len()))
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
