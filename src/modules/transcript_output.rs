// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Plain-text transcript export

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::{AnalysisModule, ModuleOutput, ModuleResult};
use crate::pipeline::ModuleContext;
use crate::store::ArtifactRole;

pub struct TranscriptOutputModule;

fn timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[async_trait]
impl AnalysisModule for TranscriptOutputModule {
    fn name(&self) -> &str {
        "transcript_output"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn run(&self, ctx: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let started_at = Utc::now();
        let stats = ctx.require_result("stats")?;
        let transcript = ctx.transcript();

        let mut text = String::new();
        if let Some(speakers) = stats.get("speakers").and_then(Value::as_object) {
            for (speaker, row) in speakers {
                let words = row.get("words").and_then(Value::as_u64).unwrap_or(0);
                text.push_str(&format!("# {}: {} words\n", speaker, words));
            }
            text.push('\n');
        }

        for segment in transcript.segments() {
            let speaker = segment.speaker.as_deref().unwrap_or("unknown");
            match segment.start {
                Some(start) => text.push_str(&format!("[{}] {}: {}\n", timestamp(start), speaker, segment.text.trim())),
                None => text.push_str(&format!("{}: {}\n", speaker, segment.text.trim())),
            }
        }

        let file = format!("exports/{}.txt", transcript.stem());
        let artifact = ctx.write_text(&file, &text).await?.with_role(ArtifactRole::Export);

        let payload = json!({
            "file": file,
            "lines": transcript.segments().len(),
        });

        Ok(ModuleOutput::success(started_at, payload).with_artifact(artifact))
    }
}
