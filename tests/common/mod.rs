// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use convoflow::modules::{AnalysisModule, ModuleError, ModuleOutput, ModuleResult};
use convoflow::pipeline::ModuleContext;

#[derive(Clone)]
pub enum Behavior {
    Succeed,
    Fail(&'static str),
    Report(&'static str),
    Sleep(Duration),
    /// Holds its thread without yielding to the runtime
    Block(Duration),
    Panic(&'static str),
}

/// Test module that counts its invocations and writes one primary artifact
#[derive(Clone)]
pub struct Counting {
    name: &'static str,
    version: &'static str,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl Counting {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            version: "1",
            behavior: Behavior::Succeed,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn sharing(mut self, counter: &Arc<AtomicUsize>) -> Self {
        self.calls = Arc::clone(counter);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisModule for Counting {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        self.version
    }

    async fn run(&self, ctx: &ModuleContext) -> ModuleResult<ModuleOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Utc::now();

        match &self.behavior {
            Behavior::Fail(message) => return Err(ModuleError::failed(*message)),
            Behavior::Report(message) => return Ok(ModuleOutput::error(started, *message)),
            Behavior::Sleep(duration) => tokio::time::sleep(*duration).await,
            Behavior::Block(duration) => std::thread::sleep(*duration),
            Behavior::Panic(message) => panic!("{}", message),
            Behavior::Succeed => {}
        }

        let upstream: Vec<&str> = ctx.transcript().segments().iter().map(|s| s.text.as_str()).collect();
        let payload = json!({
            "module": self.name,
            "segments": upstream.len(),
        });
        let artifact = ctx
            .write_json(&format!("data/global/{}.json", self.name), &payload)
            .await?;

        Ok(ModuleOutput::success(started, payload)
            .with_artifact(artifact)
            .with_metric("segments", upstream.len()))
    }
}

pub fn transcript_json() -> Value {
    json!({
        "segments": [
            {"speaker": "Alice", "text": "Thanks for joining today.", "start": 0.0, "end": 2.0},
            {"speaker": "Bob", "text": "Happy to be here.", "start": 2.5, "end": 4.0},
            {"speaker": "Alice", "text": "Let us start with the roadmap.", "start": 6.5, "end": 9.0},
            {"speaker": "Bob", "text": "Sure, the first milestone is next month.", "start": 9.2, "end": 12.0},
            {"speaker": "Alice", "text": "Great.", "start": 15.0, "end": 15.5}
        ]
    })
}

/// Write a transcript file and return its path
pub fn write_transcript(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}
