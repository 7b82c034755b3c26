// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Transcript input
//!
//! Loads a transcript document, derives its identity and content hash, and
//! reports the capability facts the requirements gate consumes.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cache::hash_payload;
use crate::errors::{ConvoflowError, ConvoflowResult};
use crate::registry::Capabilities;

const TRANSCRIPT_SHAPE_HINT: &str =
    "Expected {\"segments\": [{\"speaker\", \"text\", \"start\", \"end\"}]} or a bare segment array";

/// One utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
}

impl Segment {
    pub fn duration(&self) -> Option<f64> {
        match (self.start, self.end) {
            (Some(s), Some(e)) if e >= s => Some(e - s),
            _ => None,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptDocument {
    Wrapped {
        segments: Vec<Segment>,
        #[serde(default)]
        audio_path: Option<PathBuf>,
    },
    Bare(Vec<Segment>),
}

/// A loaded transcript
#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
    segments: Vec<Segment>,
    audio_path: Option<PathBuf>,
}

impl Transcript {
    /// Load a transcript from a JSON file
    pub fn load(path: &Path) -> ConvoflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConvoflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let document: TranscriptDocument = serde_json::from_str(&content).map_err(|e| {
            ConvoflowError::validation(
                format!("'{}' is not a transcript: {}", path.display(), e),
                Some(TRANSCRIPT_SHAPE_HINT),
            )
        })?;

        let (segments, audio_path) = match document {
            TranscriptDocument::Wrapped {
                segments,
                audio_path,
            } => (segments, audio_path),
            TranscriptDocument::Bare(segments) => (segments, None),
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let audio_path = audio_path.map(|p| if p.is_relative() { base.join(p) } else { p });

        Ok(Self {
            path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
            segments,
            audio_path,
        })
    }

    /// Build a transcript directly from segments
    pub fn from_segments(path: impl Into<PathBuf>, segments: Vec<Segment>) -> Self {
        Self {
            path: path.into(),
            segments,
            audio_path: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn audio_path(&self) -> Option<&Path> {
        self.audio_path.as_deref()
    }

    /// Stable identity of the input across runs
    pub fn input_id(&self) -> String {
        self.path.display().to_string()
    }

    /// File stem used to name outputs
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transcript".into())
    }

    /// Hash over normalized content; formatting-only edits keep the hash
    pub fn content_hash(&self) -> ConvoflowResult<String> {
        let normalized: Vec<serde_json::Value> = self
            .segments
            .iter()
            .map(|s| {
                json!({
                    "speaker": s.speaker.as_deref().map(str::trim).unwrap_or(""),
                    "text": s.text.split_whitespace().collect::<Vec<_>>().join(" "),
                    "start": s.start.map(round_ms),
                    "end": s.end.map(round_ms),
                })
            })
            .collect();
        hash_payload(&normalized)
    }

    /// Distinct speaker labels, sorted
    pub fn speakers(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| s.speaker.as_deref().map(str::trim))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn named_speakers(&self) -> Vec<String> {
        self.speakers().into_iter().filter(|s| is_named_speaker(s)).collect()
    }

    /// End of the last timed segment
    pub fn duration_seconds(&self) -> f64 {
        self.segments
            .iter()
            .filter_map(|s| s.end)
            .fold(0.0, f64::max)
    }

    pub fn capabilities(&self, features: &[String]) -> Capabilities {
        let has_segments = !self.segments.is_empty();
        Capabilities {
            has_segments,
            has_timestamps: has_segments
                && self.segments.iter().all(|s| s.start.is_some() && s.end.is_some()),
            has_speaker_labels: has_segments
                && self
                    .segments
                    .iter()
                    .all(|s| s.speaker.as_deref().is_some_and(|l| !l.trim().is_empty())),
            named_speakers: self.named_speakers().len(),
            has_audio: self.audio_path.as_deref().is_some_and(Path::exists),
            enabled_features: features.iter().cloned().collect(),
        }
    }
}

fn round_ms(t: f64) -> f64 {
    (t * 1000.0).round() / 1000.0
}

/// Whether a label is a real name rather than a diarization placeholder
pub fn is_named_speaker(label: &str) -> bool {
    let label = label.trim();
    if label.is_empty() || label.eq_ignore_ascii_case("unknown") {
        return false;
    }

    let upper = label.to_ascii_uppercase();
    match upper.strip_prefix("SPEAKER_").or_else(|| upper.strip_prefix("SPEAKER ")) {
        Some(rest) => rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()),
        None => true,
    }
}

/// Default output location: `<dir>/convoflow-out/<stem>`
pub fn default_output_root(transcript: &Path) -> PathBuf {
    let base = transcript.parent().unwrap_or_else(|| Path::new("."));
    let stem = transcript
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".into());
    base.join("convoflow-out").join(stem)
}

/// Expand paths and glob patterns into a sorted, de-duplicated file list
pub fn expand_inputs(patterns: &[String]) -> ConvoflowResult<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for pattern in patterns {
        let direct = PathBuf::from(pattern);
        if direct.is_file() {
            files.insert(direct);
            continue;
        }

        let mut matched = false;
        for entry in glob::glob(pattern)? {
            match entry {
                Ok(path) if path.is_file() => {
                    matched = true;
                    files.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "unreadable glob match"),
            }
        }

        if !matched {
            return Err(ConvoflowError::NoInputFiles {
                pattern: pattern.clone(),
            });
        }
    }

    Ok(files.into_iter().collect())
}
