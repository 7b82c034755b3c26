// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Capability requirements and the gate that checks them
//!
//! Modules declare what they need from an input; the input reports what it
//! has. A gate compares the two and decides whether a module is skipped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ModuleSpec;

/// Something a module needs from its input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// At least one transcript segment
    Segments,
    /// Every segment carries start and end times
    SegmentTimestamps,
    /// Every segment carries a speaker label
    SpeakerLabels,
    /// An audio file accompanies the transcript
    Audio,
    /// At least this many speakers carry real names
    MinNamedSpeakers(usize),
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Segments => write!(f, "segments"),
            Self::SegmentTimestamps => write!(f, "segment timestamps"),
            Self::SpeakerLabels => write!(f, "speaker labels"),
            Self::Audio => write!(f, "audio"),
            Self::MinNamedSpeakers(n) => write!(f, "at least {} named speaker(s)", n),
        }
    }
}

/// Facts about an input, as consumed by the gate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_segments: bool,
    pub has_timestamps: bool,
    pub has_speaker_labels: bool,
    pub named_speakers: usize,
    pub has_audio: bool,
    pub enabled_features: BTreeSet<String>,
}

impl Capabilities {
    /// Whether a single requirement is met
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        match requirement {
            Requirement::Segments => self.has_segments,
            Requirement::SegmentTimestamps => self.has_timestamps,
            Requirement::SpeakerLabels => self.has_speaker_labels,
            Requirement::Audio => self.has_audio,
            Requirement::MinNamedSpeakers(n) => self.named_speakers >= *n,
        }
    }
}

/// Outcome of gating one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateDecision {
    pub skip: bool,
    pub reasons: Vec<String>,
}

impl GateDecision {
    pub fn proceed() -> Self {
        Self::default()
    }

    pub fn skip(reasons: Vec<String>) -> Self {
        Self { skip: true, reasons }
    }

    /// Reasons joined for display
    pub fn reason(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Decides whether a module can run against an input
pub trait RequirementsGate: Send + Sync {
    fn evaluate(&self, spec: &ModuleSpec, capabilities: &Capabilities) -> GateDecision;
}

/// Default gate: every declared requirement and feature flag must hold
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityGate;

impl RequirementsGate for CapabilityGate {
    fn evaluate(&self, spec: &ModuleSpec, capabilities: &Capabilities) -> GateDecision {
        let mut reasons: Vec<String> = spec
            .requirements
            .iter()
            .filter(|r| !capabilities.satisfies(r))
            .map(|r| format!("requires {}", r))
            .collect();

        reasons.extend(
            spec.feature_flags
                .iter()
                .filter(|f| !capabilities.enabled_features.contains(*f))
                .map(|f| format!("feature '{}' is not enabled", f)),
        );

        if reasons.is_empty() {
            GateDecision::proceed()
        } else {
            GateDecision::skip(reasons)
        }
    }
}
