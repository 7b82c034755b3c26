// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Built-in module catalog

use super::{Category, ModuleSpec, Registry, RegistryBuilder, Requirement};
use crate::errors::ConvoflowResult;

pub(super) fn builtin_registry() -> ConvoflowResult<Registry> {
    RegistryBuilder::new()
        .register(
            ModuleSpec::new("stats", Category::Light)
                .describe("Per-speaker word, segment and talk-time statistics")
                .requires(Requirement::Segments)
                .timeout(120),
        )
        .register(
            ModuleSpec::new("pauses", Category::Light)
                .describe("Silences between consecutive segments")
                .requires(Requirement::Segments)
                .requires(Requirement::SegmentTimestamps)
                .timeout(120),
        )
        .register(
            ModuleSpec::new("momentum", Category::Medium)
                .describe("Conversational momentum per time window, from pause density")
                .depends_on(&["pauses"])
                .requires(Requirement::SegmentTimestamps)
                .timeout(300),
        )
        .register(
            ModuleSpec::new("moments", Category::Heavy)
                .describe("Highest- and lowest-momentum stretches of the conversation")
                .depends_on(&["momentum"])
                .requires(Requirement::SegmentTimestamps),
        )
        .register(
            ModuleSpec::new("transcript_output", Category::Light)
                .describe("Plain-text export of the transcript with speaker totals")
                .requires(Requirement::Segments)
                .timeout(60),
        )
        // The export header is built from speaker statistics
        .implicit_dependency("transcript_output", "stats")
        .finalize()
}
