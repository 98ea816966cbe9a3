//! Error types for the torsion-rings pipeline.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`]: **Fatal**: the request cannot produce a payload
//!   (unsupported upload, a mandatory stage produced nothing, the workspace
//!   could not be created). Returned as `Err(PipelineError)` from
//!   [`crate::orchestrator::Orchestrator::process`].
//!
//! * [`SkipReason`]: **Non-fatal**: a stage ran (or was not run) without
//!   producing its artifact. Stored inside
//!   [`crate::output::StageReport`]. Only mandatory stages convert it into a
//!   [`PipelineError`]; the optional rendering stage of the structure-file
//!   flow records it and carries on with the angle text alone.

use crate::state::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Longest diagnostic excerpt carried in an error. Tools that dump whole
/// tracebacks would otherwise bloat every response.
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

/// Captured process output attached to stage failures for support purposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Diagnostics {
    /// The most useful single excerpt: stderr if the tool wrote any, else stdout.
    pub fn summary(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        truncate_chars(text, MAX_DIAGNOSTIC_CHARS)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\u{2026}", &s[..cut]),
        None => s.to_string(),
    }
}

/// Coarse failure class exposed to callers and to [`crate::state::PipelineState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    InvalidArtifact,
    ToolUnavailable,
    ExtractionFailed,
    RenderingFailed,
    Timeout,
    Internal,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::InvalidArtifact => "invalid artifact",
            FailureReason::ToolUnavailable => "tool unavailable",
            FailureReason::ExtractionFailed => "extraction failed",
            FailureReason::RenderingFailed => "rendering failed",
            FailureReason::Timeout => "timeout",
            FailureReason::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Validation errors (no side effects happened) ──────────────────────
    /// The upload's extension is not one of `.dat`, `.pdb`, `.txt`, `.in`.
    #[error("Unsupported artifact '{name}': only .dat, .pdb, .txt, and .in files are allowed")]
    UnsupportedArtifactKind {
        name: String,
        extension: Option<String>,
    },

    /// The upload carried no bytes.
    #[error("Artifact '{name}' is empty")]
    EmptyArtifact { name: String },

    /// The upload exceeds the configured size limit.
    #[error("Artifact '{name}' is {size} bytes; the limit is {limit} bytes")]
    ArtifactTooLarge { name: String, size: u64, limit: u64 },

    /// A request parameter (labels, title, …) is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Tool errors ───────────────────────────────────────────────────────
    /// A mandatory tool is not installed where the configuration says it is.
    #[error(
        "The {stage} tool is not installed: '{}' does not exist.\n\
Compile or install it, or point the configuration at the right path.",
        .path.display()
    )]
    ToolUnavailable { stage: Stage, path: PathBuf },

    /// The extraction tool ran but left no angle table behind.
    #[error("Failed to extract torsion angles from the structure file")]
    ExtractionFailed { diagnostics: Diagnostics },

    /// The renderer ran on raw angle data but produced no image.
    #[error("Failed to generate the torsion ring visualisation")]
    RenderingFailed { diagnostics: Diagnostics },

    /// A mandatory stage exceeded its time budget and was killed.
    #[error("The {stage} tool timed out after {timeout_ms}ms and was terminated")]
    Timeout {
        stage: Stage,
        timeout_ms: u64,
        diagnostics: Diagnostics,
    },

    // ── Environment errors ────────────────────────────────────────────────
    /// The scratch workspace could not be created or written.
    #[error("Workspace I/O failed at '{}': {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn reason(&self) -> FailureReason {
        match self {
            PipelineError::UnsupportedArtifactKind { .. }
            | PipelineError::EmptyArtifact { .. }
            | PipelineError::ArtifactTooLarge { .. }
            | PipelineError::InvalidRequest(_) => FailureReason::InvalidArtifact,
            PipelineError::ToolUnavailable { .. } => FailureReason::ToolUnavailable,
            PipelineError::ExtractionFailed { .. } => FailureReason::ExtractionFailed,
            PipelineError::RenderingFailed { .. } => FailureReason::RenderingFailed,
            PipelineError::Timeout { .. } => FailureReason::Timeout,
            PipelineError::Workspace { .. }
            | PipelineError::InvalidConfig(_)
            | PipelineError::Internal(_) => FailureReason::Internal,
        }
    }

    /// True when the caller sent something we refuse to process.
    pub fn is_client_error(&self) -> bool {
        self.reason() == FailureReason::InvalidArtifact
    }

    /// HTTP-equivalent status for transport layers.
    pub fn status_code(&self) -> u16 {
        match self.reason() {
            FailureReason::InvalidArtifact => 400,
            FailureReason::ToolUnavailable => 503,
            _ => 500,
        }
    }

    /// Short headline for UI display; the `Display` text is the longer message.
    pub fn headline(&self) -> &'static str {
        match self.reason() {
            FailureReason::InvalidArtifact => "Invalid upload",
            FailureReason::ToolUnavailable => "Processing tool not installed",
            FailureReason::ExtractionFailed => "PDB processing failed",
            FailureReason::RenderingFailed => "Visualisation failed",
            FailureReason::Timeout => "Processing timed out",
            FailureReason::Internal => "Processing failed",
        }
    }

    /// Captured tool output, when the failure came from a tool run.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            PipelineError::ExtractionFailed { diagnostics }
            | PipelineError::RenderingFailed { diagnostics }
            | PipelineError::Timeout { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Why a stage did not produce its artifact.
///
/// Stored in [`crate::output::StageReport`]. Mandatory stages turn this into
/// a [`PipelineError`] with [`SkipReason::into_fatal`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SkipReason {
    /// The caller did not ask for this stage.
    #[error("not requested")]
    NotRequested,

    /// The tool (or its script) is missing on disk.
    #[error("tool not found at '{}'", .path.display())]
    ToolUnavailable { path: PathBuf },

    /// The tool was killed after exceeding its timeout.
    #[error("timed out after {timeout_ms}ms")]
    TimedOut {
        timeout_ms: u64,
        diagnostics: Diagnostics,
    },

    /// The OS refused to start the tool (permissions, bad interpreter, …).
    #[error("could not start tool: {detail}")]
    SpawnFailed { detail: String },

    /// The tool ran to completion but the expected file is absent.
    #[error("tool exited ({}) without producing its output", exit_label(.diagnostics.exit_code))]
    MissingOutput { diagnostics: Diagnostics },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "by signal".to_string(),
    }
}

impl SkipReason {
    /// Whether re-running the same invocation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SkipReason::NotRequested | SkipReason::ToolUnavailable { .. }
        )
    }

    /// Convert into the fatal error a mandatory `stage` reports.
    pub fn into_fatal(self, stage: Stage) -> PipelineError {
        let failed = |diagnostics: Diagnostics| match stage {
            Stage::Extraction => PipelineError::ExtractionFailed { diagnostics },
            Stage::Rendering => PipelineError::RenderingFailed { diagnostics },
        };
        match self {
            SkipReason::ToolUnavailable { path } => PipelineError::ToolUnavailable { stage, path },
            SkipReason::TimedOut {
                timeout_ms,
                diagnostics,
            } => PipelineError::Timeout {
                stage,
                timeout_ms,
                diagnostics,
            },
            SkipReason::MissingOutput { diagnostics } => failed(diagnostics),
            SkipReason::SpawnFailed { detail } => failed(Diagnostics {
                exit_code: None,
                stdout: String::new(),
                stderr: detail,
            }),
            SkipReason::NotRequested => PipelineError::Internal(format!(
                "mandatory {stage} stage was skipped"
            )),
        }
    }
}
