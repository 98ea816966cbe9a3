//! Pipeline stages and the per-request state machine.
//!
//! ```text
//! Validating ──▶ Extracting ──▶ [Rendering] ──▶ Encoding ──▶ Done
//!      │              │              │              │
//!      └──────────────┴──────┬───────┴──────────────┘
//!                            ▼
//!                     Failed(reason)
//! ```
//!
//! `Rendering` is only entered by the structure-file flow when a
//! visualisation was requested. In the raw-data flow the renderer *is* the
//! extraction step, because the upload already holds angle data.

use crate::error::FailureReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One external tool call within the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Rendering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => f.write_str("extraction"),
            Stage::Rendering => f.write_str("rendering"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum PipelineState {
    Validating,
    Extracting,
    Rendering,
    Encoding,
    Done,
    Failed(FailureReason),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done, _) | (Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Validating, Extracting)
            | (Extracting, Rendering)
            | (Extracting, Encoding)
            | (Rendering, Encoding)
            | (Encoding, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Validating => f.write_str("validating"),
            PipelineState::Extracting => f.write_str("extracting"),
            PipelineState::Rendering => f.write_str("rendering"),
            PipelineState::Encoding => f.write_str("encoding"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}
