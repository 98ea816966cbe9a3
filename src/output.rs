//! Result types produced by the pipeline.

use crate::config::RenderFormat;
use crate::error::SkipReason;
use crate::pipeline::validate::ArtifactKind;
use crate::state::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What kind of file a stage left in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactFormat {
    /// Text table of backbone torsion angles, one residue per row.
    AngleTable,
    Image(RenderFormat),
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::AngleTable => "dat",
            ArtifactFormat::Image(f) => f.extension(),
        }
    }
}

/// A file a stage produced, ready for the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
    pub format: ArtifactFormat,
    pub path: PathBuf,
}

/// Result of one stage: it produced artifacts, or it was skipped for a reason.
///
/// Stages never raise. Only mandatory stages turn `Skipped` into a fatal
/// error; see [`SkipReason::into_fatal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    Produced(Vec<ProducedArtifact>),
    Skipped(SkipReason),
}

impl StageOutput {
    pub fn is_produced(&self) -> bool {
        matches!(self, StageOutput::Produced(_))
    }
}

/// Timing and outcome of one stage, kept in the payload for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub produced: bool,
    pub duration_ms: u64,
    /// Number of invocations, retries included.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl StageReport {
    pub fn produced(stage: Stage, duration_ms: u64) -> Self {
        Self {
            stage,
            produced: true,
            duration_ms,
            attempts: 1,
            skip_reason: None,
        }
    }

    pub fn skipped(stage: Stage, reason: SkipReason, duration_ms: u64) -> Self {
        Self {
            stage,
            produced: false,
            duration_ms,
            attempts: 1,
            skip_reason: Some(reason),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// One rendered image, transport-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedImage {
    pub format: RenderFormat,
    pub mime_type: String,
    /// Standard-alphabet base64 of the file bytes.
    pub data_base64: String,
    pub filename: String,
    pub byte_len: usize,
    /// Pixel size, for raster formats whose header decodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
}

/// Everything a successful request returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    /// The workspace token, usable to correlate logs.
    pub request_id: String,
    pub kind: ArtifactKind,
    pub title: String,
    pub labels: Vec<String>,
    /// Angle table text. Absent in the raw-data flow.
    pub torsion_angles: Option<String>,
    /// Data rows in `torsion_angles`.
    pub residue_count: Option<usize>,
    pub images: BTreeMap<RenderFormat, RenderedImage>,
    /// Suggested name for the primary download.
    pub download_filename: String,
    /// Suggested name for the angle table download, when there is one.
    pub angles_filename: Option<String>,
    pub stages: Vec<StageReport>,
}

impl ResultPayload {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// Download name per output format key (`angles`, `raster`, …).
    pub fn download_filenames(&self) -> BTreeMap<String, String> {
        let mut names: BTreeMap<String, String> = self
            .images
            .values()
            .map(|img| (img.format.key().to_string(), img.filename.clone()))
            .collect();
        if let Some(ref name) = self.angles_filename {
            names.insert("angles".to_string(), name.clone());
        }
        names
    }
}
