//! Transport-facing response shapes.
//!
//! [`ProcessResponse`] is the JSON a web front end consumes: either the
//! encoded outputs or an error headline with a human message. Tool
//! diagnostics travel in `details`, never a backtrace.

use crate::error::PipelineError;
use crate::output::ResultPayload;
use crate::state::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response for one processed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torsion_angles: Option<String>,
    /// Base64 image per format key (`raster`, `print`, `vector`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_outputs: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_filenames: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residue_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// HTTP-equivalent status; not serialized.
    #[serde(skip)]
    pub status_code: u16,
}

impl ProcessResponse {
    pub fn from_payload(payload: &ResultPayload) -> Self {
        let rendered_outputs = payload.has_images().then(|| {
            payload
                .images
                .values()
                .map(|img| (img.format.key().to_string(), img.data_base64.clone()))
                .collect()
        });
        Self {
            success: true,
            torsion_angles: payload.torsion_angles.clone(),
            rendered_outputs,
            download_filename: Some(payload.download_filename.clone()),
            download_filenames: Some(payload.download_filenames()),
            residue_count: payload.residue_count,
            error: None,
            message: None,
            details: None,
            status_code: 200,
        }
    }

    pub fn from_error(err: &PipelineError) -> Self {
        let details = err
            .diagnostics()
            .map(|d| d.summary())
            .filter(|s| !s.is_empty());
        Self {
            success: false,
            torsion_angles: None,
            rendered_outputs: None,
            download_filename: None,
            download_filenames: None,
            residue_count: None,
            error: Some(err.headline().to_string()),
            message: Some(err.to_string()),
            details,
            status_code: err.status_code(),
        }
    }

    pub fn from_result(result: &Result<ResultPayload, PipelineError>) -> Self {
        match result {
            Ok(payload) => Self::from_payload(payload),
            Err(e) => Self::from_error(e),
        }
    }
}

/// Availability of one configured tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatus {
    pub name: String,
    pub stage: Stage,
    pub path: String,
    pub available: bool,
}

/// Liveness plus per-tool readiness.
///
/// `status` is always `"ok"`: the pipeline itself is up even when a tool is
/// missing. Readiness is [`HealthReport::ready`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub message: String,
    pub tools: Vec<ToolStatus>,
}

impl HealthReport {
    pub fn new(tools: Vec<ToolStatus>) -> Self {
        Self {
            status: "ok".to_string(),
            message: "Pipeline is running".to_string(),
            tools,
        }
    }

    pub fn ready(&self) -> bool {
        self.tools.iter().all(|t| t.available)
    }
}
