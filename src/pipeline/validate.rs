//! Upload validation: classify the artifact and normalise request parameters.
//!
//! Validation is pure: it touches no files and spawns nothing, so a rejected
//! upload leaves no trace. It is also the only place the request kind is
//! decided. The orchestrator branches on [`RequestDescriptor::kind`] and never
//! looks at the file name again.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Legend labels used when the caller sends none, one per torsion ring.
pub const DEFAULT_LABELS: [&str; 7] = ["Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Chi"];

/// At most one label per backbone torsion type (α β γ δ ε ζ χ).
pub const MAX_LABELS: usize = DEFAULT_LABELS.len();

/// A raw upload as handed over by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Original file name; only its extension matters.
    pub artifact_name: String,
    pub bytes: Vec<u8>,
    pub title: Option<String>,
    pub want_visualization: Option<bool>,
    pub labels: Option<Vec<String>>,
}

impl Upload {
    pub fn new(artifact_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            bytes: bytes.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_visualization(mut self, want: bool) -> Self {
        self.want_visualization = Some(want);
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }
}

/// Which flow a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// The upload already holds angle data; it goes straight to the renderer.
    RawData,
    /// A PDB file; angles must be extracted first.
    StructureFile,
}

impl ArtifactKind {
    pub fn default_title(&self) -> &'static str {
        match self {
            ArtifactKind::RawData => "Torsion Rings",
            ArtifactKind::StructureFile => "PDB Torsion Rings",
        }
    }

    /// Prefix for suggested download names.
    pub fn download_prefix(&self) -> &'static str {
        match self {
            ArtifactKind::RawData => "rings",
            ArtifactKind::StructureFile => "pdb_rings",
        }
    }
}

/// Accepted upload extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionClass {
    /// `.dat`
    RawData,
    /// `.pdb`
    StructureFile,
    /// `.txt`
    PlainText,
    /// `.in`
    GenericInput,
}

impl ExtensionClass {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "dat" => Some(ExtensionClass::RawData),
            "pdb" => Some(ExtensionClass::StructureFile),
            "txt" => Some(ExtensionClass::PlainText),
            "in" => Some(ExtensionClass::GenericInput),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExtensionClass::RawData => "dat",
            ExtensionClass::StructureFile => "pdb",
            ExtensionClass::PlainText => "txt",
            ExtensionClass::GenericInput => "in",
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            ExtensionClass::StructureFile => ArtifactKind::StructureFile,
            _ => ArtifactKind::RawData,
        }
    }
}

/// A validated, immutable request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    artifact_name: String,
    bytes: Vec<u8>,
    extension: ExtensionClass,
    title: String,
    want_visualization: bool,
    labels: Vec<String>,
}

impl RequestDescriptor {
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn extension(&self) -> ExtensionClass {
        self.extension
    }

    pub fn kind(&self) -> ArtifactKind {
        self.extension.kind()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Only consulted by the structure-file flow; the raw-data flow always
    /// renders because rendering is its only stage.
    pub fn want_visualization(&self) -> bool {
        self.want_visualization
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// File name the upload is stored under inside the workspace.
    pub fn scratch_name(&self) -> String {
        format!("input.{}", self.extension.extension())
    }
}

/// Classify an upload and normalise its parameters.
///
/// # Errors
/// Every error here is an `InvalidArtifact`-class [`PipelineError`].
pub fn validate(upload: Upload, config: &PipelineConfig) -> Result<RequestDescriptor, PipelineError> {
    let Upload {
        artifact_name,
        bytes,
        title,
        want_visualization,
        labels,
    } = upload;

    let ext = Path::new(artifact_name.trim())
        .extension()
        .map(|e| e.to_string_lossy().into_owned());
    let extension = match ext.as_deref().and_then(ExtensionClass::from_extension) {
        Some(class) => class,
        None => {
            return Err(PipelineError::UnsupportedArtifactKind {
                name: artifact_name,
                extension: ext,
            })
        }
    };

    if bytes.is_empty() {
        return Err(PipelineError::EmptyArtifact {
            name: artifact_name,
        });
    }
    let size = bytes.len() as u64;
    if size > config.max_upload_bytes {
        return Err(PipelineError::ArtifactTooLarge {
            name: artifact_name,
            size,
            limit: config.max_upload_bytes,
        });
    }

    let kind = extension.kind();
    let title = normalise_title(title.as_deref(), kind, config.max_title_chars);
    let labels = normalise_labels(labels)?;
    let want_visualization =
        want_visualization.unwrap_or(kind == ArtifactKind::StructureFile);

    debug!(
        "Validated '{}' as {:?} (visualisation={})",
        artifact_name, kind, want_visualization
    );

    Ok(RequestDescriptor {
        artifact_name,
        bytes,
        extension,
        title,
        want_visualization,
        labels,
    })
}

static RE_CONTROL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Cc}+").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Strip control characters, collapse whitespace, apply the default, and
/// truncate to `max_chars`.
pub fn normalise_title(raw: Option<&str>, kind: ArtifactKind, max_chars: usize) -> String {
    let cleaned = raw
        .map(|t| RE_CONTROL.replace_all(t, " "))
        .map(|t| RE_SPACES.replace_all(&t, " ").trim().to_string())
        .unwrap_or_default();
    let title = if cleaned.is_empty() {
        kind.default_title().to_string()
    } else {
        cleaned
    };
    match title.char_indices().nth(max_chars) {
        Some((cut, _)) => title[..cut].trim_end().to_string(),
        None => title,
    }
}

fn normalise_labels(labels: Option<Vec<String>>) -> Result<Vec<String>, PipelineError> {
    let Some(labels) = labels else {
        return Ok(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect());
    };
    if labels.len() > MAX_LABELS {
        return Err(PipelineError::InvalidRequest(format!(
            "at most {MAX_LABELS} labels are allowed, got {}",
            labels.len()
        )));
    }
    labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            let label = label.trim().to_string();
            if label.is_empty() {
                Err(PipelineError::InvalidRequest(format!(
                    "label {} is blank",
                    i + 1
                )))
            } else {
                Ok(label)
            }
        })
        .collect()
}
