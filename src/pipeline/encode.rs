//! Result encoding: workspace files → transport-ready payload pieces.
//!
//! The angle table is returned as text. Rendered images are returned as
//! standard base64 whatever their format; SVG is text too, but callers treat
//! every rendered output the same way (decode, offer as download), so one
//! encoding keeps them simple.
//!
//! Download names are `<prefix>_<stamp>.<ext>`. The stamp is a millisecond
//! timestamp forced to be strictly increasing across the process, so two
//! requests never suggest the same name even when they finish in the same
//! millisecond. All formats of one request share a stamp.

use crate::config::RenderFormat;
use crate::error::PipelineError;
use crate::output::{ArtifactFormat, ProducedArtifact, RenderedImage};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Next download-name stamp: wall-clock milliseconds, bumped past the last
/// stamp handed out.
pub fn next_stamp() -> i64 {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(prev + 1)
}

pub fn download_name(prefix: &str, stamp: i64, extension: &str) -> String {
    format!("{prefix}_{stamp}.{extension}")
}

/// The encoded pieces of a payload, before request metadata is attached.
#[derive(Debug, Clone, Default)]
pub struct EncodedOutputs {
    pub torsion_angles: Option<String>,
    pub residue_count: Option<usize>,
    pub angles_filename: Option<String>,
    pub images: BTreeMap<RenderFormat, RenderedImage>,
    pub download_filename: String,
}

/// Read every produced artifact and encode it.
///
/// The primary download is the first image in format order, else the angle
/// table.
pub async fn encode_outputs(
    artifacts: &[ProducedArtifact],
    prefix: &str,
) -> Result<EncodedOutputs, PipelineError> {
    let stamp = next_stamp();
    let mut out = EncodedOutputs::default();

    for artifact in artifacts {
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| PipelineError::Workspace {
                path: artifact.path.clone(),
                source: e,
            })?;
        let filename = download_name(prefix, stamp, artifact.format.extension());

        match artifact.format {
            ArtifactFormat::AngleTable => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                out.residue_count = Some(count_residue_rows(&text));
                out.torsion_angles = Some(text);
                out.angles_filename = Some(filename);
            }
            ArtifactFormat::Image(format) => {
                out.images
                    .insert(format, encode_image(format, &bytes, filename));
            }
        }
    }

    out.download_filename = match out.images.values().next() {
        Some(img) => img.filename.clone(),
        None => out
            .angles_filename
            .clone()
            .unwrap_or_else(|| download_name(prefix, stamp, "dat")),
    };
    Ok(out)
}

/// Base64-wrap one rendered image.
pub fn encode_image(format: RenderFormat, bytes: &[u8], filename: String) -> RenderedImage {
    let dimensions = match format {
        RenderFormat::Raster => image_dimensions(bytes),
        _ => None,
    };
    let data_base64 = STANDARD.encode(bytes);
    debug!(
        "Encoded {} image → {} bytes base64",
        format,
        data_base64.len()
    );
    RenderedImage {
        format,
        mime_type: format.mime_type().to_string(),
        data_base64,
        filename,
        byte_len: bytes.len(),
        dimensions,
    }
}

fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dims) => Some(dims),
        Err(e) => {
            warn!("Raster output has an unreadable header: {}", e);
            None
        }
    }
}

// A data row is a residue number followed by at least seven angle columns
// (optionally with a nucleotide-type column in between).
static RE_ANGLE_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\d+(?:[ \t]+\S+){7,}[ \t]*$").unwrap());

/// Count residue rows in an angle table, skipping headers and rulers.
pub fn count_residue_rows(table: &str) -> usize {
    RE_ANGLE_ROW.find_iter(table).count()
}
