//! Configuration types for the torsion-rings pipeline.
//!
//! Everything environment-dependent (where the tools live, how long they may
//! run, where scratch space goes) is held in one [`PipelineConfig`] handed to
//! the orchestrator at construction. The library never reads environment
//! variables on its own; the CLI maps its flags (with their `TORSION_*` env
//! fallbacks) onto the builder. That keeps tests deterministic: point the
//! config at fake tools and nothing else changes.

use crate::error::PipelineError;
use crate::pipeline::invoke::ToolSpec;
use crate::progress::ProgressObserver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the processing pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use torsion_rings::{PipelineConfig, RenderProfile, ToolSpec};
///
/// let config = PipelineConfig::builder()
///     .extractor(ToolSpec::executable("pdb_torsion", "/opt/torsion/pdb_torsion"))
///     .renderer(ToolSpec::script("torsion_rings", "python3", "/opt/torsion/torsion_rings.py"))
///     .render_profile(RenderProfile::RasterAndPrint)
///     .render_timeout_ms(20_000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Tool that reads a structure file and writes an angle table.
    /// Called as `extractor <input.pdb> <torsion_angles.dat>`.
    pub extractor: ToolSpec,

    /// Tool that reads an angle table and writes one image.
    /// Called as `renderer <angles> <output.{png,pdf,svg}> <title>`; the
    /// output extension selects the format.
    pub renderer: ToolSpec,

    /// Which image formats the renderer is asked for. Default: raster + print.
    pub render_profile: RenderProfile,

    /// Time budget for one extraction run in milliseconds. Default: 30 000.
    pub extraction_timeout_ms: u64,

    /// Time budget for one render run (per format) in milliseconds. Default: 30 000.
    pub render_timeout_ms: u64,

    /// Directory under which per-request workspaces are created.
    /// If None, uses the OS temp directory.
    pub scratch_root: Option<PathBuf>,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: u64,

    /// Titles longer than this many characters are truncated. Default: 100.
    pub max_title_chars: usize,

    /// Extra attempts for a mandatory stage that produced nothing. Default: 0.
    ///
    /// A missing tool is never retried; a crash or timeout may be.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Uploads processed at once by [`crate::Orchestrator::process_batch`]. Default: 4.
    pub concurrency: usize,

    /// Receives state transitions and stage reports. Default: None.
    pub observer: Option<ProgressObserver>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extractor: ToolSpec::executable("pdb_torsion", "tools/pdb_torsion"),
            renderer: ToolSpec::executable("torsion_rings", "tools/torsion_rings"),
            render_profile: RenderProfile::default(),
            extraction_timeout_ms: 30_000,
            render_timeout_ms: 30_000,
            scratch_root: None,
            max_upload_bytes: 10 * 1024 * 1024,
            max_title_chars: 100,
            max_retries: 0,
            retry_backoff_ms: 500,
            concurrency: 4,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("extractor", &self.extractor)
            .field("renderer", &self.renderer)
            .field("render_profile", &self.render_profile)
            .field("extraction_timeout_ms", &self.extraction_timeout_ms)
            .field("render_timeout_ms", &self.render_timeout_ms)
            .field("scratch_root", &self.scratch_root)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_title_chars", &self.max_title_chars)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Resolved scratch root.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn extractor(mut self, tool: ToolSpec) -> Self {
        self.config.extractor = tool;
        self
    }

    pub fn renderer(mut self, tool: ToolSpec) -> Self {
        self.config.renderer = tool;
        self
    }

    pub fn render_profile(mut self, profile: RenderProfile) -> Self {
        self.config.render_profile = profile;
        self
    }

    pub fn extraction_timeout_ms(mut self, ms: u64) -> Self {
        self.config.extraction_timeout_ms = ms.max(1);
        self
    }

    pub fn render_timeout_ms(mut self, ms: u64) -> Self {
        self.config.render_timeout_ms = ms.max(1);
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: u64) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn max_title_chars(mut self, n: usize) -> Self {
        self.config.max_title_chars = n.clamp(1, 1000);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn observer(mut self, observer: ProgressObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        for tool in [&c.extractor, &c.renderer] {
            if tool.program.as_os_str().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "tool '{}' has an empty program path",
                    tool.name
                )));
            }
        }
        if c.max_upload_bytes == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// An image format the renderer can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    /// PNG.
    Raster,
    /// PDF, for printing.
    Print,
    /// SVG markup.
    Vector,
}

impl RenderFormat {
    /// Key used in `renderedOutputs`.
    pub fn key(&self) -> &'static str {
        match self {
            RenderFormat::Raster => "raster",
            RenderFormat::Print => "print",
            RenderFormat::Vector => "vector",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RenderFormat::Raster => "png",
            RenderFormat::Print => "pdf",
            RenderFormat::Vector => "svg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            RenderFormat::Raster => "image/png",
            RenderFormat::Print => "application/pdf",
            RenderFormat::Vector => "image/svg+xml",
        }
    }
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which formats one render stage produces.
///
/// Both contracts exist in deployed renderers: the matplotlib script writes a
/// PNG and a PDF, the older `nrings_svg` binary writes a single SVG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderProfile {
    /// PNG + PDF. The first format is primary. (default)
    #[default]
    RasterAndPrint,
    /// SVG only.
    Vector,
}

impl RenderProfile {
    /// Formats in priority order; the first one is the primary download.
    pub fn formats(&self) -> &'static [RenderFormat] {
        match self {
            RenderProfile::RasterAndPrint => &[RenderFormat::Raster, RenderFormat::Print],
            RenderProfile::Vector => &[RenderFormat::Vector],
        }
    }
}
