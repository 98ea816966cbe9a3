//! # torsion-rings
//!
//! Turn nucleic-acid structure files and raw backbone torsion-angle tables
//! into ring-style visualisations, by driving external tools.
//!
//! The angle mathematics and the drawing live in separate executables
//! (`pdb_torsion`, a ring renderer). This crate is the part around them:
//! validate the upload, give each request a private scratch directory, run
//! the tools with timeouts, decide which failures are fatal, encode the
//! results, and always clean up.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate   extension → flow, title, labels
//!  ├─ 2. Workspace  unique scratch dir, input written as input.<ext>
//!  ├─ 3. Extract    .pdb only: pdb_torsion → torsion_angles.dat (mandatory)
//!  ├─ 4. Render     renderer → rings.png / rings.pdf / rings.svg
//!  │                (mandatory for raw data, best-effort for .pdb)
//!  ├─ 5. Encode     angles as text, images as base64, download names
//!  └─ 6. Release    workspace removed on success, failure, or cancellation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use torsion_rings::{Orchestrator, PipelineConfig, ProcessResponse, ToolSpec, Upload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .extractor(ToolSpec::executable("pdb_torsion", "/opt/rings/pdb_torsion"))
//!         .renderer(ToolSpec::script("torsion_rings", "python3", "/opt/rings/torsion_rings.py"))
//!         .build()?;
//!     let orchestrator = Orchestrator::new(config);
//!
//!     let upload = Upload::new("1ehz.pdb", std::fs::read("1ehz.pdb")?).with_visualization(true);
//!     let result = orchestrator.process(upload).await;
//!     println!("{}", serde_json::to_string(&ProcessResponse::from_result(&result))?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `torsion-rings` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when embedding the pipeline in a server:
//! ```toml
//! torsion-rings = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod input;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod response;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, RenderFormat, RenderProfile};
pub use error::{Diagnostics, FailureReason, PipelineError, SkipReason};
pub use input::{load_upload, InputError};
pub use orchestrator::Orchestrator;
pub use output::{ArtifactFormat, ProducedArtifact, RenderedImage, ResultPayload, StageOutput, StageReport};
pub use pipeline::invoke::{ProcessInvoker, ToolInvocation, ToolInvoker, ToolOutcome, ToolSpec};
pub use pipeline::validate::{ArtifactKind, Upload};
pub use progress::{NoopObserver, PipelineObserver, ProgressObserver};
pub use response::{HealthReport, ProcessResponse, ToolStatus};
pub use state::{PipelineState, Stage};
