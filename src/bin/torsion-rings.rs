//! CLI binary for torsion-rings.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, runs each input through the pipeline and prints results.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use torsion_rings::{
    load_upload, Orchestrator, PipelineConfig, PipelineObserver, PipelineState, ProcessResponse,
    ProgressObserver, RenderProfile, ResultPayload, StageReport, ToolSpec,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: one bar across all inputs, one log line per stage.
/// Requests in a batch finish out of order, so lines carry the file name.
struct CliObserver {
    bar: ProgressBar,
    /// request id → artifact name, for log lines.
    names: Mutex<HashMap<String, String>>,
}

impl CliObserver {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos}/{len}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names: Mutex::new(HashMap::new()),
        })
    }

    fn name_of(&self, request_id: &str) -> String {
        self.names
            .lock()
            .ok()
            .and_then(|names| names.get(request_id).cloned())
            .unwrap_or_else(|| request_id.to_string())
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineObserver for CliObserver {
    fn on_request_start(&self, request_id: &str, artifact_name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(request_id.to_string(), artifact_name.to_string());
        }
        self.bar.set_message(artifact_name.to_string());
    }

    fn on_state_change(&self, request_id: &str, state: PipelineState) {
        if !state.is_terminal() {
            self.bar
                .set_message(format!("{}: {}", self.name_of(request_id), state));
        }
    }

    fn on_stage_complete(&self, request_id: &str, report: &StageReport) {
        let mark = if report.produced { green("✓") } else { dim("–") };
        let detail = match &report.skip_reason {
            Some(reason) => reason.to_string(),
            None => "produced".to_string(),
        };
        self.bar.println(format!(
            "  {} {:<24} {:<10} {}  {}",
            mark,
            self.name_of(request_id),
            report.stage,
            dim(&detail),
            dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_request_complete(&self, request_id: &str, success: bool) {
        if !success {
            self.bar
                .println(format!("  {} {}", red("✗"), self.name_of(request_id)));
        }
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render a raw torsion-angle table
  torsion-rings angles.dat -o out/

  # Extract angles from a structure file and render them
  torsion-rings --title "tRNA-Phe" 1ehz.pdb -o out/

  # Angles only, no image
  torsion-rings --visualize false 1ehz.pdb --json

  # Python renderer, SVG output
  torsion-rings --renderer python3 --renderer-script tools/torsion_rings.py \
      --profile vector angles.dat -o out/

  # Fetch a structure over HTTP
  torsion-rings https://files.rcsb.org/download/1EHZ.pdb -o out/

  # Are the tools installed?
  torsion-rings --check-tools

ACCEPTED INPUTS:
  .dat .txt .in   raw torsion-angle tables (rendered directly)
  .pdb            structure files (angles extracted first)

ENVIRONMENT VARIABLES:
  Every option has a TORSION_* variable, e.g. TORSION_EXTRACTOR,
  TORSION_RENDERER, TORSION_RENDER_TIMEOUT. RUST_LOG overrides log filtering.
"#;

/// Drive torsion-angle extraction and ring rendering tools.
#[derive(Parser, Debug)]
#[command(
    name = "torsion-rings",
    version,
    about = "Extract backbone torsion angles and render them as torsion rings",
    long_about = "Run structure files (.pdb) and raw torsion-angle tables (.dat, .txt, .in) \
through the extraction and ring-rendering tools, with per-request scratch directories, \
timeouts and cleanup.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "check_tools")]
    inputs: Vec<String>,

    /// Title drawn on the rings (default depends on input kind).
    #[arg(long, env = "TORSION_TITLE")]
    title: Option<String>,

    /// Render structure files too (true/false). Raw tables always render.
    #[arg(long, env = "TORSION_VISUALIZE")]
    visualize: Option<bool>,

    /// Legend labels, comma-separated (at most 7).
    #[arg(long, env = "TORSION_LABELS", value_delimiter = ',')]
    labels: Vec<String>,

    /// Angle extraction executable.
    #[arg(long, env = "TORSION_EXTRACTOR", default_value = "tools/pdb_torsion")]
    extractor: PathBuf,

    /// Ring renderer executable, or its interpreter with --renderer-script.
    #[arg(long, env = "TORSION_RENDERER")]
    renderer: Option<PathBuf>,

    /// Renderer script passed to the --renderer interpreter (default python3).
    #[arg(long, env = "TORSION_RENDERER_SCRIPT")]
    renderer_script: Option<PathBuf>,

    /// Output formats requested from the renderer.
    #[arg(long, env = "TORSION_PROFILE", value_enum, default_value = "raster-print")]
    profile: ProfileArg,

    /// Extraction timeout in milliseconds.
    #[arg(long, env = "TORSION_EXTRACT_TIMEOUT", default_value_t = 30_000)]
    extract_timeout: u64,

    /// Render timeout in milliseconds, per format.
    #[arg(long, env = "TORSION_RENDER_TIMEOUT", default_value_t = 30_000)]
    render_timeout: u64,

    /// Directory for per-request workspaces (default: system temp).
    #[arg(long, env = "TORSION_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Extra attempts when a mandatory stage produces nothing.
    #[arg(long, env = "TORSION_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Inputs processed at once.
    #[arg(short, long, env = "TORSION_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Write angle tables and images into this directory.
    #[arg(short, long, env = "TORSION_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Print JSON responses instead of a summary.
    #[arg(long, env = "TORSION_JSON")]
    json: bool,

    /// Report whether the configured tools exist, then exit.
    #[arg(long)]
    check_tools: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TORSION_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TORSION_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "TORSION_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "TORSION_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ProfileArg {
    RasterPrint,
    Vector,
}

impl From<ProfileArg> for RenderProfile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::RasterPrint => RenderProfile::RasterAndPrint,
            ProfileArg::Vector => RenderProfile::Vector,
        }
    }
}

/// One line of `--json` output.
#[derive(Serialize)]
struct JsonLine<'a> {
    input: &'a str,
    #[serde(flatten)]
    response: &'a ProcessResponse,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; keep library
    // INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.check_tools;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let observer = show_progress.then(|| CliObserver::new(cli.inputs.len()));
    let config = build_config(
        &cli,
        observer.clone().map(|o| o as ProgressObserver),
    )?;
    let orchestrator = Orchestrator::new(config);

    // ── Health check mode ────────────────────────────────────────────────
    if cli.check_tools {
        let report = orchestrator.health();
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise health report")?
            );
        } else {
            for tool in &report.tools {
                println!(
                    "{} {:<11} {:<16} {}",
                    if tool.available { green("✓") } else { red("✗") },
                    tool.stage,
                    tool.name,
                    dim(&tool.path)
                );
            }
        }
        return Ok(if report.ready() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    // ── Load inputs ──────────────────────────────────────────────────────
    let mut uploads = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let mut upload = load_upload(input, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to load {input}"))?;
        upload.title = cli.title.clone();
        upload.want_visualization = cli.visualize;
        if !cli.labels.is_empty() {
            upload.labels = Some(cli.labels.clone());
        }
        uploads.push(upload);
    }

    // ── Run pipeline ─────────────────────────────────────────────────────
    let results = orchestrator.process_batch(uploads).await;
    if let Some(ref obs) = observer {
        obs.finish();
    }

    let mut failed = 0usize;
    for (input, result) in cli.inputs.iter().zip(&results) {
        let response = ProcessResponse::from_result(result);

        if let (Some(dir), Ok(payload)) = (&cli.output_dir, result) {
            let written = write_outputs(dir, payload)
                .await
                .with_context(|| format!("Failed to write outputs for {input}"))?;
            if !cli.quiet && !cli.json {
                for path in written {
                    eprintln!("   {} {}", dim("→"), bold(&path.display().to_string()));
                }
            }
        }

        if cli.json {
            let line = JsonLine {
                input,
                response: &response,
            };
            println!(
                "{}",
                serde_json::to_string(&line).context("Failed to serialise response")?
            );
        } else if !cli.quiet || result.is_err() {
            print_summary(input, result);
        }

        if result.is_err() {
            failed += 1;
        }
    }

    if !cli.quiet && !cli.json && cli.inputs.len() > 1 {
        let ok = cli.inputs.len() - failed;
        eprintln!(
            "{} {}/{} inputs processed",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            cli.inputs.len()
        );
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(input: &str, result: &Result<ResultPayload, torsion_rings::PipelineError>) {
    match result {
        Ok(payload) => {
            let formats: Vec<&str> = payload.images.keys().map(|f| f.key()).collect();
            let residues = payload
                .residue_count
                .map(|n| format!("{n} residues"))
                .unwrap_or_default();
            eprintln!(
                "{} {}  {}  {}  {}",
                green("✔"),
                bold(input),
                payload.title,
                dim(&residues),
                dim(&if formats.is_empty() {
                    "no image".to_string()
                } else {
                    formats.join("+")
                }),
            );
        }
        Err(e) => {
            eprintln!("{} {}  {}", red("✘"), bold(input), red(e.headline()));
            eprintln!("   {}", e);
            if let Some(details) = e.diagnostics().map(|d| d.summary()) {
                if !details.is_empty() {
                    eprintln!("   {}", dim(&details));
                }
            }
        }
    }
}

/// Decode every output of `payload` into `dir`. Returns the paths written.
async fn write_outputs(dir: &Path, payload: &ResultPayload) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    if let (Some(text), Some(name)) = (&payload.torsion_angles, &payload.angles_filename) {
        written.push(write_atomic(&dir.join(name), text.as_bytes()).await?);
    }
    for image in payload.images.values() {
        let bytes = STANDARD
            .decode(&image.data_base64)
            .with_context(|| format!("Corrupt base64 for {}", image.filename))?;
        written.push(write_atomic(&dir.join(&image.filename), &bytes).await?);
    }
    Ok(written)
}

/// Atomic write: write to temp, then rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(path.to_path_buf())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, observer: Option<ProgressObserver>) -> Result<PipelineConfig> {
    let renderer = match (&cli.renderer, &cli.renderer_script) {
        (interpreter, Some(script)) => ToolSpec::script(
            "torsion_rings",
            interpreter.clone().unwrap_or_else(|| PathBuf::from("python3")),
            script,
        ),
        (Some(program), None) => ToolSpec::executable("torsion_rings", program),
        (None, None) => PipelineConfig::default().renderer,
    };

    let mut builder = PipelineConfig::builder()
        .extractor(ToolSpec::executable("pdb_torsion", &cli.extractor))
        .renderer(renderer)
        .render_profile(cli.profile.clone().into())
        .extraction_timeout_ms(cli.extract_timeout)
        .render_timeout_ms(cli.render_timeout)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_root(dir);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}
