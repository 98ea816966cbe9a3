//! Integration tests for the torsion-rings pipeline.
//!
//! Most tests drive the orchestrator through a scripted [`FakeInvoker`] so
//! every tool behaviour (output written, nothing written, tool missing,
//! timeout, hang, panic) can be forced deterministically. The `unix` module
//! at the bottom runs real shell-script tools through the process invoker.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use torsion_rings::pipeline::invoke::OutcomeStatus;
use torsion_rings::{
    ArtifactKind, FailureReason, Orchestrator, PipelineConfig, PipelineError, PipelineObserver,
    PipelineState, ProcessResponse, ProgressObserver, RenderFormat, RenderProfile, SkipReason,
    Stage, ToolInvocation, ToolInvoker, ToolOutcome, Upload,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const TABLE: &str = "\
Residue  Alpha    Beta    Gamma   Delta  Epsilon   Zeta      Chi
------- -------- ------- ------- ------- -------- ------- -------
      1    999.0   999.0    54.2    81.3   -150.1   -73.4   -160.2
      2    -68.1   178.9    53.7    82.0   -152.3   -71.9   -158.8
";

const PDB: &[u8] = b"ATOM      1  P     G A   1      50.193  51.190  50.534  1.00 93.87           P\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    /// Write the expected output and exit 0.
    Produce,
    /// Exit 1 with a message on stderr, write nothing.
    NoOutput,
    /// Report the tool as missing.
    Unavailable,
    /// Report a timeout.
    TimeOut,
    /// Never return.
    Hang,
    Panic,
}

#[derive(Debug, Clone)]
struct Call {
    tool: String,
    args: Vec<String>,
    /// Whether the first argument existed when the tool was called.
    input_present: bool,
    working_dir: PathBuf,
}

struct FakeInvoker {
    extractor: Behaviour,
    renderer: Behaviour,
    calls: Mutex<Vec<Call>>,
}

impl FakeInvoker {
    fn new(extractor: Behaviour, renderer: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            extractor,
            renderer,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        8,
        4,
        image::Rgba([0, 0, 255, 255]),
    ));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn fake_output(path: &Path) -> Vec<u8> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => png_bytes(),
        Some("pdf") => b"%PDF-1.4 rings".to_vec(),
        Some("svg") => b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec(),
        _ => TABLE.as_bytes().to_vec(),
    }
}

#[async_trait]
impl ToolInvoker for FakeInvoker {
    async fn invoke(&self, inv: &ToolInvocation) -> ToolOutcome {
        let args: Vec<String> = inv
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.calls.lock().unwrap().push(Call {
            tool: inv.tool.name.clone(),
            input_present: Path::new(&args[0]).exists(),
            args,
            working_dir: inv.working_dir.clone(),
        });

        let behaviour = if inv.tool.name == "pdb_torsion" {
            self.extractor
        } else {
            self.renderer
        };

        let mut outcome = ToolOutcome {
            status: OutcomeStatus::Completed { exit_code: Some(0) },
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(2),
            output_present: false,
        };
        match behaviour {
            Behaviour::Produce => {
                tokio::fs::write(&inv.expected_output, fake_output(&inv.expected_output))
                    .await
                    .unwrap();
                outcome.output_present = true;
            }
            Behaviour::NoOutput => {
                outcome.status = OutcomeStatus::Completed { exit_code: Some(1) };
                outcome.stderr = "ERROR: could not parse input\n".into();
            }
            Behaviour::Unavailable => {
                return ToolOutcome::unavailable(inv.tool.program.clone());
            }
            Behaviour::TimeOut => {
                outcome.status = OutcomeStatus::TimedOut;
                outcome.duration = inv.timeout;
            }
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Behaviour::Panic => panic!("tool invoker exploded"),
        }
        outcome
    }
}

fn orchestrator(scratch: &Path, invoker: Arc<FakeInvoker>) -> Orchestrator {
    init_tracing();
    let config = PipelineConfig::builder()
        .scratch_root(scratch)
        .build()
        .unwrap();
    Orchestrator::with_invoker(config, invoker)
}

fn assert_scratch_empty(scratch: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(scratch)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(leftovers.is_empty(), "workspace leaked: {leftovers:?}");
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_raw_data_renders_every_format() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::Unavailable, Behaviour::Produce);
    let orch = orchestrator(scratch.path(), invoker.clone());

    let result = orch
        .process(Upload::new("angles.dat", TABLE.as_bytes().to_vec()).with_title("Test"))
        .await;
    let payload = result.as_ref().unwrap();

    assert_eq!(payload.kind, ArtifactKind::RawData);
    assert_eq!(payload.title, "Test");
    assert!(payload.torsion_angles.is_none());
    assert_eq!(payload.images.len(), 2);
    assert_eq!(
        payload.images[&RenderFormat::Raster].dimensions,
        Some((8, 4))
    );

    let json = serde_json::to_value(ProcessResponse::from_result(&result)).unwrap();
    assert_eq!(json["success"], true);
    let raster = json["renderedOutputs"]["raster"].as_str().unwrap();
    assert_eq!(STANDARD.decode(raster).unwrap(), png_bytes());
    assert!(json["renderedOutputs"]["print"].is_string());
    let download = json["downloadFilename"].as_str().unwrap();
    assert!(download.starts_with("rings_") && download.ends_with(".png"), "{download}");

    // The extractor is never involved for raw data.
    let calls = invoker.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.tool == "torsion_rings"));
    assert!(calls.iter().all(|c| c.input_present));
    assert!(calls[0].args[0].ends_with("input.dat"));
    assert_eq!(calls[0].args[2], "Test");
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn scenario_b_structure_without_visualisation() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::Produce, Behaviour::Produce);
    let orch = orchestrator(scratch.path(), invoker.clone());

    let result = orch
        .process(Upload::new("1ehz.pdb", PDB.to_vec()).with_visualization(false))
        .await;
    let payload = result.as_ref().unwrap();

    assert_eq!(payload.torsion_angles.as_deref(), Some(TABLE));
    assert_eq!(payload.residue_count, Some(2));
    assert!(!payload.has_images());
    assert_eq!(payload.stages.len(), 2);
    assert_eq!(
        payload.stages[1].skip_reason,
        Some(SkipReason::NotRequested)
    );

    let json = serde_json::to_value(ProcessResponse::from_result(&result)).unwrap();
    assert!(json.get("renderedOutputs").is_none());
    assert!(json["torsionAngles"].is_string());
    assert!(json["downloadFilename"]
        .as_str()
        .unwrap()
        .starts_with("pdb_rings_"));

    let calls = invoker.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool, "pdb_torsion");
    assert!(calls[0].args[0].ends_with("input.pdb"));
    assert!(calls[0].args[1].ends_with("torsion_angles.dat"));
    assert_eq!(calls[0].args.len(), 2);
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn scenario_c_missing_renderer_degrades_to_angles() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::Produce, Behaviour::Unavailable);
    let orch = orchestrator(scratch.path(), invoker.clone());

    let result = orch
        .process(Upload::new("1ehz.pdb", PDB.to_vec()).with_visualization(true))
        .await;
    let payload = result.as_ref().unwrap();

    assert_eq!(payload.torsion_angles.as_deref(), Some(TABLE));
    assert!(!payload.has_images());
    assert!(!payload.stages[1].produced);
    assert!(matches!(
        payload.stages[1].skip_reason,
        Some(SkipReason::ToolUnavailable { .. })
    ));

    let json = serde_json::to_value(ProcessResponse::from_result(&result)).unwrap();
    assert_eq!(json["success"], true);
    assert!(json.get("renderedOutputs").is_none());

    // Unavailable renderer is not asked for the second format.
    assert_eq!(invoker.calls().len(), 2);
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn scenario_d_unsupported_extension_touches_nothing() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::Produce, Behaviour::Produce);
    let orch = orchestrator(scratch.path(), invoker.clone());

    let result = orch
        .process(Upload::new("structure.cif", b"data_1EHZ".to_vec()))
        .await;
    let err = assert_err!(result.as_ref());
    assert!(err.is_client_error());
    assert_eq!(err.reason(), FailureReason::InvalidArtifact);

    let response = ProcessResponse::from_result(&result);
    assert_eq!(response.status_code, 400);
    assert!(!response.success);

    assert!(invoker.calls().is_empty());
    assert_scratch_empty(scratch.path());
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn raw_data_without_render_output_is_fatal() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::Produce, Behaviour::NoOutput),
    );
    let err = orch
        .process(Upload::new("angles.txt", TABLE.as_bytes().to_vec()))
        .await
        .unwrap_err();
    match &err {
        PipelineError::RenderingFailed { diagnostics } => {
            assert_eq!(diagnostics.exit_code, Some(1));
            assert!(diagnostics.stderr.contains("could not parse"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.status_code(), 500);
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn failed_extraction_is_fatal_and_skips_rendering() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::NoOutput, Behaviour::Produce);
    let orch = orchestrator(scratch.path(), invoker.clone());
    let err = orch
        .process(Upload::new("1ehz.pdb", PDB.to_vec()).with_visualization(true))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ExtractionFailed { .. }));
    assert_eq!(invoker.calls().len(), 1);
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn missing_extractor_is_deployment_error() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::Unavailable, Behaviour::Produce),
    );
    let err = orch
        .process(Upload::new("1ehz.pdb", PDB.to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ToolUnavailable {
            stage: Stage::Extraction,
            ..
        }
    ));
    assert_eq!(err.status_code(), 503);
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn timed_out_extraction_reports_timeout() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::TimeOut, Behaviour::Produce),
    );
    let err = orch
        .process(Upload::new("1ehz.pdb", PDB.to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Timeout {
            stage: Stage::Extraction,
            timeout_ms: 30_000,
            ..
        }
    ));
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn timed_out_optional_render_still_succeeds() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::Produce, Behaviour::TimeOut),
    );
    let payload = orch
        .process(Upload::new("1ehz.pdb", PDB.to_vec()))
        .await
        .unwrap();
    assert!(payload.torsion_angles.is_some());
    assert!(!payload.has_images());
    assert!(matches!(
        payload.stages[1].skip_reason,
        Some(SkipReason::TimedOut { .. })
    ));
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_request_releases_workspace() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::Hang, Behaviour::Produce),
    );
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        orch.process(Upload::new("1ehz.pdb", PDB.to_vec())),
    )
    .await;
    assert!(outcome.is_err(), "request should still be running");
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn panicking_stage_releases_workspace() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::Panic, Behaviour::Produce),
    );
    let handle = tokio::spawn(async move { orch.process(Upload::new("1ehz.pdb", PDB.to_vec())).await });
    let joined = handle.await;
    assert!(joined.unwrap_err().is_panic());
    assert_scratch_empty(scratch.path());
}

#[tokio::test]
async fn tools_run_inside_the_request_workspace() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::Produce, Behaviour::Produce);
    let orch = orchestrator(scratch.path(), invoker.clone());
    orch.process(Upload::new("1ehz.pdb", PDB.to_vec()))
        .await
        .unwrap();

    let calls = invoker.calls();
    assert_eq!(calls.len(), 3);
    let ws = &calls[0].working_dir;
    assert!(ws.starts_with(scratch.path()));
    assert!(calls.iter().all(|c| &c.working_dir == ws));
    // The renderer reads the table the extractor wrote.
    assert_eq!(calls[1].args[0], calls[0].args[1]);
    assert!(!ws.exists());
}

// ── Encoding & naming ────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_requests_get_distinct_filenames() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::Produce, Behaviour::Produce),
    );
    let upload = Upload::new("angles.dat", TABLE.as_bytes().to_vec());
    let first = assert_ok!(orch.process(upload.clone()).await);
    let second = assert_ok!(orch.process(upload).await);

    assert_ne!(first.download_filename, second.download_filename);
    assert_ne!(first.request_id, second.request_id);
    for format in [RenderFormat::Raster, RenderFormat::Print] {
        assert_eq!(
            first.images[&format].data_base64,
            second.images[&format].data_base64
        );
    }
}

#[tokio::test]
async fn vector_profile_requests_svg_only() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::Produce, Behaviour::Produce);
    let config = PipelineConfig::builder()
        .scratch_root(scratch.path())
        .render_profile(RenderProfile::Vector)
        .build()
        .unwrap();
    let orch = Orchestrator::with_invoker(config, invoker.clone());

    let payload = orch
        .process(Upload::new("angles.in", TABLE.as_bytes().to_vec()))
        .await
        .unwrap();
    assert_eq!(payload.images.len(), 1);
    let svg = &payload.images[&RenderFormat::Vector];
    assert_eq!(svg.mime_type, "image/svg+xml");
    assert!(svg.filename.ends_with(".svg"));
    assert!(invoker.calls()[0].args[1].ends_with("rings.svg"));
}

#[tokio::test]
async fn default_title_and_labels_by_kind() {
    let scratch = tempfile::tempdir().unwrap();
    let invoker = FakeInvoker::new(Behaviour::Produce, Behaviour::Produce);
    let orch = orchestrator(scratch.path(), invoker.clone());

    let pdb = orch
        .process(Upload::new("1EHZ.PDB", PDB.to_vec()))
        .await
        .unwrap();
    assert_eq!(pdb.title, "PDB Torsion Rings");
    assert_eq!(pdb.labels.len(), 7);
    assert_eq!(invoker.calls()[1].args[2], "PDB Torsion Rings");

    let raw = orch
        .process(Upload::new("angles.dat", TABLE.as_bytes().to_vec()))
        .await
        .unwrap();
    assert_eq!(raw.title, "Torsion Rings");
}

// ── Batch & observer ─────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let scratch = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        scratch.path(),
        FakeInvoker::new(Behaviour::Produce, Behaviour::Produce),
    );
    let results = orch
        .process_batch(vec![
            Upload::new("a.dat", TABLE.as_bytes().to_vec()),
            Upload::new("b.exe", b"MZ".to_vec()),
            Upload::new("c.pdb", PDB.to_vec()).with_visualization(false),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().kind, ArtifactKind::RawData);
    assert!(results[1].as_ref().unwrap_err().is_client_error());
    assert_eq!(
        results[2].as_ref().unwrap().kind,
        ArtifactKind::StructureFile
    );
    assert_scratch_empty(scratch.path());
}

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<PipelineState>>,
    completed: Mutex<Vec<bool>>,
}

impl PipelineObserver for Recorder {
    fn on_state_change(&self, _request_id: &str, state: PipelineState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_request_complete(&self, _request_id: &str, success: bool) {
        self.completed.lock().unwrap().push(success);
    }
}

#[tokio::test]
async fn observer_sees_structure_flow_and_failure() {
    let scratch = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .scratch_root(scratch.path())
        .observer(recorder.clone() as ProgressObserver)
        .build()
        .unwrap();

    let ok = Orchestrator::with_invoker(
        config.clone(),
        FakeInvoker::new(Behaviour::Produce, Behaviour::Produce),
    );
    ok.process(Upload::new("1ehz.pdb", PDB.to_vec()))
        .await
        .unwrap();
    assert_eq!(
        *recorder.states.lock().unwrap(),
        vec![
            PipelineState::Extracting,
            PipelineState::Rendering,
            PipelineState::Encoding,
            PipelineState::Done,
        ]
    );

    recorder.states.lock().unwrap().clear();
    let failing = Orchestrator::with_invoker(
        config,
        FakeInvoker::new(Behaviour::NoOutput, Behaviour::Produce),
    );
    failing
        .process(Upload::new("1ehz.pdb", PDB.to_vec()))
        .await
        .unwrap_err();
    assert_eq!(
        *recorder.states.lock().unwrap(),
        vec![
            PipelineState::Extracting,
            PipelineState::Failed(FailureReason::ExtractionFailed),
        ]
    );
    assert_eq!(*recorder.completed.lock().unwrap(), vec![true, false]);
}

// ── Real processes ───────────────────────────────────────────────────────────

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;
    use torsion_rings::ToolSpec;

    fn write_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(scratch: &Path, tools: &Path, renderer_body: &str) -> PipelineConfig {
        let extractor = write_tool(
            tools,
            "pdb_torsion",
            &format!("cat > \"$2\" <<'EOF'\n{TABLE}EOF"),
        );
        let renderer = write_tool(tools, "torsion_rings", renderer_body);
        PipelineConfig::builder()
            .scratch_root(scratch)
            .extractor(ToolSpec::executable("pdb_torsion", extractor))
            .renderer(ToolSpec::executable("torsion_rings", renderer))
            .render_timeout_ms(300)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn end_to_end_with_shell_tools() {
        let scratch = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(config(
            scratch.path(),
            tools.path(),
            r#"printf '%s' "$3" > "$2""#,
        ));

        let payload = orch
            .process(Upload::new("1ehz.pdb", PDB.to_vec()).with_title("tRNA Phe"))
            .await
            .unwrap();
        assert_eq!(payload.torsion_angles.as_deref(), Some(TABLE));
        assert_eq!(payload.residue_count, Some(2));
        let pdf = &payload.images[&RenderFormat::Print];
        assert_eq!(STANDARD.decode(&pdf.data_base64).unwrap(), b"tRNA Phe");
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn hung_renderer_is_killed_and_degrades() {
        let scratch = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(config(scratch.path(), tools.path(), "exec sleep 30"));

        let start = Instant::now();
        let payload = orch
            .process(Upload::new("1ehz.pdb", PDB.to_vec()))
            .await
            .unwrap();
        // Two formats, 300ms each, plus reader grace.
        assert!(start.elapsed() < Duration::from_secs(4), "{:?}", start.elapsed());
        assert!(payload.torsion_angles.is_some());
        assert!(!payload.has_images());
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn relative_tool_paths_run_inside_the_workspace() {
        let scratch = tempfile::tempdir().unwrap();
        let tools = tempfile::Builder::new()
            .prefix("tools-")
            .tempdir_in(".")
            .unwrap();
        assert!(tools.path().is_relative());
        let orch = Orchestrator::new(config(
            scratch.path(),
            tools.path(),
            r#"printf '%s' "$3" > "$2""#,
        ));
        assert!(orch.health().ready());

        let payload = orch
            .process(Upload::new("angles.dat", TABLE.as_bytes().to_vec()).with_title("Relative"))
            .await
            .unwrap();
        let png = &payload.images[&RenderFormat::Raster];
        assert_eq!(STANDARD.decode(&png.data_base64).unwrap(), b"Relative");
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn health_reflects_installed_tools() {
        let scratch = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(config(scratch.path(), tools.path(), "true"));
        let report = orch.health();
        assert!(report.ready());

        std::fs::remove_file(tools.path().join("torsion_rings")).unwrap();
        let report = orch.health();
        assert!(!report.ready());
        assert!(report.tools[0].available);
        assert!(!report.tools[1].available);
    }
}
