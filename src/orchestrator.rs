//! Request orchestration: validate, extract, render, encode, clean up.
//!
//! ## Flows
//!
//! * **Raw data** (`.dat`, `.txt`, `.in`): the upload already is an angle
//!   table, so rendering is the one mandatory stage.
//! * **Structure file** (`.pdb`): extraction is mandatory; rendering the
//!   extracted table is optional and best-effort. If it produces nothing the
//!   request still succeeds with the angle text alone.
//!
//! ## Cleanup
//!
//! Every request owns one [`Workspace`]. It is released on entry to `Done`
//! or `Failed`, and again by its `Drop` impl if the request future is
//! dropped mid-flight. Each tool runs in its own process group, which is
//! killed when the invocation ends or is dropped, so a cancelled request
//! leaves neither files nor processes behind.
//!
//! ## Retry Strategy
//!
//! Mandatory stages are retried up to `max_retries` times with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`, saturating). A missing tool
//! is never retried. The optional render stage runs once.

use crate::config::{PipelineConfig, RenderFormat};
use crate::error::{PipelineError, SkipReason};
use crate::output::{ArtifactFormat, ProducedArtifact, ResultPayload, StageOutput, StageReport};
use crate::pipeline::encode::encode_outputs;
use crate::pipeline::invoke::{ProcessInvoker, ToolInvocation, ToolInvoker};
use crate::pipeline::validate::{validate, ArtifactKind, RequestDescriptor, Upload};
use crate::pipeline::workspace::{Workspace, WorkspaceManager};
use crate::progress::ProgressObserver;
use crate::response::{HealthReport, ToolStatus};
use crate::state::{PipelineState, Stage};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Angle table written by the extraction stage.
const ANGLES_FILE: &str = "torsion_angles.dat";
/// Stem of every rendered image; the extension selects the format.
const RENDER_STEM: &str = "rings";

/// Drives uploads through the pipeline.
///
/// Cheap to clone; clones share configuration and invoker.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    invoker: Arc<dyn ToolInvoker>,
    workspaces: WorkspaceManager,
}

impl Orchestrator {
    /// Orchestrator that spawns real tool processes.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_invoker(config, Arc::new(ProcessInvoker::new()))
    }

    /// Orchestrator with a custom invoker (tests, sandboxes).
    pub fn with_invoker(config: PipelineConfig, invoker: Arc<dyn ToolInvoker>) -> Self {
        let workspaces = WorkspaceManager::new(config.scratch_dir());
        Self {
            config: Arc::new(config),
            invoker,
            workspaces,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one upload end to end.
    ///
    /// # Errors
    /// Validation errors are returned before any workspace exists. Every
    /// later error is returned after the workspace has been released.
    pub async fn process(&self, upload: Upload) -> Result<ResultPayload, PipelineError> {
        let total_start = Instant::now();
        let descriptor = match validate(upload, &self.config) {
            Ok(d) => d,
            Err(e) => {
                info!("Rejected upload: {}", e);
                return Err(e);
            }
        };

        let mut workspace = self.workspaces.acquire()?;
        let mut run = RequestRun::new(
            workspace.token().to_string(),
            self.config.observer.clone(),
        );
        info!(
            "Request {}: '{}' ({}, {} bytes)",
            run.request_id,
            descriptor.artifact_name(),
            descriptor.extension().extension(),
            descriptor.bytes().len()
        );
        if let Some(ref obs) = run.observer {
            obs.on_request_start(&run.request_id, descriptor.artifact_name());
        }

        let result = self.run_flow(&descriptor, &mut workspace, &mut run).await;

        match &result {
            Ok(_) => run.enter(PipelineState::Done),
            Err(e) => run.enter(PipelineState::Failed(e.reason())),
        }
        workspace.release();

        let elapsed = total_start.elapsed().as_millis();
        match &result {
            Ok(payload) => info!(
                "Request {} done in {}ms: {} image(s), download {}",
                run.request_id,
                elapsed,
                payload.images.len(),
                payload.download_filename
            ),
            Err(e) => warn!("Request {} failed after {}ms: {}", run.request_id, elapsed, e),
        }
        if let Some(ref obs) = run.observer {
            obs.on_request_complete(&run.request_id, result.is_ok());
        }
        result
    }

    /// Process several uploads, at most `concurrency` at a time.
    ///
    /// Results come back in input order. One failure does not affect the
    /// others.
    pub async fn process_batch(
        &self,
        uploads: Vec<Upload>,
    ) -> Vec<Result<ResultPayload, PipelineError>> {
        info!(
            "Processing batch of {} upload(s), concurrency {}",
            uploads.len(),
            self.config.concurrency
        );
        stream::iter(uploads.into_iter().map(|upload| self.process(upload)))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    /// Report whether each configured tool is present on disk.
    pub fn health(&self) -> HealthReport {
        let tools = [
            (Stage::Extraction, &self.config.extractor),
            (Stage::Rendering, &self.config.renderer),
        ]
        .into_iter()
        .map(|(stage, tool)| ToolStatus {
            name: tool.name.clone(),
            stage,
            path: tool
                .script
                .as_ref()
                .unwrap_or(&tool.program)
                .display()
                .to_string(),
            available: tool.is_available(),
        })
        .collect();
        HealthReport::new(tools)
    }

    async fn run_flow(
        &self,
        descriptor: &RequestDescriptor,
        workspace: &mut Workspace,
        run: &mut RequestRun,
    ) -> Result<ResultPayload, PipelineError> {
        let input = workspace
            .write_artifact(&descriptor.scratch_name(), descriptor.bytes())
            .await?;
        let work_dir = workspace.path().to_path_buf();
        let render_targets = self.render_targets(workspace);

        run.enter(PipelineState::Extracting);

        let artifacts = match descriptor.kind() {
            ArtifactKind::RawData => {
                let call = StageCall::Render {
                    input: &input,
                    title: descriptor.title(),
                    targets: &render_targets,
                    work_dir: &work_dir,
                };
                match self.run_stage(&call, true, run).await {
                    StageOutput::Produced(images) => images,
                    StageOutput::Skipped(reason) => return Err(reason.into_fatal(Stage::Rendering)),
                }
            }
            ArtifactKind::StructureFile => {
                let angles_path = workspace.artifact_path(ANGLES_FILE);
                let call = StageCall::Extract {
                    input: &input,
                    output: &angles_path,
                    work_dir: &work_dir,
                };
                let mut artifacts = match self.run_stage(&call, true, run).await {
                    StageOutput::Produced(angles) => angles,
                    StageOutput::Skipped(reason) => {
                        return Err(reason.into_fatal(Stage::Extraction))
                    }
                };

                if descriptor.want_visualization() {
                    run.enter(PipelineState::Rendering);
                    let call = StageCall::Render {
                        input: &angles_path,
                        title: descriptor.title(),
                        targets: &render_targets,
                        work_dir: &work_dir,
                    };
                    match self.run_stage(&call, false, run).await {
                        StageOutput::Produced(images) => artifacts.extend(images),
                        StageOutput::Skipped(reason) => warn!(
                            "Request {}: visualisation skipped ({}); returning angles only",
                            run.request_id, reason
                        ),
                    }
                } else {
                    run.record(StageReport::skipped(
                        Stage::Rendering,
                        SkipReason::NotRequested,
                        0,
                    ));
                }
                artifacts
            }
        };

        run.enter(PipelineState::Encoding);
        let encoded = encode_outputs(&artifacts, descriptor.kind().download_prefix()).await?;

        Ok(ResultPayload {
            request_id: run.request_id.clone(),
            kind: descriptor.kind(),
            title: descriptor.title().to_string(),
            labels: descriptor.labels().to_vec(),
            torsion_angles: encoded.torsion_angles,
            residue_count: encoded.residue_count,
            images: encoded.images,
            download_filename: encoded.download_filename,
            angles_filename: encoded.angles_filename,
            stages: run.stages.clone(),
        })
    }

    /// Output path per configured format, tracked in the workspace.
    fn render_targets(&self, workspace: &mut Workspace) -> Vec<(RenderFormat, PathBuf)> {
        self.config
            .render_profile
            .formats()
            .iter()
            .map(|&format| {
                let name = format!("{RENDER_STEM}.{}", format.extension());
                (format, workspace.artifact_path(&name))
            })
            .collect()
    }

    /// Run a stage, retrying a mandatory one, and record its report.
    async fn run_stage(
        &self,
        call: &StageCall<'_>,
        mandatory: bool,
        run: &mut RequestRun,
    ) -> StageOutput {
        let stage = call.stage();
        let max_attempts = if mandatory {
            self.config.max_retries.saturating_add(1)
        } else {
            1
        };
        let start = Instant::now();
        let mut attempt = 0u32;

        let output = loop {
            attempt += 1;
            let output = match call {
                StageCall::Extract {
                    input,
                    output,
                    work_dir,
                } => self.extract_once(input, output, work_dir).await,
                StageCall::Render {
                    input,
                    title,
                    targets,
                    work_dir,
                } => self.render_once(input, title, targets, work_dir).await,
            };

            if let StageOutput::Skipped(reason) = &output {
                if reason.is_retryable() && attempt < max_attempts {
                    let backoff = retry_backoff_ms(self.config.retry_backoff_ms, attempt);
                    warn!(
                        "Request {}: {} produced nothing ({}); retry {}/{} after {}ms",
                        run.request_id,
                        stage,
                        reason,
                        attempt,
                        max_attempts - 1,
                        backoff
                    );
                    sleep(Duration::from_millis(backoff)).await;
                    continue;
                }
            }
            break output;
        };

        let elapsed = start.elapsed().as_millis() as u64;
        let report = match &output {
            StageOutput::Produced(_) => StageReport::produced(stage, elapsed),
            StageOutput::Skipped(reason) => StageReport::skipped(stage, reason.clone(), elapsed),
        }
        .with_attempts(attempt);
        run.record(report);
        output
    }

    async fn extract_once(&self, input: &Path, output: &Path, work_dir: &Path) -> StageOutput {
        remove_stale(output).await;
        let timeout = self.config.extraction_timeout();
        let invocation = ToolInvocation::standard(
            &self.config.extractor,
            input,
            output,
            None,
            work_dir,
            timeout,
        );
        let outcome = self.invoker.invoke(&invocation).await;
        match outcome.skip_reason(timeout) {
            None => StageOutput::Produced(vec![ProducedArtifact {
                format: ArtifactFormat::AngleTable,
                path: output.to_path_buf(),
            }]),
            Some(reason) => StageOutput::Skipped(reason),
        }
    }

    /// One renderer call per format. Produced if at least one format exists.
    async fn render_once(
        &self,
        input: &Path,
        title: &str,
        targets: &[(RenderFormat, PathBuf)],
        work_dir: &Path,
    ) -> StageOutput {
        let timeout = self.config.render_timeout();
        let mut produced = Vec::with_capacity(targets.len());
        let mut first_failure: Option<SkipReason> = None;

        for (format, output) in targets {
            remove_stale(output).await;
            let invocation = ToolInvocation::standard(
                &self.config.renderer,
                input,
                output,
                Some(title),
                work_dir,
                timeout,
            );
            let outcome = self.invoker.invoke(&invocation).await;
            match outcome.skip_reason(timeout) {
                None => produced.push(ProducedArtifact {
                    format: ArtifactFormat::Image(*format),
                    path: output.clone(),
                }),
                Some(reason) => {
                    debug!("Renderer produced no {} output: {}", format, reason);
                    let unavailable = matches!(reason, SkipReason::ToolUnavailable { .. });
                    first_failure.get_or_insert(reason);
                    if unavailable {
                        break;
                    }
                }
            }
        }

        match (produced.is_empty(), first_failure) {
            (false, failure) => {
                if let Some(reason) = failure {
                    warn!("Some render formats are missing: {}", reason);
                }
                StageOutput::Produced(produced)
            }
            (true, Some(reason)) => StageOutput::Skipped(reason),
            (true, None) => StageOutput::Skipped(SkipReason::NotRequested),
        }
    }
}

/// Remove an output left by an earlier attempt, so its existence afterwards
/// can only mean this attempt wrote it.
async fn remove_stale(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove stale output {}: {}", path.display(), e);
        }
    }
}

/// A stage call with everything borrowed, so retries can re-run it.
enum StageCall<'a> {
    Extract {
        input: &'a Path,
        output: &'a Path,
        work_dir: &'a Path,
    },
    Render {
        input: &'a Path,
        title: &'a str,
        targets: &'a [(RenderFormat, PathBuf)],
        work_dir: &'a Path,
    },
}

impl StageCall<'_> {
    fn stage(&self) -> Stage {
        match self {
            StageCall::Extract { .. } => Stage::Extraction,
            StageCall::Render { .. } => Stage::Rendering,
        }
    }
}

/// Per-request bookkeeping: current state, stage reports, observer.
struct RequestRun {
    request_id: String,
    state: PipelineState,
    stages: Vec<StageReport>,
    observer: Option<ProgressObserver>,
}

impl RequestRun {
    fn new(request_id: String, observer: Option<ProgressObserver>) -> Self {
        Self {
            request_id,
            state: PipelineState::Validating,
            stages: Vec::new(),
            observer,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!("Request {}: {} -> {}", self.request_id, self.state, next);
        self.state = next;
        if let Some(ref obs) = self.observer {
            obs.on_state_change(&self.request_id, next);
        }
    }

    fn record(&mut self, report: StageReport) {
        debug!(
            "Request {}: {} stage {} in {}ms ({} attempt(s))",
            self.request_id,
            report.stage,
            if report.produced { "produced" } else { "skipped" },
            report.duration_ms,
            report.attempts
        );
        if let Some(ref obs) = self.observer {
            obs.on_stage_complete(&self.request_id, &report);
        }
        self.stages.push(report);
    }
}

/// Delay before the retry that follows `attempt`: `base_ms * 2^(attempt-1)`,
/// saturating at `u64::MAX`.
fn retry_backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
}
