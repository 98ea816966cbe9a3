//! External tool invocation: spawn one tool, bound it by a timeout, capture
//! everything it says.
//!
//! The invoker never decides whether a run *succeeded*. It reports what
//! happened in a [`ToolOutcome`]: how the process ended, what it printed, how
//! long it took, and whether the file the caller expected now exists. Exit
//! status is advisory; several of the tools we drive exit 0 after printing an
//! error, and some exit nonzero after writing a perfectly good file.
//!
//! [`ToolInvoker`] is the seam the orchestrator is written against, so tests
//! substitute a scripted fake instead of spawning processes.

use crate::error::{Diagnostics, SkipReason};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long stream readers may keep draining after the child is gone.
///
/// A grandchild that moved out of the tool's process group can hold the pipe
/// open after the group is killed; we stop waiting for its output instead of
/// inheriting its lifetime.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Where an external tool lives and how to launch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Human-readable name used in logs and health reports.
    pub name: String,
    /// Executable to spawn. For script tools this is the interpreter.
    pub program: PathBuf,
    /// Script passed as the first argument to `program`, if any.
    pub script: Option<PathBuf>,
}

impl ToolSpec {
    /// A tool that is itself an executable, e.g. a compiled `pdb_torsion`.
    pub fn executable(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            script: None,
        }
    }

    /// A tool run through an interpreter, e.g. `python3 torsion_rings.py`.
    pub fn script(
        name: impl Into<String>,
        interpreter: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            program: interpreter.into(),
            script: Some(script.into()),
        }
    }

    /// Check the tool is present on disk without running it, and pin it to
    /// absolute paths.
    ///
    /// Relative paths are taken against our own working directory, not the
    /// workspace the tool later runs in. Returns the first missing path on
    /// failure: the script when there is one, else the program.
    pub fn locate(&self) -> Result<ResolvedTool, PathBuf> {
        let script = match &self.script {
            Some(script) => Some(existing_file(script).ok_or_else(|| script.clone())?),
            None => None,
        };
        let program = locate_program(&self.program).ok_or_else(|| self.program.clone())?;
        Ok(ResolvedTool { program, script })
    }

    pub fn is_available(&self) -> bool {
        self.locate().is_ok()
    }
}

/// A [`ToolSpec`] whose files exist, as absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub program: PathBuf,
    pub script: Option<PathBuf>,
}

/// Resolve `program` to an existing file, as an absolute path.
///
/// Bare names (`python3`) are searched on `PATH`; anything with a directory
/// component is taken relative to the current directory.
pub fn locate_program(program: &Path) -> Option<PathBuf> {
    if program.as_os_str().is_empty() {
        return None;
    }
    if program.components().count() > 1 || program.is_absolute() {
        return existing_file(program);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| existing_file(&dir.join(program)))
}

fn existing_file(path: &Path) -> Option<PathBuf> {
    if !path.is_file() {
        return None;
    }
    std::path::absolute(path).ok()
}

/// Everything needed to run one tool once.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: ToolSpec,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    /// The file whose existence marks success.
    pub expected_output: PathBuf,
}

impl ToolInvocation {
    /// Build the standard `tool <input> <output> [title]` call.
    pub fn standard(
        tool: &ToolSpec,
        input: &Path,
        output: &Path,
        title: Option<&str>,
        working_dir: &Path,
        timeout: Duration,
    ) -> Self {
        let mut args: Vec<OsString> = vec![input.into(), output.into()];
        if let Some(title) = title {
            args.push(title.into());
        }
        Self {
            tool: tool.clone(),
            args,
            working_dir: working_dir.to_path_buf(),
            timeout,
            expected_output: output.to_path_buf(),
        }
    }
}

/// How the process ended (or why it never started).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum OutcomeStatus {
    /// The process exited on its own. `exit_code` is `None` when a signal
    /// ended it.
    Completed { exit_code: Option<i32> },
    /// The program or script is missing; nothing was spawned.
    ToolUnavailable { missing: PathBuf },
    /// The process exceeded its timeout and was killed.
    TimedOut,
    /// The OS refused to spawn the process.
    SpawnFailed { detail: String },
}

/// Structured result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub status: OutcomeStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Whether `expected_output` existed once the process was gone.
    pub output_present: bool,
}

impl ToolOutcome {
    /// Outcome for a tool that was never spawned because it is missing.
    pub fn unavailable(missing: PathBuf) -> Self {
        Self {
            status: OutcomeStatus::ToolUnavailable { missing },
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            output_present: false,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            OutcomeStatus::Completed { exit_code } => exit_code,
            _ => None,
        }
    }

    /// Artifact existence is the only success criterion. A killed run may
    /// have left a half-written file, so a timeout never counts.
    pub fn succeeded(&self) -> bool {
        self.output_present && self.status != OutcomeStatus::TimedOut
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            exit_code: self.exit_code(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }

    /// Why this run counts as "nothing produced", or `None` if it succeeded.
    pub fn skip_reason(&self, timeout: Duration) -> Option<SkipReason> {
        if self.succeeded() {
            return None;
        }
        Some(match &self.status {
            OutcomeStatus::ToolUnavailable { missing } => SkipReason::ToolUnavailable {
                path: missing.clone(),
            },
            OutcomeStatus::TimedOut => SkipReason::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
                diagnostics: self.diagnostics(),
            },
            OutcomeStatus::SpawnFailed { detail } => SkipReason::SpawnFailed {
                detail: detail.clone(),
            },
            OutcomeStatus::Completed { .. } => SkipReason::MissingOutput {
                diagnostics: self.diagnostics(),
            },
        })
    }
}

/// Runs external tools. Implementations must never panic on tool failure.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolOutcome;
}

/// The real invoker: spawns a child process with `tokio::process`.
///
/// On unix the child leads a fresh process group. The group is killed once
/// the child exits or times out, and when the future returned by
/// [`ToolInvoker::invoke`] is dropped (request cancelled, client gone), so
/// a tool that forks helpers cannot leave them running.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let resolved = match invocation.tool.locate() {
            Ok(r) => r,
            Err(missing) => {
                warn!(
                    "Tool '{}' unavailable: {} does not exist",
                    invocation.tool.name,
                    missing.display()
                );
                return ToolOutcome::unavailable(missing);
            }
        };

        let start = Instant::now();
        let mut cmd = Command::new(&resolved.program);
        if let Some(script) = &resolved.script {
            cmd.arg(script);
        }
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            "Spawning {} {:?} in {}",
            resolved.program.display(),
            invocation.args,
            invocation.working_dir.display()
        );

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to spawn '{}': {}", invocation.tool.name, e);
                return ToolOutcome {
                    status: OutcomeStatus::SpawnFailed {
                        detail: e.to_string(),
                    },
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: start.elapsed(),
                    output_present: false,
                };
            }
        };

        let mut group = ProcessGroup::new(child.id());
        let stdout_handle = child.stdout.take().map(spawn_drain);
        let stderr_handle = child.stderr.take().map(spawn_drain);

        let status = match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(Ok(exit)) => OutcomeStatus::Completed {
                exit_code: exit.code(),
            },
            Ok(Err(e)) => OutcomeStatus::SpawnFailed {
                detail: format!("failed to wait for process: {e}"),
            },
            Err(_) => {
                warn!(
                    "Tool '{}' exceeded {}ms; killing it",
                    invocation.tool.name,
                    invocation.timeout.as_millis()
                );
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill '{}': {}", invocation.tool.name, e);
                }
                OutcomeStatus::TimedOut
            }
        };
        // Whatever the tool left behind in its group dies with it.
        group.kill();

        let stdout = collect_drain(stdout_handle).await;
        let stderr = collect_drain(stderr_handle).await;
        let duration = start.elapsed();
        let output_present = tokio::fs::try_exists(&invocation.expected_output)
            .await
            .unwrap_or(false);

        debug!(
            "Tool '{}' finished: {:?}, output_present={}, {}ms",
            invocation.tool.name,
            status,
            output_present,
            duration.as_millis()
        );

        ToolOutcome {
            status,
            stdout,
            stderr,
            duration,
            output_present,
        }
    }
}

/// Kills a tool's whole process group, at the latest when dropped.
struct ProcessGroup {
    #[cfg(unix)]
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    #[cfg_attr(not(unix), allow(unused_variables))]
    fn new(leader: Option<u32>) -> Self {
        Self {
            #[cfg(unix)]
            pgid: leader
                .and_then(|id| libc::pid_t::try_from(id).ok())
                .filter(|id| *id > 0),
        }
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg only takes integers. An emptied group yields ESRCH.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                debug!("Killed process group {}", pgid);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Stream read ended early: {}", e);
        }
        buf
    })
}

async fn collect_drain(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!("Stream reader task failed: {}", e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}
