use chrono::Utc;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::{self, CommandSpec};
use crate::config::{CAPTURE_BUFFER_MAX, GRACEFUL_KILL_TIMEOUT_SECS};
use crate::error::EngineError;
use crate::model::{Environment, ExecutionResult, ToolKind};
use crate::recorder::{self, RawOutcome};
use crate::state::SharedState;

/// Handle to an accepted execution: the Running row id plus the task
/// driving the subprocess. Callers may await it, poll the row, or cancel.
#[derive(Debug)]
pub struct ExecutionHandle {
    pub result_id: i64,
    pub task: JoinHandle<()>,
}

/// Execute a test case and wait for its result. Legacy-compatible
/// synchronous form of [`start`].
pub async fn execute(state: &SharedState, case_id: i64) -> Result<ExecutionResult, EngineError> {
    let handle = start(state, case_id).await?;
    handle
        .task
        .await
        .map_err(|e| EngineError::Storage(anyhow::anyhow!("execution task panicked: {}", e)))?;
    let result = state
        .store
        .get_result(handle.result_id)?
        .ok_or_else(|| EngineError::Storage(anyhow::anyhow!("result row vanished")))?;
    Ok(result)
}

/// Validate a test case, open its Running row, and launch the subprocess
/// on its own task. All configuration errors surface here, before any
/// result row exists; everything after acceptance is recorded as the
/// row's outcome.
pub async fn start(state: &SharedState, case_id: i64) -> Result<ExecutionHandle, EngineError> {
    let case = state
        .store
        .get_case(case_id)?
        .ok_or(EngineError::CaseNotFound(case_id))?;

    let kind = adapter::parse_tool_kind(&case.tool_kind)?;
    let script = adapter::resolve_script(&state.config.scripts_dir, &case.script_path, kind)?;
    let spec = adapter::build_command(&state.config, kind, &script, &case.parameters)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    state.claim_execution(case_id, cancel_tx)?;

    // The Running row must be visible before the subprocess starts, so a
    // crash mid-execution still leaves a discoverable record.
    let started_at = Utc::now();
    let result_id = match state.store.insert_running_result(case_id, started_at) {
        Ok(id) => id,
        Err(e) => {
            state.release_execution(case_id);
            return Err(e.into());
        }
    };
    state.set_result_id(case_id, result_id);

    info!(
        "Executing case {} ({}) with {} (result {})",
        case_id, case.name, kind, result_id
    );

    let state_clone = state.clone();
    let task = tokio::spawn(async move {
        run_execution(
            state_clone,
            case_id,
            kind,
            spec,
            result_id,
            started_at,
            cancel_rx,
        )
        .await;
    });

    Ok(ExecutionHandle { result_id, task })
}

/// Request cancellation of a case's in-flight execution. Returns the id of
/// the Running row being cancelled, or None if the row is not assigned yet.
pub fn cancel(state: &SharedState, case_id: i64) -> Result<Option<i64>, EngineError> {
    state.cancel_execution(case_id)
}

/// Releases the per-case execution slot on every exit path, panics
/// included.
struct SlotGuard {
    state: SharedState,
    case_id: i64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.release_execution(self.case_id);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_execution(
    state: SharedState,
    case_id: i64,
    kind: ToolKind,
    spec: CommandSpec,
    result_id: i64,
    started_at: chrono::DateTime<chrono::Utc>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let _slot = SlotGuard {
        state: state.clone(),
        case_id,
    };

    let timeout = state.config.timeout_for(kind);
    let (raw, stdout, stderr) = drive_subprocess(&spec, timeout, &mut cancel_rx).await;

    let recorded = recorder::record(kind, raw, &stderr, &spec.working_dir);
    let ended_at = Utc::now();
    let duration_secs = (ended_at - started_at).num_milliseconds() as f64 / 1000.0;

    if let Err(e) = state.store.finalize_result(
        result_id,
        recorded.outcome,
        ended_at,
        duration_secs,
        Some(&stdout),
        Some(&stderr),
        recorded.error_message.as_deref(),
        recorded.screenshot_ref.as_deref(),
    ) {
        warn!("Failed to finalize result {}: {}", result_id, e);
    }

    if let Some(status) = recorder::status_snapshot(recorded.outcome) {
        if let Err(e) = state.store.update_case_status(case_id, status) {
            warn!("Failed to update case {} status: {}", case_id, e);
        }
        // The owning folder, not the case row's own environment field,
        // decides which rollup the case lands in.
        for environment in Environment::ALL {
            state.invalidate_summary(environment);
        }
    }

    // Tool artifacts are removed on every exit path.
    for file in &spec.cleanup_files {
        let _ = std::fs::remove_file(file);
    }

    info!(
        "Case {} finished: {:?} in {:.1}s",
        case_id, recorded.outcome, duration_secs
    );
}

/// Spawn the subprocess and wait for exit, deadline, or cancellation.
/// Returns the raw outcome plus the bounded stdout/stderr captures.
async fn drive_subprocess(
    spec: &CommandSpec,
    timeout: Duration,
    cancel_rx: &mut watch::Receiver<bool>,
) -> (RawOutcome, String, String) {
    let mut child = match spawn_in_group(spec) {
        Ok(child) => child,
        Err(e) => return (RawOutcome::SpawnFailed(e.to_string()), String::new(), String::new()),
    };

    let stdout_task = child.stdout.take().map(|r| tokio::spawn(read_capped(r)));
    let stderr_task = child.stderr.take().map(|r| tokio::spawn(read_capped(r)));

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let raw = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => RawOutcome::Exited { code: status.code() },
            Err(e) => RawOutcome::SpawnFailed(format!("wait failed: {}", e)),
        },
        _ = &mut deadline => {
            warn!("Execution deadline of {:?} hit, terminating process group", timeout);
            kill_process_group(&mut child).await;
            RawOutcome::TimedOut
        }
        // The wrapper discards the watch guard before this branch's body
        // awaits; holding it would pin a non-Send borrow across the kill.
        _ = async { let _ = cancel_rx.wait_for(|cancelled| *cancelled).await; } => {
            info!("Cancellation requested, terminating process group");
            kill_process_group(&mut child).await;
            RawOutcome::Cancelled
        }
    };

    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    (raw, stdout, stderr)
}

/// Spawn with stdio piped and the child in its own process group, so
/// grandchildren spawned by the automation tool can be terminated with it.
fn spawn_in_group(spec: &CommandSpec) -> std::io::Result<Child> {
    let mut cmd = std::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &spec.extra_env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    let mut cmd = Command::from(cmd);
    cmd.kill_on_drop(true);
    cmd.spawn()
}

/// Terminate the child and everything it spawned. TERM the group first,
/// give it a grace period, then KILL.
async fn kill_process_group(child: &mut Child) {
    let pid = child.id();

    #[cfg(unix)]
    if let Some(pid) = pid {
        let _ = Command::new("kill")
            .args(["-TERM", "--", &format!("-{}", pid)])
            .status()
            .await;
    }
    #[cfg(windows)]
    if let Some(pid) = pid {
        let _ = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .status()
            .await;
    }

    let _ = child.start_kill();
    let reaped = tokio::time::timeout(
        Duration::from_secs(GRACEFUL_KILL_TIMEOUT_SECS),
        child.wait(),
    )
    .await;
    if reaped.is_err() {
        warn!("Child did not exit within grace period after TERM");
        #[cfg(unix)]
        if let Some(pid) = pid {
            let _ = Command::new("kill")
                .args(["-KILL", "--", &format!("-{}", pid)])
                .status()
                .await;
        }
        let _ = child.wait().await;
    }
}

/// Read up to the capture cap, then keep draining so a chatty tool never
/// blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = (&mut reader)
        .take(CAPTURE_BUFFER_MAX as u64)
        .read_to_end(&mut buf)
        .await;
    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&buf).into_owned()
}
