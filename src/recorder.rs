use std::path::{Path, PathBuf};

use crate::config::STDERR_EXCERPT_MAX;
use crate::model::{CaseStatus, Outcome, ToolKind};

/// What actually happened to the subprocess, before it is mapped onto a
/// persisted result row.
#[derive(Debug)]
pub enum RawOutcome {
    /// Process ran to completion on its own.
    Exited { code: Option<i32> },
    /// Wall-clock deadline hit; process group was terminated.
    TimedOut,
    /// Caller asked for termination.
    Cancelled,
    /// OS refused to start the process; no subprocess ever existed.
    SpawnFailed(String),
}

/// Finalized fields for a result row.
#[derive(Debug)]
pub struct RecordedOutcome {
    pub outcome: Outcome,
    pub error_message: Option<String>,
    pub screenshot_ref: Option<String>,
}

/// Map a raw subprocess outcome onto the persisted representation.
/// Every non-Pass outcome carries a non-empty error message.
pub fn record(
    kind: ToolKind,
    raw: RawOutcome,
    stderr: &str,
    working_dir: &Path,
) -> RecordedOutcome {
    match raw {
        RawOutcome::Exited { code: Some(0) } => RecordedOutcome {
            outcome: Outcome::Pass,
            error_message: None,
            screenshot_ref: find_screenshot(kind, working_dir),
        },
        RawOutcome::Exited { code } => {
            let excerpt = truncate_excerpt(stderr, STDERR_EXCERPT_MAX);
            let message = if excerpt.is_empty() {
                match code {
                    Some(c) => format!("exited with code {}", c),
                    None => "terminated by signal".to_string(),
                }
            } else {
                excerpt
            };
            RecordedOutcome {
                outcome: Outcome::Fail,
                error_message: Some(message),
                screenshot_ref: find_screenshot(kind, working_dir),
            }
        }
        RawOutcome::TimedOut => RecordedOutcome {
            outcome: Outcome::Error,
            error_message: Some("execution timed out".to_string()),
            screenshot_ref: None,
        },
        RawOutcome::Cancelled => RecordedOutcome {
            outcome: Outcome::Error,
            error_message: Some("cancelled".to_string()),
            screenshot_ref: None,
        },
        RawOutcome::SpawnFailed(err) => RecordedOutcome {
            outcome: Outcome::Error,
            error_message: Some(err),
            screenshot_ref: None,
        },
    }
}

/// Snapshot the case status should take after this outcome. Error outcomes
/// render no verdict, so the snapshot is left alone.
pub fn status_snapshot(outcome: Outcome) -> Option<CaseStatus> {
    match outcome {
        Outcome::Pass => Some(CaseStatus::Pass),
        Outcome::Fail => Some(CaseStatus::Fail),
        Outcome::Running | Outcome::Error => None,
    }
}

/// Browser tools drop screenshots under `test-results/` in the script's
/// directory; reference the first one so the dashboard can link it.
fn find_screenshot(kind: ToolKind, working_dir: &Path) -> Option<String> {
    match kind {
        ToolKind::Playwright | ToolKind::Selenium => {}
        ToolKind::K6 => return None,
    }
    let pattern = working_dir.join("test-results").join("**").join("*.png");
    let mut matches: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .ok()?
        .filter_map(Result::ok)
        .collect();
    matches.sort();
    matches.into_iter().next().map(|p| p.display().to_string())
}

/// Truncate on a char boundary so multi-byte output cannot panic the
/// excerpt path.
pub fn truncate_excerpt(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut end = max;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
