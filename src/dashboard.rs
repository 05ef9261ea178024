use chrono::Utc;

use crate::error::EngineError;
use crate::hierarchy;
use crate::model::{CaseStatus, DashboardSummary, Environment};
use crate::state::SharedState;

/// Placeholder distribution for environments where not a single case has
/// a recorded status (fresh legacy imports). Fixed demo percentages;
/// integer truncation, remainder into not_tested. Always tagged
/// `is_synthetic` so callers cannot mistake it for execution history.
const SYNTHETIC_NOT_TESTED: f64 = 0.70;
const SYNTHETIC_NOT_APPLICABLE: f64 = 0.10;
const SYNTHETIC_PASS: f64 = 0.15;
const SYNTHETIC_FAIL: f64 = 0.03;
const SYNTHETIC_BLOCKED: f64 = 0.02;

/// Rollup for one environment, served from the cache when the underlying
/// statuses have not changed since the last computation.
pub fn summarize(state: &SharedState, environment: Environment) -> Result<DashboardSummary, EngineError> {
    if let Some(cached) = state.cached_summary(environment) {
        return Ok(cached);
    }

    // Generation first: an invalidation landing anywhere after this read
    // makes the write below a no-op instead of caching a stale rollup.
    let generation = state.summary_generation(environment);

    let folders = state.store.list_folders()?;
    let folder_ids = hierarchy::environment_folder_ids(&folders, environment)?;
    let statuses = state.store.case_statuses_in_folders(&folder_ids)?;

    let summary = summarize_statuses(environment, &statuses, state.config.synthetic_fallback);
    state.cache_summary(summary.clone(), generation);
    Ok(summary)
}

/// Rollups for every environment.
pub fn summarize_all(state: &SharedState) -> Result<Vec<DashboardSummary>, EngineError> {
    Environment::ALL
        .iter()
        .map(|env| summarize(state, *env))
        .collect()
}

/// Pure aggregation over already-loaded statuses.
pub fn summarize_statuses(
    environment: Environment,
    statuses: &[Option<CaseStatus>],
    synthetic_fallback: bool,
) -> DashboardSummary {
    let total = statuses.len() as i64;
    let mut passed = 0;
    let mut failed = 0;
    let mut blocked = 0;
    let mut not_tested = 0;
    let mut not_applicable = 0;

    for status in statuses.iter().flatten() {
        match status {
            CaseStatus::Pass => passed += 1,
            CaseStatus::Fail => failed += 1,
            CaseStatus::Blocked => blocked += 1,
            CaseStatus::NotTested => not_tested += 1,
            CaseStatus::NotApplicable => not_applicable += 1,
        }
    }

    let recorded = passed + failed + blocked + not_tested + not_applicable;
    let is_synthetic = synthetic_fallback && total > 0 && recorded == 0;

    if is_synthetic {
        not_tested = (total as f64 * SYNTHETIC_NOT_TESTED) as i64;
        not_applicable = (total as f64 * SYNTHETIC_NOT_APPLICABLE) as i64;
        passed = (total as f64 * SYNTHETIC_PASS) as i64;
        failed = (total as f64 * SYNTHETIC_FAIL) as i64;
        blocked = (total as f64 * SYNTHETIC_BLOCKED) as i64;
        not_tested += total - (not_tested + not_applicable + passed + failed + blocked);
    } else {
        // Cases with no recorded status count as not tested.
        not_tested += total - recorded;
    }

    let pass_rate = if total > 0 {
        round2(passed as f64 / total as f64 * 100.0)
    } else {
        0.0
    };

    DashboardSummary {
        environment,
        total,
        passed,
        failed,
        blocked,
        not_tested,
        not_applicable,
        pass_rate,
        is_synthetic,
        last_updated: Utc::now(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
