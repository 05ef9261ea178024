use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{DashboardSummary, Environment};
use crate::store::TestStore;

pub type SharedState = Arc<EngineState>;

/// One in-flight execution. Holding the watch sender is what lets the
/// cancel endpoint and the engine's own deadline share a kill path.
/// `result_id` is None for the instant between claiming the slot and the
/// Running row existing.
pub struct RunningExecution {
    pub result_id: Option<i64>,
    pub cancel_tx: watch::Sender<bool>,
}

/// Cached rollup for one environment. The generation counter is bumped on
/// every invalidation, so a summary computed before an invalidation can
/// never be cached after it.
#[derive(Default)]
struct SummarySlot {
    generation: u64,
    summary: Option<DashboardSummary>,
}

pub struct EngineState {
    pub config: EngineConfig,
    pub store: Arc<TestStore>,
    /// Per-case concurrency guard: at most one Running execution per case.
    executions: Mutex<HashMap<i64, RunningExecution>>,
    /// Cached per-environment rollups, invalidated on status changes.
    summaries: Mutex<HashMap<Environment, SummarySlot>>,
}

impl EngineState {
    pub fn new(config: EngineConfig, store: TestStore) -> Self {
        Self {
            config,
            store: Arc::new(store),
            executions: Mutex::new(HashMap::new()),
            summaries: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the execution slot for a case. Fails with
    /// `ExecutionAlreadyInProgress` while a previous claim is still held.
    pub fn claim_execution(
        &self,
        case_id: i64,
        cancel_tx: watch::Sender<bool>,
    ) -> Result<(), EngineError> {
        let mut executions = self.executions.lock().unwrap();
        if executions.contains_key(&case_id) {
            return Err(EngineError::ExecutionAlreadyInProgress(case_id));
        }
        executions.insert(
            case_id,
            RunningExecution {
                result_id: None,
                cancel_tx,
            },
        );
        Ok(())
    }

    /// Fill in the result row id once the Running row exists. The slot is
    /// claimed before the row is inserted so two callers can never both
    /// create rows for the same case.
    pub fn set_result_id(&self, case_id: i64, result_id: i64) {
        if let Some(running) = self.executions.lock().unwrap().get_mut(&case_id) {
            running.result_id = Some(result_id);
        }
    }

    pub fn release_execution(&self, case_id: i64) {
        self.executions.lock().unwrap().remove(&case_id);
    }

    pub fn is_executing(&self, case_id: i64) -> bool {
        self.executions.lock().unwrap().contains_key(&case_id)
    }

    pub fn running_count(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    /// Signal cancellation of the case's in-flight execution. Returns the
    /// running result id so callers can report what was cancelled; None if
    /// the Running row has not been assigned yet.
    pub fn cancel_execution(&self, case_id: i64) -> Result<Option<i64>, EngineError> {
        let executions = self.executions.lock().unwrap();
        match executions.get(&case_id) {
            Some(running) => {
                let _ = running.cancel_tx.send(true);
                Ok(running.result_id)
            }
            None => Err(EngineError::NoSuchExecution(case_id)),
        }
    }

    pub fn cached_summary(&self, environment: Environment) -> Option<DashboardSummary> {
        self.summaries
            .lock()
            .unwrap()
            .get(&environment)
            .and_then(|slot| slot.summary.clone())
    }

    /// Generation to pass back to [`cache_summary`]. Read it before loading
    /// the data the summary is computed from.
    pub fn summary_generation(&self, environment: Environment) -> u64 {
        self.summaries
            .lock()
            .unwrap()
            .get(&environment)
            .map(|slot| slot.generation)
            .unwrap_or(0)
    }

    /// Store a computed summary, unless the environment was invalidated
    /// after `generation` was read; a stale write is dropped.
    pub fn cache_summary(&self, summary: DashboardSummary, generation: u64) {
        let mut summaries = self.summaries.lock().unwrap();
        let slot = summaries.entry(summary.environment).or_default();
        if slot.generation == generation {
            slot.summary = Some(summary);
        }
    }

    pub fn invalidate_summary(&self, environment: Environment) {
        let mut summaries = self.summaries.lock().unwrap();
        let slot = summaries.entry(environment).or_default();
        slot.generation += 1;
        slot.summary = None;
    }
}
