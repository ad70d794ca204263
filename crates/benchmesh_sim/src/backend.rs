//! Scripted execution backend.
//!
//! Records every call, fails the operations a test asks it to, and can hold
//! `start` calls open until released or aborted, which is how tests observe
//! pause, resume, and abort against a run in progress.

use benchmesh_core::JobId;
use benchmesh_runtime::{
    BackendError, BenchmarkDefinition, BenchmarkStartResponse, BenchmarkState, BenchmarkStatus,
    ExecutionBackend,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Backend operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// `create`
    Create,
    /// `start`
    Start,
    /// `pause`
    Pause,
    /// `resume`
    Resume,
    /// `abort`
    Abort,
    /// `status`
    Status,
}

/// A call received by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `create`
    Create(JobId),
    /// `start`
    Start(JobId),
    /// `pause`
    Pause(JobId),
    /// `resume`
    Resume(JobId),
    /// `abort`
    Abort(JobId),
    /// `status`
    Status(JobId),
    /// `clear`
    Clear(JobId),
}

impl BackendCall {
    /// Benchmark the call targeted
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Create(id)
            | Self::Start(id)
            | Self::Pause(id)
            | Self::Resume(id)
            | Self::Abort(id)
            | Self::Status(id)
            | Self::Clear(id) => id,
        }
    }
}

#[derive(Debug)]
struct Workload {
    definition: BenchmarkDefinition,
    state: BenchmarkState,
    iterations: u64,
}

#[derive(Debug, Default)]
struct Script {
    failures: HashSet<BackendOp>,
    start_state: Option<BenchmarkState>,
    status_error: Option<String>,
}

#[derive(Debug, Default)]
struct Gate {
    held: bool,
    started: HashSet<JobId>,
    aborted: HashSet<JobId>,
}

/// In-memory backend driven by a script
#[derive(Debug, Default)]
pub struct SimBackend {
    calls: Mutex<Vec<BackendCall>>,
    workloads: Mutex<HashMap<JobId, Workload>>,
    script: Mutex<Script>,
    gate: Mutex<Gate>,
    signal: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimBackend {
    /// Create a backend where every operation succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an operation fail until [`SimBackend::succeed`] is called
    pub fn fail(&self, op: BackendOp) {
        lock(&self.script).failures.insert(op);
    }

    /// Make an operation succeed again
    pub fn succeed(&self, op: BackendOp) {
        lock(&self.script).failures.remove(&op);
    }

    /// State successful runs finish in (completed by default)
    pub fn set_start_state(&self, state: BenchmarkState) {
        lock(&self.script).start_state = Some(state);
    }

    /// Report an internal error on every status query
    pub fn set_status_error(&self, error: impl Into<String>) {
        lock(&self.script).status_error = Some(error.into());
    }

    /// Keep `start` calls open until released or aborted
    pub fn hold_starts(&self) {
        lock(&self.gate).held = true;
    }

    /// Let held `start` calls finish
    pub fn release_starts(&self) {
        lock(&self.gate).held = false;
        self.signal.notify_all();
    }

    /// Wait until `start` is running for a benchmark
    ///
    /// Returns `false` on timeout.
    pub fn wait_started(&self, job_id: &JobId, timeout: Duration) -> bool {
        let gate = lock(&self.gate);
        let (gate, _) = self
            .signal
            .wait_timeout_while(gate, timeout, |g| !g.started.contains(job_id))
            .unwrap_or_else(PoisonError::into_inner);
        gate.started.contains(job_id)
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }

    /// Whether a workload exists for a benchmark
    #[must_use]
    pub fn has_workload(&self, job_id: &JobId) -> bool {
        lock(&self.workloads).contains_key(job_id)
    }

    /// Current backend state of a workload
    #[must_use]
    pub fn workload_state(&self, job_id: &JobId) -> Option<BenchmarkState> {
        lock(&self.workloads).get(job_id).map(|w| w.state)
    }

    fn record(&self, call: BackendCall) {
        lock(&self.calls).push(call);
    }

    fn check(&self, op: BackendOp, job_id: &JobId) -> Result<(), BackendError> {
        if lock(&self.script).failures.contains(&op) {
            return Err(BackendError::ExecutionFailed(format!(
                "scripted {op:?} failure for {job_id}"
            )));
        }
        Ok(())
    }

    fn transition(
        &self,
        job_id: &JobId,
        from: BenchmarkState,
        to: BenchmarkState,
    ) -> Result<(), BackendError> {
        let mut workloads = lock(&self.workloads);
        let workload = workloads
            .get_mut(job_id)
            .ok_or_else(|| BackendError::UnknownBenchmark(job_id.clone()))?;
        if workload.state != from {
            return Err(BackendError::InvalidTransition {
                job_id: job_id.clone(),
                reason: format!("{:?} is not {:?}", workload.state, from),
            });
        }
        workload.state = to;
        Ok(())
    }

    fn response(&self, job_id: &JobId) -> Result<BenchmarkStartResponse, BackendError> {
        let workloads = lock(&self.workloads);
        let workload = workloads
            .get(job_id)
            .ok_or_else(|| BackendError::UnknownBenchmark(job_id.clone()))?;
        let mut response = BenchmarkStartResponse::new(job_id.clone(), workload.state)
            .with_iterations(workload.iterations);
        if workload.iterations > 0 {
            let ops = workload.iterations * workload.definition.concurrency as u64;
            response = response.with_metric("ops", ops as f64);
        }
        Ok(response)
    }
}

impl ExecutionBackend for SimBackend {
    fn create(&self, definition: &BenchmarkDefinition) -> Result<(), BackendError> {
        self.record(BackendCall::Create(definition.job_id.clone()));
        self.check(BackendOp::Create, &definition.job_id)
            .map_err(|e| BackendError::CreateFailed(e.to_string()))?;
        lock(&self.workloads).insert(
            definition.job_id.clone(),
            Workload {
                definition: definition.clone(),
                state: BenchmarkState::Initializing,
                iterations: 0,
            },
        );
        Ok(())
    }

    fn start(&self, definition: &BenchmarkDefinition) -> Result<BenchmarkStartResponse, BackendError> {
        let job_id = &definition.job_id;
        self.record(BackendCall::Start(job_id.clone()));
        self.check(BackendOp::Start, job_id)?;
        self.transition(job_id, BenchmarkState::Initializing, BenchmarkState::Running)?;

        let aborted = {
            let mut gate = lock(&self.gate);
            gate.started.insert(job_id.clone());
            self.signal.notify_all();
            let gate = self
                .signal
                .wait_while(gate, |g| g.held && !g.aborted.contains(job_id))
                .unwrap_or_else(PoisonError::into_inner);
            gate.aborted.contains(job_id)
        };

        let final_state = if aborted {
            BenchmarkState::Aborted
        } else {
            lock(&self.script).start_state.unwrap_or(BenchmarkState::Completed)
        };
        if let Some(workload) = lock(&self.workloads).get_mut(job_id) {
            workload.state = final_state;
            if !aborted {
                workload.iterations = workload.definition.iterations;
            }
        }
        self.response(job_id)
    }

    fn pause(&self, job_id: &JobId) -> Result<(), BackendError> {
        self.record(BackendCall::Pause(job_id.clone()));
        self.check(BackendOp::Pause, job_id)?;
        self.transition(job_id, BenchmarkState::Running, BenchmarkState::Paused)
    }

    fn resume(&self, job_id: &JobId) -> Result<(), BackendError> {
        self.record(BackendCall::Resume(job_id.clone()));
        self.check(BackendOp::Resume, job_id)?;
        self.transition(job_id, BenchmarkState::Paused, BenchmarkState::Running)
    }

    fn abort(&self, job_id: &JobId) -> Result<(), BackendError> {
        self.record(BackendCall::Abort(job_id.clone()));
        self.check(BackendOp::Abort, job_id)?;
        lock(&self.gate).aborted.insert(job_id.clone());
        self.signal.notify_all();
        if let Some(workload) = lock(&self.workloads).get_mut(job_id) {
            workload.state = BenchmarkState::Aborted;
        }
        Ok(())
    }

    fn status(&self, job_id: &JobId) -> Result<BenchmarkStatus, BackendError> {
        self.record(BackendCall::Status(job_id.clone()));
        self.check(BackendOp::Status, job_id)?;
        let status = BenchmarkStatus::new(self.response(job_id)?);
        Ok(match lock(&self.script).status_error.clone() {
            Some(error) => status.with_error(error),
            None => status,
        })
    }

    fn clear(&self, job_id: &JobId) {
        self.record(BackendCall::Clear(job_id.clone()));
        lock(&self.workloads).remove(job_id);
        let mut gate = lock(&self.gate);
        gate.started.remove(job_id);
        gate.aborted.remove(job_id);
    }
}
