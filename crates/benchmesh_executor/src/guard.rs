//! Per-benchmark execution guard.
//!
//! Cluster events can arrive twice, late, or for a phase this node already
//! handled. Every transition here is a compare-and-set under one lock, so
//! acting on a stale event is a no-op instead of a duplicate backend call.

use benchmesh_core::JobId;
use benchmesh_runtime::{BenchmarkDefinition, BenchmarkStartResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    request: Option<BenchmarkDefinition>,
    response: Option<BenchmarkStartResponse>,
    running: bool,
    paused: bool,
}

/// Local execution state of one benchmark on this node
///
/// Instances are created and dropped only by the
/// [`LocalJobRegistry`](crate::registry::LocalJobRegistry).
#[derive(Debug)]
pub struct InternalExecutorState {
    job_id: JobId,
    inner: Mutex<Inner>,
    // Written only while `inner` is held; never reset once set.
    complete: AtomicBool,
}

impl InternalExecutorState {
    pub(crate) fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            inner: Mutex::new(Inner::default()),
            complete: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Benchmark this state belongs to
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Claim the right to start execution
    ///
    /// Succeeds at most once until the run stops or is aborted.
    pub fn can_start_execution(&self) -> bool {
        let mut inner = self.lock();
        if !inner.running && !self.is_complete() {
            inner.running = true;
            return true;
        }
        false
    }

    /// Mark a running benchmark as finished
    pub fn stop_execution(&self) {
        let mut inner = self.lock();
        if inner.running {
            inner.running = false;
            inner.paused = false;
            self.complete.store(true, Ordering::Release);
        }
    }

    /// Record that the backend paused a running benchmark
    pub fn pause_execution(&self) {
        let mut inner = self.lock();
        if inner.running && !inner.paused && !self.is_complete() {
            inner.paused = true;
        }
    }

    /// Claim the right to resume a paused benchmark
    pub fn can_resume_execution(&self) -> bool {
        let mut inner = self.lock();
        if inner.paused && inner.running && !self.is_complete() {
            inner.paused = false;
            return true;
        }
        false
    }

    /// Claim the right to abort a running benchmark
    ///
    /// Does not mark the benchmark complete.
    pub fn can_abort_execution(&self) -> bool {
        let mut inner = self.lock();
        if inner.running {
            inner.running = false;
            inner.paused = false;
            return true;
        }
        false
    }

    /// Whether the run finished normally
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Whether execution is in progress
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Whether execution is paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Store the definition fetched from the master
    pub fn set_request(&self, definition: BenchmarkDefinition) {
        self.lock().request = Some(definition);
    }

    /// Definition fetched from the master
    #[must_use]
    pub fn request(&self) -> Option<BenchmarkDefinition> {
        self.lock().request.clone()
    }

    /// Store the final response of the run
    pub fn set_response(&self, response: BenchmarkStartResponse) {
        self.lock().response = Some(response);
    }

    /// Final response of the run
    #[must_use]
    pub fn response(&self) -> Option<BenchmarkStartResponse> {
        self.lock().response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchmesh_runtime::BenchmarkState;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn guard() -> InternalExecutorState {
        InternalExecutorState::new(JobId::from("b1"))
    }

    #[test]
    fn test_start_once() {
        let ies = guard();
        assert!(ies.can_start_execution());
        assert!(!ies.can_start_execution());
        assert!(ies.is_running());
    }

    #[test]
    fn test_stop_completes() {
        let ies = guard();
        ies.stop_execution();
        assert!(!ies.is_complete(), "stop without start is a no-op");

        assert!(ies.can_start_execution());
        ies.stop_execution();
        assert!(ies.is_complete());
        assert!(!ies.is_running());
        assert!(!ies.can_start_execution(), "completed runs never restart");
    }

    #[test]
    fn test_pause_requires_running() {
        let ies = guard();
        ies.pause_execution();
        assert!(!ies.is_paused());

        assert!(ies.can_start_execution());
        ies.pause_execution();
        assert!(ies.is_paused());
    }

    #[test]
    fn test_resume_requires_pause() {
        let ies = guard();
        assert!(ies.can_start_execution());
        assert!(!ies.can_resume_execution());

        ies.pause_execution();
        assert!(ies.can_resume_execution());
        assert!(!ies.is_paused());
        assert!(!ies.can_resume_execution());
    }

    #[test]
    fn test_abort_does_not_complete() {
        let ies = guard();
        assert!(!ies.can_abort_execution());

        assert!(ies.can_start_execution());
        ies.pause_execution();
        assert!(ies.can_abort_execution());
        assert!(!ies.is_complete());
        assert!(!ies.is_running());
        assert!(!ies.is_paused());
        assert!(!ies.can_abort_execution());
    }

    #[test]
    fn test_stop_after_abort_keeps_incomplete() {
        let ies = guard();
        assert!(ies.can_start_execution());
        assert!(ies.can_abort_execution());
        ies.stop_execution();
        assert!(!ies.is_complete());
    }

    #[test]
    fn test_request_and_response() {
        let ies = guard();
        assert!(ies.request().is_none());
        ies.set_request(BenchmarkDefinition::new(JobId::from("b1")).with_iterations(3));
        assert_eq!(ies.request().map(|d| d.iterations), Some(3));

        let response = BenchmarkStartResponse::new(JobId::from("b1"), BenchmarkState::Completed);
        ies.set_response(response.clone());
        assert_eq!(ies.response(), Some(response));
    }

    #[test]
    fn test_concurrent_start_claims_once() {
        let ies = Arc::new(guard());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ies = Arc::clone(&ies);
                std::thread::spawn(move || ies.can_start_execution())
            })
            .collect();
        let wins = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Start,
        Stop,
        Pause,
        Resume,
        Abort,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Stop),
            Just(Op::Pause),
            Just(Op::Resume),
            Just(Op::Abort),
        ]
    }

    proptest! {
        #[test]
        fn prop_invariants_hold(ops in proptest::collection::vec(op(), 0..64)) {
            let ies = guard();
            let mut was_complete = false;
            let mut outstanding_start = false;
            let mut paused_since_start = false;

            for op in ops {
                match op {
                    Op::Start => {
                        let won = ies.can_start_execution();
                        if won {
                            prop_assert!(!outstanding_start, "two starts without a stop or abort");
                            outstanding_start = true;
                            paused_since_start = false;
                        }
                    }
                    Op::Stop => {
                        ies.stop_execution();
                        outstanding_start = false;
                    }
                    Op::Pause => {
                        ies.pause_execution();
                        if ies.is_paused() {
                            paused_since_start = true;
                        }
                    }
                    Op::Resume => {
                        if ies.can_resume_execution() {
                            prop_assert!(paused_since_start, "resume without a preceding pause");
                            paused_since_start = false;
                        }
                    }
                    Op::Abort => {
                        if ies.can_abort_execution() {
                            outstanding_start = false;
                        }
                    }
                }

                prop_assert!(!(ies.is_running() && ies.is_complete()));
                prop_assert!(!ies.is_paused() || ies.is_running());
                prop_assert!(!was_complete || ies.is_complete(), "completion is monotonic");
                was_complete = ies.is_complete();
            }
        }
    }
}
