//! Re-entrancy guard: at most one run per orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

use crate::run::{PipelineRun, RunStatus};

#[derive(Debug, Clone, Default)]
pub(crate) struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub(crate) fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Take the guard, or `None` if a run is already in flight.
    pub(crate) fn try_acquire(&self, progress: watch::Sender<PipelineRun>) -> Option<RunToken> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken {
                running: Arc::clone(&self.running),
                progress,
            })
    }
}

/// Held for the duration of one run; dropping it releases the guard.
///
/// If the run future is dropped mid-stage the published run is moved back to
/// `Idle`, keeping whatever stage outputs had completed.
pub(crate) struct RunToken {
    running: Arc<AtomicBool>,
    progress: watch::Sender<PipelineRun>,
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.progress.send_if_modified(|run| {
            if run.status.is_running() {
                debug!(status = %run.status.label(), "Run dropped before finishing");
                run.status = RunStatus::Idle;
                true
            } else {
                false
            }
        });
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compforge_utils::types::ProviderId;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let (tx, _rx) = watch::channel(PipelineRun::default());
        let guard = RunGuard::default();

        let token = guard.try_acquire(tx.clone()).unwrap();
        assert!(guard.is_held());
        assert!(guard.try_acquire(tx.clone()).is_none());

        drop(token);
        assert!(!guard.is_held());
        assert!(guard.try_acquire(tx).is_some());
    }

    #[test]
    fn test_drop_mid_run_resets_running_status() {
        let (tx, rx) = watch::channel(PipelineRun::default());
        let guard = RunGuard::default();
        let token = guard.try_acquire(tx.clone()).unwrap();

        tx.send_modify(|run| {
            *run = PipelineRun::new("gauge", ProviderId::Gemini);
            run.status = RunStatus::RunningStage2;
        });
        drop(token);

        assert_eq!(rx.borrow().status, RunStatus::Idle);
        assert_eq!(rx.borrow().input, "gauge");
    }
}
