//! Execution counters of a [`SupervisionEngine`](crate::SupervisionEngine).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::process::ProcessState;

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Executions requested (including ones that failed to spawn).
    pub total_executions: u64,
    /// Executions that ended `Completed`.
    pub successful: u64,
    /// Executions that ended `Failed`.
    pub failed: u64,
    /// Executions that ended `Terminated`.
    pub terminated: u64,
    /// Executions currently registered as running.
    pub active: usize,
}

impl EngineStats {
    /// Share of finished executions that completed successfully (0.0 when none finished).
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful + self.failed + self.terminated;
        if finished == 0 {
            0.0
        } else {
            self.successful as f64 / finished as f64
        }
    }
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    terminated: AtomicU64,
    active: AtomicUsize,
}

impl StatsCounters {
    pub(crate) fn requested(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stopped(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn finished(&self, state: ProcessState) {
        let counter = match state {
            ProcessState::Completed => &self.successful,
            ProcessState::Failed => &self.failed,
            ProcessState::Terminated => &self.terminated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        EngineStats {
            total_executions: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_rate() {
        let c = StatsCounters::default();
        assert_eq!(c.snapshot().success_rate(), 0.0);

        for state in [
            ProcessState::Completed,
            ProcessState::Completed,
            ProcessState::Failed,
            ProcessState::Terminated,
        ] {
            c.requested();
            c.started();
            c.finished(state);
            c.stopped();
        }

        let s = c.snapshot();
        assert_eq!(s.total_executions, 4);
        assert_eq!(s.successful, 2);
        assert_eq!(s.active, 0);
        assert!((s.success_rate() - 0.5).abs() < f64::EPSILON);
    }
}
