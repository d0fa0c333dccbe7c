use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::results::ChallengeResultsStatus;

#[derive(Debug)]
pub struct Metrics {
    pub jobs_taken: AtomicU64,
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_errored: AtomicU64,
    pub nothing_left: AtomicU64,
    pub report_failures: AtomicU64,
    pub duration_sum_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs_taken: AtomicU64::new(0),
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_errored: AtomicU64::new(0),
            nothing_left: AtomicU64::new(0),
            report_failures: AtomicU64::new(0),
            duration_sum_ms: AtomicU64::new(0),
        })
    }

    pub fn job_taken(&self) {
        self.jobs_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_finished(&self, status: ChallengeResultsStatus, duration_ms: u64) {
        self.duration_sum_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        let counter = match status {
            ChallengeResultsStatus::Success => &self.jobs_succeeded,
            ChallengeResultsStatus::Failed => &self.jobs_failed,
            ChallengeResultsStatus::Error | ChallengeResultsStatus::Aborted => &self.jobs_errored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nothing_left(&self) {
        self.nothing_left.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_failed(&self) {
        self.report_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// One-line digest for the log.
    pub fn summary(&self) -> String {
        format!(
            "jobs={} success={} failed={} error={} idle_polls={} report_failures={} busy={}s",
            self.jobs_taken.load(Ordering::Relaxed),
            self.jobs_succeeded.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.jobs_errored.load(Ordering::Relaxed),
            self.nothing_left.load(Ordering::Relaxed),
            self.report_failures.load(Ordering::Relaxed),
            self.duration_sum_ms.load(Ordering::Relaxed) / 1000,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        let m = Metrics::new();
        m.job_taken();
        m.job_finished(ChallengeResultsStatus::Success, 5000);
        m.job_taken();
        m.job_finished(ChallengeResultsStatus::Aborted, 1000);
        assert_eq!(m.jobs_taken.load(Ordering::Relaxed), 2);
        assert_eq!(m.jobs_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(m.jobs_errored.load(Ordering::Relaxed), 1);
        assert_eq!(m.duration_sum_ms.load(Ordering::Relaxed), 6000);
    }

    #[test]
    fn test_summary() {
        let m = Metrics::new();
        m.nothing_left();
        m.nothing_left();
        m.report_failed();
        let s = m.summary();
        assert!(s.contains("jobs=0"));
        assert!(s.contains("idle_polls=2"));
        assert!(s.contains("report_failures=1"));
    }
}
