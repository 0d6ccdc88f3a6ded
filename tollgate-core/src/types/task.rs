//! Autonomy tasks: recurring schedulable work items mapped to premium
//! endpoints.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Endpoint;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Eligible when the next-eligible time has passed
    Idle,
    /// Currently locked by a scheduler tick
    Running,
    /// Waiting out an exponential backoff window
    Backoff,
}

/// One recurring schedulable work item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyTask {
    /// Endpoint tag; unique per task
    pub endpoint: Endpoint,
    /// Relative value of fresh data from this endpoint
    pub value_score: f64,
    /// Cost per run in whole currency units
    pub cost: f64,
    /// Interval after which the data is considered stale
    pub freshness_window_secs: u64,
    /// First backoff step on failure
    pub base_backoff_secs: u64,
    /// Status
    pub status: TaskStatus,
    /// Last attempt start
    pub last_run_at: Option<DateTime<Utc>>,
    /// Last successful completion
    pub last_success_at: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success
    pub failure_count: u32,
    /// Earliest next eligible instant
    pub next_eligible_at: DateTime<Utc>,
    /// Lock timestamp while RUNNING
    pub locked_at: Option<DateTime<Utc>>,
    /// Score computed when last chosen
    pub last_score: Option<f64>,
    /// Most recent error message
    pub last_error: Option<String>,
}

impl AutonomyTask {
    /// New idle task, immediately eligible.
    pub fn new(
        endpoint: Endpoint,
        value_score: f64,
        cost: f64,
        freshness_window_secs: u64,
        base_backoff_secs: u64,
    ) -> Self {
        Self {
            endpoint,
            value_score,
            cost,
            freshness_window_secs,
            base_backoff_secs,
            status: TaskStatus::Idle,
            last_run_at: None,
            last_success_at: None,
            failure_count: 0,
            next_eligible_at: Utc::now(),
            locked_at: None,
            last_score: None,
            last_error: None,
        }
    }

    /// Runnable iff not running, unlocked, and past the eligibility time.
    pub fn is_runnable_at(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Running
            && self.locked_at.is_none()
            && self.next_eligible_at <= now
    }

    /// Freshness-driven score. Staleness is measured since the last
    /// success, or twice the freshness window if the task never succeeded.
    /// Non-finite or non-positive inputs score zero.
    pub fn score_at(&self, now: DateTime<Utc>) -> f64 {
        if self.cost <= 0.0 || self.freshness_window_secs == 0 {
            return 0.0;
        }
        let freshness_secs = match self.last_success_at {
            Some(at) => (now - at).num_seconds().max(1) as f64,
            None => (self.freshness_window_secs * 2) as f64,
        };
        let score =
            (freshness_secs / self.freshness_window_secs as f64) * self.value_score / self.cost;
        if score.is_finite() {
            score
        } else {
            0.0
        }
    }

    /// Mark the task chosen for execution.
    pub fn begin_run(&mut self, now: DateTime<Utc>, score: f64) {
        self.status = TaskStatus::Running;
        self.locked_at = Some(now);
        self.last_run_at = Some(now);
        self.last_score = Some(score);
        self.last_error = None;
    }

    /// Successful run: reset failures, schedule the next pass one freshness
    /// window out.
    pub fn complete_success(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Idle;
        self.locked_at = None;
        self.last_success_at = Some(now);
        self.failure_count = 0;
        self.next_eligible_at = now + Duration::seconds(self.freshness_window_secs as i64);
        self.last_error = None;
    }

    /// Failed (or cancelled) run: exponential backoff, capped.
    pub fn complete_failure(
        &mut self,
        now: DateTime<Utc>,
        error: impl Into<String>,
        max_backoff_secs: u64,
    ) {
        self.status = TaskStatus::Backoff;
        self.locked_at = None;
        self.failure_count += 1;
        let exponent = self.failure_count.saturating_sub(1).min(32);
        let delay = self
            .base_backoff_secs
            .saturating_mul(1u64 << exponent)
            .min(max_backoff_secs);
        self.next_eligible_at = now + Duration::seconds(delay as i64);
        self.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> AutonomyTask {
        AutonomyTask::new(Endpoint::Market, 10.0, 0.05, 300, 30)
    }

    #[test]
    fn test_score_monotone_in_staleness() {
        let mut t = task();
        let now = Utc::now();
        t.last_success_at = Some(now - Duration::seconds(100));
        let early = t.score_at(now);
        let late = t.score_at(now + Duration::seconds(500));
        assert!(late >= early);
    }

    #[test]
    fn test_score_zero_on_bad_cost() {
        let mut t = task();
        t.cost = 0.0;
        assert_eq!(t.score_at(Utc::now()), 0.0);
        t.cost = -1.0;
        assert_eq!(t.score_at(Utc::now()), 0.0);
    }

    #[test]
    fn test_never_succeeded_uses_double_window() {
        let t = task();
        let now = Utc::now();
        // freshness = 600, window = 300 -> ratio 2.0, score = 2 * 10 / 0.05
        assert!((t.score_at(now) - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_backoff_progression_and_cap() {
        let mut t = task();
        let now = Utc::now();
        let mut deltas = Vec::new();
        for _ in 0..6 {
            t.complete_failure(now, "boom", 900);
            deltas.push((t.next_eligible_at - now).num_seconds());
        }
        assert_eq!(deltas, vec![30, 60, 120, 240, 480, 900]);
        assert_eq!(t.failure_count, 6);
    }

    #[test]
    fn test_success_resets_failures() {
        let mut t = task();
        let now = Utc::now();
        t.complete_failure(now, "boom", 900);
        t.complete_failure(now, "boom", 900);
        t.complete_success(now);
        assert_eq!(t.failure_count, 0);
        assert_eq!((t.next_eligible_at - now).num_seconds(), 300);
        assert!(t.last_error.is_none());
    }

    #[test]
    fn test_runnable_gating() {
        let mut t = task();
        let now = Utc::now();
        assert!(t.is_runnable_at(now));
        t.begin_run(now, 1.0);
        assert!(!t.is_runnable_at(now));
    }
}
