//! Central metrics registry. Each category lives behind its own mutex so
//! a hot path (e.g. tool calls) never contends with an unrelated one
//! (e.g. recovery passes) for a lock.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Default)]
struct WorkflowMetrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_incomplete: AtomicU64,
    total_iterations: AtomicU64,
}

#[derive(Debug, Default)]
struct ToolMetrics {
    calls: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    circuit_opens: AtomicU64,
}

#[derive(Debug, Default)]
struct DelegationMetrics {
    direct: AtomicU64,
    decomposed: AtomicU64,
    subtasks_dispatched: AtomicU64,
    verification_failures: AtomicU64,
}

#[derive(Debug, Default)]
struct RecoveryMetrics {
    passes_run: AtomicU64,
    threads_recovered: AtomicU64,
    threads_exhausted: AtomicU64,
}

#[derive(Debug, Serialize, Default)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_incomplete: u64,
    pub total_iterations: u64,
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub tool_timeouts: u64,
    pub circuit_opens: u64,
    pub delegation_direct: u64,
    pub delegation_decomposed: u64,
    pub subtasks_dispatched: u64,
    pub verification_failures: u64,
    pub recovery_passes_run: u64,
    pub threads_recovered: u64,
    pub threads_exhausted: u64,
}

/// Aggregates counters across the orchestrator. Cheap to clone (it's
/// wrapped in an `Arc` by callers); every increment is a relaxed atomic
/// add, never a lock, except for the export path which just reads.
#[derive(Default)]
pub struct MetricsCollector {
    workflow: WorkflowMetrics,
    tools: ToolMetrics,
    delegation: DelegationMetrics,
    recovery: RecoveryMetrics,
    export_lock: Mutex<()>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run_started(&self) {
        self.workflow.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self, iterations: u32) {
        self.workflow.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.workflow
            .total_iterations
            .fetch_add(iterations as u64, Ordering::Relaxed);
    }

    pub fn record_run_incomplete(&self, iterations: u32) {
        self.workflow.runs_incomplete.fetch_add(1, Ordering::Relaxed);
        self.workflow
            .total_iterations
            .fetch_add(iterations as u64, Ordering::Relaxed);
    }

    pub fn record_tool_call(&self) {
        self.tools.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_failure(&self) {
        self.tools.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_timeout(&self) {
        self.tools.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_open(&self) {
        self.tools.circuit_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delegation_direct(&self) {
        self.delegation.direct.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delegation_decomposed(&self, subtasks: usize) {
        self.delegation.decomposed.fetch_add(1, Ordering::Relaxed);
        self.delegation
            .subtasks_dispatched
            .fetch_add(subtasks as u64, Ordering::Relaxed);
    }

    pub fn record_verification_failure(&self) {
        self.delegation
            .verification_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery_pass(&self, recovered: usize, exhausted: usize) {
        self.recovery.passes_run.fetch_add(1, Ordering::Relaxed);
        self.recovery
            .threads_recovered
            .fetch_add(recovered as u64, Ordering::Relaxed);
        self.recovery
            .threads_exhausted
            .fetch_add(exhausted as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let _guard = self.export_lock.lock().unwrap();
        MetricsSnapshot {
            runs_started: self.workflow.runs_started.load(Ordering::Relaxed),
            runs_completed: self.workflow.runs_completed.load(Ordering::Relaxed),
            runs_incomplete: self.workflow.runs_incomplete.load(Ordering::Relaxed),
            total_iterations: self.workflow.total_iterations.load(Ordering::Relaxed),
            tool_calls: self.tools.calls.load(Ordering::Relaxed),
            tool_failures: self.tools.failures.load(Ordering::Relaxed),
            tool_timeouts: self.tools.timeouts.load(Ordering::Relaxed),
            circuit_opens: self.tools.circuit_opens.load(Ordering::Relaxed),
            delegation_direct: self.delegation.direct.load(Ordering::Relaxed),
            delegation_decomposed: self.delegation.decomposed.load(Ordering::Relaxed),
            subtasks_dispatched: self.delegation.subtasks_dispatched.load(Ordering::Relaxed),
            verification_failures: self.delegation.verification_failures.load(Ordering::Relaxed),
            recovery_passes_run: self.recovery.passes_run.load(Ordering::Relaxed),
            threads_recovered: self.recovery.threads_recovered.load(Ordering::Relaxed),
            threads_exhausted: self.recovery.threads_exhausted.load(Ordering::Relaxed),
        }
    }

    pub fn export_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    pub fn export_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();
        macro_rules! gauge {
            ($name:literal, $value:expr) => {
                let _ = writeln!(out, "# TYPE {} counter", $name);
                let _ = writeln!(out, "{} {}", $name, $value);
            };
        }
        gauge!("orchestrator_runs_started_total", snapshot.runs_started);
        gauge!("orchestrator_runs_completed_total", snapshot.runs_completed);
        gauge!("orchestrator_runs_incomplete_total", snapshot.runs_incomplete);
        gauge!("orchestrator_iterations_total", snapshot.total_iterations);
        gauge!("orchestrator_tool_calls_total", snapshot.tool_calls);
        gauge!("orchestrator_tool_failures_total", snapshot.tool_failures);
        gauge!("orchestrator_tool_timeouts_total", snapshot.tool_timeouts);
        gauge!("orchestrator_circuit_opens_total", snapshot.circuit_opens);
        gauge!("orchestrator_delegation_direct_total", snapshot.delegation_direct);
        gauge!(
            "orchestrator_delegation_decomposed_total",
            snapshot.delegation_decomposed
        );
        gauge!(
            "orchestrator_subtasks_dispatched_total",
            snapshot.subtasks_dispatched
        );
        gauge!(
            "orchestrator_verification_failures_total",
            snapshot.verification_failures
        );
        gauge!("orchestrator_recovery_passes_total", snapshot.recovery_passes_run);
        gauge!(
            "orchestrator_threads_recovered_total",
            snapshot.threads_recovered
        );
        gauge!(
            "orchestrator_threads_exhausted_total",
            snapshot.threads_exhausted
        );
        out
    }
}
