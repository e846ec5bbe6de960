//! Per-tool circuit breaker.
//!
//! One [`CircuitBreaker`] guards all registered tools, holding an
//! independent [`CircuitState`] machine per tool name behind a
//! `parking_lot::RwLock`. Reads take the optimistic shared-lock path;
//! only a state transition takes the write lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures inside the failure window before the circuit opens.
    pub failure_threshold: u32,
    /// Window over which failures are counted; failures older than this are dropped.
    pub failure_window: Duration,
    /// Base backoff before the first half-open probe after opening.
    pub min_backoff: Duration,
    /// Ceiling for backoff after repeated re-opens.
    pub max_backoff: Duration,
    /// Multiplier applied to the backoff each time a half-open probe fails.
    pub backoff_factor: f64,
    /// Successes required in `HalfOpen` before returning to `Closed`.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            min_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
            backoff_factor: 2.0,
            success_threshold: 1,
        }
    }
}

#[derive(Debug, Clone)]
struct ToolCircuitState {
    state: CircuitState,
    failure_times: Vec<Instant>,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    current_backoff: Duration,
    open_count: u64,
}

impl ToolCircuitState {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_times: Vec::new(),
            half_open_successes: 0,
            opened_at: None,
            current_backoff: config.min_backoff,
            open_count: 0,
        }
    }

    fn prune_failures(&mut self, window: Duration, now: Instant) {
        self.failure_times
            .retain(|t| now.duration_since(*t) <= window);
    }
}

/// Diagnostic snapshot for a single tool's breaker, exposed via the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCircuitDiagnostics {
    pub tool: String,
    pub state: CircuitState,
    pub recent_failures: usize,
    pub open_count: u64,
}

/// Independent three-state circuit breaker per tool name.
///
/// State transitions:
/// - `Closed` -> `Open` when `failure_threshold` failures land inside
///   `failure_window`.
/// - `Open` -> `HalfOpen` lazily, the first time [`Self::is_available`] is
///   called after the current backoff has elapsed (no background timer).
/// - `HalfOpen` -> `Closed` after `success_threshold` consecutive
///   successes; `HalfOpen` -> `Open` on the first failure, with the backoff
///   multiplied by `backoff_factor` up to `max_backoff`.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    tools: RwLock<HashMap<String, ToolCircuitState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Returns whether a call to `tool` should be allowed right now.
    /// Performs the lazy `Open -> HalfOpen` transition as a side effect.
    pub fn is_available(&self, tool: &str) -> bool {
        {
            let read = self.tools.read();
            match read.get(tool) {
                None | Some(ToolCircuitState { state: CircuitState::Closed, .. }) => return true,
                Some(ToolCircuitState { state: CircuitState::HalfOpen, .. }) => return true,
                Some(entry) => {
                    let elapsed = entry.opened_at.map(|t| t.elapsed());
                    if elapsed.is_none_or(|e| e < entry.current_backoff) {
                        return false;
                    }
                }
            }
        }

        let mut write = self.tools.write();
        let entry = write
            .entry(tool.to_string())
            .or_insert_with(|| ToolCircuitState::new(&self.config));
        if entry.state != CircuitState::Open {
            return !matches!(entry.state, CircuitState::Open);
        }
        let elapsed = entry.opened_at.map(|t| t.elapsed()).unwrap_or_default();
        if elapsed >= entry.current_backoff {
            entry.state = CircuitState::HalfOpen;
            entry.half_open_successes = 0;
            true
        } else {
            false
        }
    }

    /// Records a successful call. In `HalfOpen`, counts toward closing the
    /// circuit; in `Closed`, clears the failure history.
    pub fn record_success(&self, tool: &str) {
        let mut write = self.tools.write();
        let entry = write
            .entry(tool.to_string())
            .or_insert_with(|| ToolCircuitState::new(&self.config));
        match entry.state {
            CircuitState::Closed => entry.failure_times.clear(),
            CircuitState::HalfOpen => {
                entry.half_open_successes += 1;
                if entry.half_open_successes >= self.config.success_threshold {
                    entry.state = CircuitState::Closed;
                    entry.failure_times.clear();
                    entry.current_backoff = self.config.min_backoff;
                    entry.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call. `is_argument_error` failures (malformed
    /// arguments, the caller's fault) never count toward the breaker.
    pub fn record_failure(&self, tool: &str, is_argument_error: bool) {
        if is_argument_error {
            return;
        }
        let now = Instant::now();
        let mut write = self.tools.write();
        let entry = write
            .entry(tool.to_string())
            .or_insert_with(|| ToolCircuitState::new(&self.config));

        match entry.state {
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.opened_at = Some(now);
                entry.open_count += 1;
                entry.current_backoff = Duration::from_secs_f64(
                    (entry.current_backoff.as_secs_f64() * self.config.backoff_factor)
                        .min(self.config.max_backoff.as_secs_f64()),
                );
                entry.failure_times.clear();
            }
            CircuitState::Closed => {
                entry.prune_failures(self.config.failure_window, now);
                entry.failure_times.push(now);
                if entry.failure_times.len() as u32 >= self.config.failure_threshold {
                    entry.state = CircuitState::Open;
                    entry.opened_at = Some(now);
                    entry.open_count += 1;
                    entry.current_backoff = self.config.min_backoff;
                    entry.failure_times.clear();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Forces `tool`'s breaker back to `Closed`, clearing its failure
    /// history and backoff. Used for an operator-triggered reset rather
    /// than any automatic transition.
    pub fn reset(&self, tool: &str) {
        let mut write = self.tools.write();
        let entry = write
            .entry(tool.to_string())
            .or_insert_with(|| ToolCircuitState::new(&self.config));
        entry.state = CircuitState::Closed;
        entry.failure_times.clear();
        entry.half_open_successes = 0;
        entry.opened_at = None;
        entry.current_backoff = self.config.min_backoff;
    }

    pub fn state_of(&self, tool: &str) -> CircuitState {
        self.tools
            .read()
            .get(tool)
            .map(|t| t.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn diagnostics(&self) -> Vec<ToolCircuitDiagnostics> {
        self.tools
            .read()
            .iter()
            .map(|(tool, state)| ToolCircuitDiagnostics {
                tool: tool.clone(),
                state: state.state,
                recent_failures: state.failure_times.len(),
                open_count: state.open_count,
            })
            .collect()
    }
}
