//! Circuit breaker (C8) guarding the bulk mutation entry points.
//!
//! Three states — closed, open, half-open — exactly as described in
//! spec.md §4.8. Only bulk-path failures count against the breaker; the
//! non-bulk and fast-path mutation routes never touch it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub half_open_probes_remaining: u32,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probes_remaining: u32,
}

const HALF_OPEN_PROBE_BUDGET: u32 = 1;

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

/// Whether a call attempt is permitted right now, and what to do with the
/// outcome once the guarded call returns.
pub enum Admission {
    Pass,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probes_remaining: 0,
            }),
        }
    }

    /// Call before attempting a bulk operation. Returns `Rejected` if the
    /// breaker is open and the recovery timeout hasn't elapsed.
    pub fn admit(&self) -> Admission {
        let mut guard = self.inner.lock().unwrap();
        match guard.state {
            BreakerState::Closed => Admission::Pass,
            BreakerState::HalfOpen => {
                if guard.half_open_probes_remaining > 0 {
                    guard.half_open_probes_remaining -= 1;
                    Admission::Pass
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::Open => {
                let elapsed = guard.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= Duration::from_millis(self.config.recovery_timeout_ms) {
                    info!("breaker recovery timeout elapsed, moving to half-open");
                    guard.state = BreakerState::HalfOpen;
                    guard.half_open_probes_remaining = HALF_OPEN_PROBE_BUDGET - 1;
                    Admission::Pass
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.consecutive_failures = 0;
        if guard.state != BreakerState::Closed {
            info!("breaker closing after successful probe");
        }
        guard.state = BreakerState::Closed;
        guard.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.consecutive_failures += 1;
        if guard.state == BreakerState::HalfOpen || guard.consecutive_failures >= self.config.failure_threshold {
            warn!(failures = guard.consecutive_failures, "breaker opening");
            guard.state = BreakerState::Open;
            guard.opened_at = Some(Instant::now());
        }
    }

    pub fn stats(&self) -> BreakerStats {
        let guard = self.inner.lock().unwrap();
        BreakerStats {
            state: guard.state,
            consecutive_failures: guard.consecutive_failures,
            half_open_probes_remaining: guard.half_open_probes_remaining,
        }
    }
}
