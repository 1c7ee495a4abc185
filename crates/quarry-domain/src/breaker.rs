//! Circuit breaker and the context-owned breaker registry
//!
//! # States
//!
//! | State | `can_request` | Leaves on |
//! |-------|---------------|-----------|
//! | Closed | true | `failure_threshold` consecutive failures → Open |
//! | Open | false until cooldown | cooldown elapsed → HalfOpen (lazily, on the next check) |
//! | HalfOpen | true once (the probe) | probe success → Closed, probe failure → Open |
//!
//! Breakers are process-local and never persisted; a restart starts every
//! breaker closed. The [`BreakerRegistry`] is built once at startup and handed to
//! whoever needs it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    /// Normal operation
    Closed,
    /// Failing fast
    Open,
    /// One probe allowed
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Breaker tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,

    /// How long the breaker stays open before allowing a probe (ms)
    pub cooldown_ms: u64,
}

impl BreakerConfig {
    /// Cooldown as Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    /// 5 failures, 30 second cooldown
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: BreakerState,
    /// Consecutive failures counted
    pub failure_count: u32,
    /// Time left before an open breaker allows a probe
    pub retry_after: Option<Duration>,
}

/// Thread-safe three-state circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Breaker state stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a request may proceed now
    pub fn can_request(&self) -> bool {
        self.can_request_at(Instant::now())
    }

    /// [`can_request`](Self::can_request) at an explicit instant
    pub fn can_request_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|opened| now.saturating_duration_since(opened) >= self.config.cooldown());
                if cooled {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// [`record_failure`](Self::record_failure) at an explicit instant
    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                }
            }
            BreakerState::HalfOpen | BreakerState::Open => {
                inner.state = BreakerState::Open;
                inner.failure_count = self.config.failure_threshold;
                inner.opened_at = Some(now);
                inner.probe_in_flight = false;
            }
        }
    }

    /// Whether new work may be accepted, without consuming the probe
    ///
    /// Only an open breaker still inside its cooldown refuses.
    pub fn is_accepting_work(&self) -> bool {
        self.is_accepting_work_at(Instant::now())
    }

    /// [`is_accepting_work`](Self::is_accepting_work) at an explicit instant
    pub fn is_accepting_work_at(&self, now: Instant) -> bool {
        self.retry_after_at(now).is_none()
    }

    /// Time until an open breaker allows a probe (None unless open and cooling down)
    pub fn retry_after_at(&self, now: Instant) -> Option<Duration> {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(opened)) => {
                let elapsed = now.saturating_duration_since(opened);
                let cooldown = self.config.cooldown();
                (elapsed < cooldown).then(|| cooldown - elapsed)
            }
            _ => None,
        }
    }

    /// Current state (no lazy transition)
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Consecutive failures counted
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Force the breaker closed
    pub fn reset(&self) {
        self.record_success();
    }

    /// Point-in-time view
    pub fn status_at(&self, now: Instant) -> BreakerStatus {
        let retry_after = self.retry_after_at(now);
        let inner = self.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            retry_after,
        }
    }
}

/// Named breakers, created on first use
///
/// Cloning the registry shares the same breakers.
#[derive(Debug, Clone, Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Arc<Mutex<BTreeMap<String, Arc<CircuitBreaker>>>>,
}

impl BreakerRegistry {
    /// Create an empty registry whose breakers use `config`
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Get (or create) the breaker called `name`
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config))),
        )
    }

    /// Status of every breaker created so far
    pub fn snapshot(&self) -> Vec<BreakerStatus> {
        let now = Instant::now();
        let breakers = self.breakers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        breakers.values().map(|b| b.status_at(now)).collect()
    }

    /// Force a breaker closed; returns false if it was never created
    pub fn reset(&self, name: &str) -> bool {
        let breakers = self.breakers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match breakers.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }
}
