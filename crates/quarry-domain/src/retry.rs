//! Retry policy shared by every retryable job family
//!
//! The delay before attempt `n + 1` is `base * 2^n`, capped at a ceiling. The
//! same two functions gate extraction, secondary analysis and summary generation;
//! families only differ in their base delay and attempt budget.
//!
//! | attempt_count | delay (base 30s, ceiling 1h) |
//! |---------------|------------------------------|
//! | 0             | 30s                          |
//! | 1             | 60s                          |
//! | 2             | 120s                         |
//! | 6             | 32m                          |
//! | 7+            | 1h (ceiling)                 |

use crate::QuarryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default ceiling for any computed backoff (1 hour)
pub const DEFAULT_MAX_DELAY_MS: u64 = 60 * 60 * 1000;

/// Backoff before the attempt following `attempt_count` failures
///
/// Saturates instead of overflowing and never exceeds `ceiling`.
///
/// # Examples
///
/// ```
/// use quarry_domain::retry::next_delay;
/// use std::time::Duration;
///
/// let base = Duration::from_secs(30);
/// let ceiling = Duration::from_secs(3600);
/// assert_eq!(next_delay(0, base, ceiling), Duration::from_secs(30));
/// assert_eq!(next_delay(2, base, ceiling), Duration::from_secs(120));
/// assert_eq!(next_delay(40, base, ceiling), ceiling);
/// ```
pub fn next_delay(attempt_count: u32, base_delay: Duration, ceiling: Duration) -> Duration {
    let multiplier = 1u32.checked_shl(attempt_count).unwrap_or(u32::MAX);
    base_delay
        .checked_mul(multiplier)
        .map_or(ceiling, |delay| delay.min(ceiling))
}

/// Check whether another attempt may start now
///
/// Returns the backoff that applied (informational) or the refusal:
/// [`QuarryError::RetryExhausted`] when the budget is used up,
/// [`QuarryError::RetryBackoffNotElapsed`] when the last attempt is too recent.
pub fn assert_retry_allowed(
    attempt_count: u32,
    max_attempts: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    base_delay: Duration,
    ceiling: Duration,
    now: DateTime<Utc>,
) -> Result<Duration, QuarryError> {
    if attempt_count >= max_attempts {
        return Err(QuarryError::RetryExhausted {
            attempts: attempt_count,
            max_attempts,
        });
    }

    let delay = next_delay(attempt_count, base_delay, ceiling);

    if let Some(last) = last_attempt_at {
        // A last attempt in the future (clock skew) counts as zero elapsed
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < delay {
            return Err(QuarryError::RetryBackoffNotElapsed {
                delay,
                remaining: delay - elapsed,
            });
        }
    }

    Ok(delay)
}

/// Job families that share the retry machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    /// Document field extraction
    Extraction,
    /// Secondary analysis over extracted text
    Analysis,
    /// Case summary generation
    Summary,
}

impl JobFamily {
    /// Every family
    pub const ALL: [JobFamily; 3] = [JobFamily::Extraction, JobFamily::Analysis, JobFamily::Summary];

    /// Name used for the family's breaker and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            JobFamily::Extraction => "extraction",
            JobFamily::Analysis => "analysis",
            JobFamily::Summary => "summary",
        }
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extraction" => Ok(JobFamily::Extraction),
            "analysis" => Ok(JobFamily::Analysis),
            "summary" => Ok(JobFamily::Summary),
            _ => Err(format!("Invalid job family: {}", s)),
        }
    }
}

/// Per-family retry parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Base backoff in milliseconds
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempt budget for new jobs
    pub max_attempts: u32,
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl RetryPolicy {
    /// Default policy of a family
    ///
    /// - Extraction: 30s base, 5 attempts
    /// - Analysis: 60s base, 3 attempts
    /// - Summary: 60s base, 3 attempts
    pub fn for_family(family: JobFamily) -> Self {
        let (base_delay_ms, max_attempts) = match family {
            JobFamily::Extraction => (30_000, 5),
            JobFamily::Analysis => (60_000, 3),
            JobFamily::Summary => (60_000, 3),
        };
        Self {
            base_delay_ms,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts,
        }
    }

    /// Base delay as Duration
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Ceiling as Duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// [`next_delay`] with this policy's parameters
    pub fn next_delay(&self, attempt_count: u32) -> Duration {
        next_delay(attempt_count, self.base_delay(), self.max_delay())
    }

    /// [`assert_retry_allowed`] with this policy's parameters
    pub fn assert_retry_allowed(
        &self,
        attempt_count: u32,
        max_attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Duration, QuarryError> {
        assert_retry_allowed(
            attempt_count,
            max_attempts,
            last_attempt_at,
            self.base_delay(),
            self.max_delay(),
            now,
        )
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be greater than 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms cannot be smaller than base_delay_ms".to_string());
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_family(JobFamily::Extraction)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: delay never decreases as attempts grow
        #[test]
        fn test_next_delay_monotonic(attempt in 0u32..80, base_ms in 1u64..120_000, ceiling_ms in 1u64..10_000_000) {
            let base = Duration::from_millis(base_ms);
            let ceiling = Duration::from_millis(ceiling_ms);
            prop_assert!(next_delay(attempt, base, ceiling) <= next_delay(attempt + 1, base, ceiling));
        }

        /// Property: delay never exceeds the ceiling
        #[test]
        fn test_next_delay_bounded(attempt: u32, base_ms in 1u64..120_000, ceiling_ms in 1u64..10_000_000) {
            let ceiling = Duration::from_millis(ceiling_ms);
            prop_assert!(next_delay(attempt, Duration::from_millis(base_ms), ceiling) <= ceiling);
        }
    }
}
