//! Reconciler configuration

use serde::{Deserialize, Serialize};

/// Tolerances and defaults used when merging field values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Absolute difference under which two numbers are the same value
    pub abs_tolerance: f64,

    /// Difference relative to the larger magnitude under which two numbers are
    /// the same value (0.01 = 1%)
    pub rel_tolerance: f64,

    /// Confidence given to values a provider reported without one
    pub default_confidence: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            abs_tolerance: 1.0,
            rel_tolerance: 0.01,
            default_confidence: 0.5,
        }
    }
}

impl ReconcilerConfig {
    /// Exact-cents comparison, no relative slack
    pub fn strict() -> Self {
        Self {
            abs_tolerance: 0.01,
            rel_tolerance: 0.0,
            ..Self::default()
        }
    }

    /// Tolerates rounding and statement-period drift (5%)
    pub fn lenient() -> Self {
        Self {
            abs_tolerance: 5.0,
            rel_tolerance: 0.05,
            ..Self::default()
        }
    }

    /// Whether `a` and `b` are the same number under these tolerances
    pub fn within_tolerance(&self, a: f64, b: f64) -> bool {
        let allowed = self.abs_tolerance.max(self.rel_tolerance * a.abs().max(b.abs()));
        (a - b).abs() <= allowed
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.abs_tolerance.is_finite() || self.abs_tolerance < 0.0 {
            return Err("abs_tolerance must be a non-negative number".to_string());
        }
        if !self.rel_tolerance.is_finite() || !(0.0..1.0).contains(&self.rel_tolerance) {
            return Err("rel_tolerance must be in [0, 1)".to_string());
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err("default_confidence must be in [0, 1]".to_string());
        }
        Ok(())
    }
}
