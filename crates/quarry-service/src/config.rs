//! Per-family retry configuration

use quarry_domain::{JobFamily, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Retry policy of every job family
///
/// Families left out of a TOML table keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicies {
    /// Document extraction
    #[serde(default = "extraction_policy")]
    pub extraction: RetryPolicy,

    /// Secondary analysis
    #[serde(default = "analysis_policy")]
    pub analysis: RetryPolicy,

    /// Case summary generation
    #[serde(default = "summary_policy")]
    pub summary: RetryPolicy,
}

fn extraction_policy() -> RetryPolicy {
    RetryPolicy::for_family(JobFamily::Extraction)
}

fn analysis_policy() -> RetryPolicy {
    RetryPolicy::for_family(JobFamily::Analysis)
}

fn summary_policy() -> RetryPolicy {
    RetryPolicy::for_family(JobFamily::Summary)
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            extraction: extraction_policy(),
            analysis: analysis_policy(),
            summary: summary_policy(),
        }
    }
}

impl RetryPolicies {
    /// Policy of one family
    pub fn get(&self, family: JobFamily) -> RetryPolicy {
        match family {
            JobFamily::Extraction => self.extraction,
            JobFamily::Analysis => self.analysis,
            JobFamily::Summary => self.summary,
        }
    }

    /// Validate every family's policy
    pub fn validate(&self) -> Result<(), String> {
        for family in JobFamily::ALL {
            self.get(family)
                .validate()
                .map_err(|e| format!("{}: {}", family, e))?;
        }
        Ok(())
    }
}
