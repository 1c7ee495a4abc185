//! Quarry Insight Reconciler
//!
//! Merges the field values extracted from every document of a case into one
//! case-level view.
//!
//! ## Pipeline
//!
//! 1. **Ingest**: a provider's structured output becomes [`FieldObservation`]s,
//!    keyed by canonical field key through the [`FieldRegistry`]
//! 2. **Analyze**: required fields with no value are *missing*; fields whose
//!    values disagree (numbers outside tolerance, distinct text) are *conflicting*
//! 3. **Snapshot**: the winning value per field plus its sources, grouped by
//!    document category and by field category
//! 4. **Signal**: an audit event whenever the missing or conflicting set changes
//!    to a new non-empty set
//!
//! [`FieldObservation`]: quarry_domain::FieldObservation

mod analysis;
mod config;
mod error;
mod ingest;
mod normalize;
mod reconciler;
mod registry;
mod snapshot;
mod transitions;

pub use analysis::analyze;
pub use config::ReconcilerConfig;
pub use error::ReconcilerError;
pub use ingest::observations_from_structured;
pub use normalize::{count_clusters, normalize_value, parse_numeric};
pub use reconciler::Reconciler;
pub use registry::{canonical_key, FieldRegistry};
pub use snapshot::build_snapshot;
pub use transitions::transition_events;
