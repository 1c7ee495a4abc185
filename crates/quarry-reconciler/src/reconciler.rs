//! Case reconciliation against a store

use crate::{
    analyze, build_snapshot, observations_from_structured, transition_events, FieldRegistry,
    ReconcilerConfig, ReconcilerError,
};
use chrono::{DateTime, Utc};
use quarry_domain::traits::{AuditSink, InsightStore};
use quarry_domain::{CaseId, DocumentVersion, FieldAnalysis, FieldObservation, InsightSnapshot};
use serde_json::Value;
use tracing::{debug, info};

/// The Reconciler merges a case's observations into a persisted snapshot
#[derive(Debug, Clone)]
pub struct Reconciler {
    registry: FieldRegistry,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler over the standard registry
    pub fn new(config: ReconcilerConfig) -> Result<Self, ReconcilerError> {
        config.validate().map_err(ReconcilerError::Config)?;
        Ok(Self {
            registry: FieldRegistry::standard(),
            config,
        })
    }

    /// Replace the field registry
    pub fn with_registry(mut self, registry: FieldRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The field registry in use
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// The configuration in use
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Missing/conflicting analysis of raw observations
    pub fn analyze(&self, observations: &[FieldObservation]) -> FieldAnalysis {
        analyze(observations, &self.registry, &self.config)
    }

    /// Observations for one document's structured output
    pub fn observations(
        &self,
        structured: &Value,
        document: &DocumentVersion,
        now: DateTime<Utc>,
    ) -> Vec<FieldObservation> {
        observations_from_structured(structured, document, &self.registry, &self.config, now)
    }

    /// Compute a case snapshot from stored observations without persisting it
    pub fn compute<S: InsightStore>(
        &self,
        case_id: &CaseId,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<InsightSnapshot, ReconcilerError> {
        let observations = store
            .observations_for_case(case_id)
            .map_err(|e| ReconcilerError::Store(e.to_string()))?;
        Ok(build_snapshot(case_id, &observations, &self.registry, &self.config, now))
    }

    /// Recompute, persist and signal a case's snapshot
    ///
    /// Transition events are recorded after the snapshot is saved, so a failed
    /// save never leaves a signal for a state that was not persisted.
    pub fn reconcile<S: InsightStore + AuditSink>(
        &self,
        case_id: &CaseId,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<InsightSnapshot, ReconcilerError> {
        let snapshot = self.compute(case_id, store, now)?;
        let previous = store
            .latest_snapshot(case_id)
            .map_err(|e| ReconcilerError::Store(e.to_string()))?;

        let events = transition_events(previous.as_ref(), &snapshot, now);

        store
            .save_snapshot(&snapshot)
            .map_err(|e| ReconcilerError::Store(e.to_string()))?;

        for event in events {
            info!(case_id = %case_id, kind = %event.kind, subject = %event.subject, "Case flagged");
            store.record(event);
        }

        debug!(
            case_id = %case_id,
            fields = snapshot.fields.len(),
            missing = snapshot.missing_fields.len(),
            conflicting = snapshot.conflicting_fields.len(),
            "Case reconciled"
        );
        Ok(snapshot)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            registry: FieldRegistry::standard(),
            config: ReconcilerConfig::default(),
        }
    }
}
