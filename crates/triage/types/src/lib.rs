//! Core type definitions for the triage decision pipeline.
//!
//! This crate holds the shared data model and no orchestration logic. Every
//! other triage crate depends on it.
//!
//! ## Invariants carried by the types
//!
//! - Uncertainty values are always within `[0, 1]`; out-of-range values in
//!   external output fail deserialization instead of being clamped.
//! - A [`Decision`] that escalates always carries an urgency, and one that
//!   continues monitoring never does.
//! - A completed [`AuditRecord`] references all three stage outputs; a failed
//!   one never carries a decision.
//! - `enrichment_invoked` on a record is derived from the presence of its
//!   [`EnrichmentRecord`], so the two cannot disagree.

#![deny(unsafe_code)]

pub mod audit;
pub mod decision;
pub mod enrichment;
pub mod error;
pub mod history;
pub mod ids;
pub mod schema;
pub mod snapshot;
pub mod stage;
pub mod state;
pub mod uncertainty;

pub use audit::{AuditRecord, FailureInfo, FailureKind, RunProgress, RunStatus, UncertaintyPoint};
pub use decision::{Action, Decision, Urgency};
pub use enrichment::{EnrichmentRecord, EnrichmentResult, LookupOutcome};
pub use error::ContractError;
pub use history::DecisionLogEntry;
pub use ids::{PatientId, RunId};
pub use schema::{FieldKind, FieldSpec, SchemaDescriptor};
pub use snapshot::{
    ContextFact, FactCategory, Reading, ReadingKind, SignalSnapshot, SnapshotBuilder, SnapshotRef,
    StaticContext, Trend,
};
pub use stage::{
    ContextAdjustment, EscalationSynthesis, PhysiologicalState, RiskLevel, SignalInterpretation,
    StageContract, StageKind, StageOutput,
};
pub use state::PipelineState;
pub use uncertainty::Uncertainty;
