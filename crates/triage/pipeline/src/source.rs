//! Boundary to the system that supplies patient signals.

use async_trait::async_trait;
use thiserror::Error;
use triage_types::{PatientId, SignalSnapshot};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    #[error("patient source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PatientSource: Send + Sync {
    /// Current snapshot for a patient, or `None` if the patient is unknown.
    async fn snapshot(&self, patient_id: &PatientId) -> Result<Option<SignalSnapshot>, SourceError>;
}
