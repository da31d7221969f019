use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::ids::{PatientId, RunId};

/// One entry in a patient's long-lived decision history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub patient_id: PatientId,
    pub run_id: RunId,
    pub decision: Decision,
    pub timestamp: DateTime<Utc>,
    /// Component that logged the decision.
    pub logged_by: String,
}

impl DecisionLogEntry {
    pub fn new(
        patient_id: PatientId,
        run_id: RunId,
        decision: Decision,
        logged_by: impl Into<String>,
    ) -> Self {
        Self {
            patient_id,
            run_id,
            decision,
            timestamp: Utc::now(),
            logged_by: logged_by.into(),
        }
    }
}
