//! Fire-and-forget notification of run outcomes.
//!
//! Delivery is the host's concern. A notifier must not block or fail the
//! run that triggered it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use triage_types::{Decision, PatientId, RunId, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A clinician should review the patient.
    ClinicalEscalation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub patient_id: PatientId,
    pub run_id: RunId,
    pub urgency: Option<Urgency>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build the notification a decision calls for, if any. Only escalations notify.
    pub fn for_decision(
        patient_id: &PatientId,
        run_id: RunId,
        decision: &Decision,
    ) -> Option<Self> {
        if !decision.escalates() {
            return None;
        }
        let urgency = decision.urgency.map(|u| u.label()).unwrap_or("unspecified");
        Some(Self {
            kind: NotificationKind::ClinicalEscalation,
            patient_id: patient_id.clone(),
            run_id,
            urgency: decision.urgency,
            message: format!(
                "Escalation ({urgency}) for {}: {}",
                patient_id.as_str(),
                decision.rationale
            ),
            timestamp: Utc::now(),
        })
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default notifier: emits a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            patient_id = %notification.patient_id,
            run_id = %notification.run_id,
            urgency = ?notification.urgency,
            message = %notification.message,
            "Clinical escalation"
        );
    }
}
