//! Append-only audit log.
//!
//! Every stored record is linked to its predecessor by a BLAKE3 hash, so any
//! later edit of the stored data is detectable with [`verify_chain`]. The log
//! has no update or delete operations.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use triage_types::{AuditRecord, PatientId, RunId};

use crate::error::{AuditError, AuditResult};

/// Acknowledgement of a persisted audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub run_id: RunId,
    pub sequence: u64,
    pub previous_hash: Option<String>,
    pub hash: String,
}

/// A stored record together with its chain position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainedRecord {
    pub sequence: u64,
    pub previous_hash: Option<String>,
    pub hash: String,
    pub record: AuditRecord,
}

/// Audit log boundary.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Persist a record. Failure here is fatal for the run that wrote it.
    async fn append(&self, record: AuditRecord) -> AuditResult<AuditReceipt>;

    /// Records for one patient, in write order.
    async fn list_for(&self, patient_id: &PatientId) -> AuditResult<Vec<AuditRecord>>;
}

#[derive(Default)]
struct LogState {
    entries: Vec<ChainedRecord>,
    run_ids: HashSet<RunId>,
}

/// In-memory audit log with a single hash chain across all patients.
#[derive(Default)]
pub struct InMemoryAuditLog {
    state: RwLock<LogState>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full chain in write order.
    pub fn entries(&self) -> AuditResult<Vec<ChainedRecord>> {
        let guard = self
            .state
            .read()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard.entries.clone())
    }

    pub fn len(&self) -> AuditResult<usize> {
        let guard = self
            .state
            .read()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard.entries.len())
    }

    pub fn is_empty(&self) -> AuditResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> AuditResult<AuditReceipt> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;

        if guard.run_ids.contains(&record.run_id) {
            return Err(AuditError::DuplicateRun(record.run_id));
        }

        let previous_hash = guard.entries.last().map(|e| e.hash.clone());
        let sequence = guard.entries.len() as u64 + 1;
        let hash = compute_record_hash(&record, previous_hash.as_deref(), sequence)?;

        let receipt = AuditReceipt {
            run_id: record.run_id,
            sequence,
            previous_hash: previous_hash.clone(),
            hash: hash.clone(),
        };

        debug!(
            run_id = %record.run_id,
            patient_id = %record.patient_id,
            sequence,
            "Audit record appended"
        );

        guard.run_ids.insert(record.run_id);
        guard.entries.push(ChainedRecord {
            sequence,
            previous_hash,
            hash,
            record,
        });
        Ok(receipt)
    }

    async fn list_for(&self, patient_id: &PatientId) -> AuditResult<Vec<AuditRecord>> {
        let guard = self
            .state
            .read()
            .map_err(|_| AuditError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard
            .entries
            .iter()
            .filter(|e| &e.record.patient_id == patient_id)
            .map(|e| e.record.clone())
            .collect())
    }
}

/// Recompute every link in a chain.
pub fn verify_chain(entries: &[ChainedRecord]) -> AuditResult<()> {
    let mut previous: Option<&str> = None;
    for (idx, entry) in entries.iter().enumerate() {
        let expected_sequence = idx as u64 + 1;
        let hash = compute_record_hash(&entry.record, previous, entry.sequence)?;
        if entry.sequence != expected_sequence
            || entry.previous_hash.as_deref() != previous
            || entry.hash != hash
        {
            return Err(AuditError::ChainBroken {
                sequence: entry.sequence,
            });
        }
        previous = Some(entry.hash.as_str());
    }
    Ok(())
}

#[derive(Serialize)]
struct HashInput<'a> {
    previous_hash: Option<&'a str>,
    sequence: u64,
    record: &'a AuditRecord,
}

fn compute_record_hash(
    record: &AuditRecord,
    previous_hash: Option<&str>,
    sequence: u64,
) -> AuditResult<String> {
    let input = HashInput {
        previous_hash,
        sequence,
        record,
    };
    let serialized =
        serde_json::to_vec(&input).map_err(|e| AuditError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}
