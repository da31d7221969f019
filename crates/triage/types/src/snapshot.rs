//! Per-patient signal snapshot.
//!
//! A snapshot is assembled once per run from the patient source and never
//! mutated afterwards. Trend normalization is deterministic and lives here so
//! every stage sees the same derived view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContractError;
use crate::ids::PatientId;

/// Relative change between the last two vital values that counts as a trend.
const TREND_RATIO: f64 = 0.1;
/// CRP above this value (mg/L) is called out as elevated.
const CRP_ELEVATED: f64 = 10.0;
/// WBC above this value (cells/uL) is called out as elevated.
const WBC_ELEVATED: f64 = 11_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Vital,
    Lab,
}

/// One named physiological measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub name: String,
    pub kind: ReadingKind,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    pub fn vital(name: impl Into<String>, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: ReadingKind::Vital,
            value,
            unit: None,
            observed_at,
        }
    }

    pub fn lab(name: impl Into<String>, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: ReadingKind::Lab,
            value,
            unit: None,
            observed_at,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Condition,
    Medication,
}

/// A categorical context fact such as a diagnosis on file or an active medication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFact {
    pub category: FactCategory,
    pub label: String,
    pub recorded_at: DateTime<Utc>,
}

impl ContextFact {
    pub fn condition(label: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            category: FactCategory::Condition,
            label: label.into(),
            recorded_at,
        }
    }

    pub fn medication(label: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            category: FactCategory::Medication,
            label: label.into(),
            recorded_at,
        }
    }
}

/// Direction of a vital sign over its two most recent values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    /// Classify `last` against `previous` using a symmetric 10% band.
    pub fn between(previous: f64, last: f64) -> Self {
        if last > previous * (1.0 + TREND_RATIO) {
            Trend::Increasing
        } else if last < previous * (1.0 - TREND_RATIO) {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        }
    }
}

/// Static patient context consulted by the context-adjustment stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticContext {
    pub age: Option<u32>,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
}

/// Reference to the snapshot a run judged, stored in its audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub patient_id: PatientId,
    /// BLAKE3 digest of the snapshot's canonical JSON form.
    pub digest: String,
    pub captured_at: DateTime<Utc>,
    pub reading_count: usize,
}

/// Immutable, time-ordered view of one patient's signals.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalSnapshot {
    patient_id: PatientId,
    age: Option<u32>,
    captured_at: DateTime<Utc>,
    readings: Vec<Reading>,
    facts: Vec<ContextFact>,
}

/// Builder for [`SignalSnapshot`]. Ordering is established in [`build`](Self::build).
#[derive(Debug)]
pub struct SnapshotBuilder {
    patient_id: PatientId,
    age: Option<u32>,
    captured_at: Option<DateTime<Utc>>,
    readings: Vec<Reading>,
    facts: Vec<ContextFact>,
}

impl SnapshotBuilder {
    pub fn age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    pub fn reading(mut self, reading: Reading) -> Self {
        self.readings.push(reading);
        self
    }

    pub fn readings(mut self, readings: impl IntoIterator<Item = Reading>) -> Self {
        self.readings.extend(readings);
        self
    }

    pub fn fact(mut self, fact: ContextFact) -> Self {
        self.facts.push(fact);
        self
    }

    pub fn build(mut self) -> SignalSnapshot {
        // Stable sorts keep insertion order for simultaneous observations.
        self.readings.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));
        self.facts.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));

        SignalSnapshot {
            patient_id: self.patient_id,
            age: self.age,
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
            readings: self.readings,
            facts: self.facts,
        }
    }
}

impl SignalSnapshot {
    pub fn builder(patient_id: impl Into<PatientId>) -> SnapshotBuilder {
        SnapshotBuilder {
            patient_id: patient_id.into(),
            age: None,
            captured_at: None,
            readings: Vec::new(),
            facts: Vec::new(),
        }
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    pub fn age(&self) -> Option<u32> {
        self.age
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Values of one named reading in time order.
    pub fn series(&self, name: &str) -> Vec<f64> {
        self.readings
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.value)
            .collect()
    }

    /// Static context projected from the fact list, first occurrence wins.
    pub fn static_context(&self) -> StaticContext {
        let mut conditions: Vec<String> = Vec::new();
        let mut medications: Vec<String> = Vec::new();
        for fact in &self.facts {
            let bucket = match fact.category {
                FactCategory::Condition => &mut conditions,
                FactCategory::Medication => &mut medications,
            };
            if !bucket.contains(&fact.label) {
                bucket.push(fact.label.clone());
            }
        }
        StaticContext {
            age: self.age,
            conditions,
            medications,
        }
    }

    /// Trend per vital sign, in order of first observation.
    pub fn trends(&self) -> Vec<(String, Trend)> {
        self.names(ReadingKind::Vital)
            .into_iter()
            .filter_map(|name| {
                let values = self.series(name);
                let trend = match values.as_slice() {
                    [] => return None,
                    [_] => Trend::Stable,
                    [.., previous, last] => Trend::between(*previous, *last),
                };
                Some((name.to_string(), trend))
            })
            .collect()
    }

    /// Most recent value per lab, in order of first observation.
    pub fn latest_labs(&self) -> Vec<(String, f64)> {
        self.names(ReadingKind::Lab)
            .into_iter()
            .filter_map(|name| {
                self.series(name)
                    .last()
                    .map(|value| (name.to_string(), *value))
            })
            .collect()
    }

    /// Human-readable summary of concerning trends.
    pub fn trend_summary(&self) -> String {
        let mut parts: Vec<String> = self
            .trends()
            .into_iter()
            .filter(|(_, trend)| *trend != Trend::Stable)
            .map(|(name, trend)| format!("{} {}", name.replace('_', " "), trend.label()))
            .collect();

        if let Some(crp) = self.series("CRP").last().filter(|v| **v > CRP_ELEVATED) {
            parts.push(format!("elevated CRP ({crp} mg/L)"));
        }
        if let Some(wbc) = self.series("WBC").last().filter(|v| **v > WBC_ELEVATED) {
            parts.push(format!("elevated WBC ({wbc})"));
        }

        for name in self.names(ReadingKind::Lab) {
            if name == "CRP" || name == "WBC" {
                continue;
            }
            if let [.., a, b, c] = self.series(name).as_slice() {
                if c > b && b > a {
                    parts.push(format!("{name} trending up"));
                }
            }
        }

        if parts.is_empty() {
            "all metrics stable".to_string()
        } else {
            parts.join("; ")
        }
    }

    /// Digest-based reference used by audit records.
    pub fn reference(&self) -> Result<SnapshotRef, ContractError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| ContractError::Serialization(e.to_string()))?;
        Ok(SnapshotRef {
            patient_id: self.patient_id.clone(),
            digest: blake3::hash(&bytes).to_hex().to_string(),
            captured_at: self.captured_at,
            reading_count: self.readings.len(),
        })
    }

    fn names(&self, kind: ReadingKind) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for reading in self.readings.iter().filter(|r| r.kind == kind) {
            if !names.contains(&reading.name.as_str()) {
                names.push(reading.name.as_str());
            }
        }
        names
    }
}
