use std::fmt::Write;

use async_trait::async_trait;
use triage_types::{SignalInterpretation, SignalSnapshot};

use super::{JudgmentStage, Judge};

/// Stage 1: interpret the raw, time-ordered readings.
#[derive(Clone)]
pub struct SignalInterpretationStage {
    judge: Judge,
}

impl SignalInterpretationStage {
    pub fn new(judge: Judge) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl JudgmentStage for SignalInterpretationStage {
    type Input = SignalSnapshot;
    type Output = SignalInterpretation;

    fn judge(&self) -> &Judge {
        &self.judge
    }

    fn describe(&self, snapshot: &SignalSnapshot) -> String {
        let mut out = String::from(
            "Interpret the physiological course of this patient from their readings.\n\
             Classify the state as stable, improving, declining or uncertain.\n\nReadings (oldest first):\n",
        );
        for r in snapshot.readings() {
            let unit = r.unit.as_deref().map(|u| format!(" {u}")).unwrap_or_default();
            let _ = writeln!(
                out,
                "- {} {}{} at {}",
                r.name,
                r.value,
                unit,
                r.observed_at.to_rfc3339()
            );
        }

        out.push_str("\nVital trends:\n");
        for (name, trend) in snapshot.trends() {
            let _ = writeln!(out, "- {}: {}", name, trend.label());
        }

        let labs: Vec<String> = snapshot
            .latest_labs()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        let _ = writeln!(out, "\nMost recent labs: {}", super::list_or_none(&labs));
        let _ = write!(out, "Trend summary: {}", snapshot.trend_summary());
        out
    }
}
