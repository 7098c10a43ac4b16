//! Per-step results of a smoke run

use serde::Serialize;
use std::time::Duration;

/// Result of one verification step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Step completed
    Passed,
    /// Step failed with this message
    Failed(String),
    /// Step was not needed
    Skipped(String),
}

/// One reported step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Step description, e.g. "can create and bind to a service instance using shared"
    pub name: String,
    /// Outcome
    pub outcome: StepOutcome,
    /// Wall time spent in the step
    pub elapsed_ms: u64,
}

impl StepReport {
    /// Create a report entry
    #[must_use]
    pub fn new(name: impl Into<String>, outcome: StepOutcome, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            outcome,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether the step failed
    #[inline]
    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed(_))
    }
}

/// Ordered results of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    /// Steps in execution order
    pub steps: Vec<StepReport>,
}

impl SuiteReport {
    /// Append a step
    pub fn push(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    /// True if no step failed
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.steps.iter().any(StepReport::failed)
    }

    /// Failed steps
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.failed())
    }

    /// Look up a step by exact name
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== RDPG Smoke Report ===\n\n");

        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for step in &self.steps {
            let (tag, detail) = match &step.outcome {
                StepOutcome::Passed => {
                    passed += 1;
                    ("PASS", None)
                }
                StepOutcome::Failed(msg) => {
                    failed += 1;
                    ("FAIL", Some(msg))
                }
                StepOutcome::Skipped(reason) => {
                    skipped += 1;
                    ("SKIP", Some(reason))
                }
            };
            report.push_str(&format!("[{tag}] {} ({} ms)\n", step.name, step.elapsed_ms));
            if let Some(detail) = detail {
                report.push_str(&format!("       {detail}\n"));
            }
        }

        report.push_str(&format!(
            "\nPassed: {passed}  Failed: {failed}  Skipped: {skipped}\n"
        ));
        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}
