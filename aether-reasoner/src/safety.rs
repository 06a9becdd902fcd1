//! Confidence scoring and the execution gate.

use serde::{Deserialize, Serialize};

use crate::command::CommandPayload;
use crate::response::ParsedCandidate;
use crate::sql::ValidationReport;

/// Confidence lost per validator warning
pub const WARNING_PENALTY: f64 = 0.1;

/// Per-call safety settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    pub confidence_threshold: f64,
    pub allow_destructive: bool,
    pub destructive_ceiling: f64,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            allow_destructive: false,
            destructive_ceiling: 0.5,
        }
    }
}

impl SafetyPolicy {
    pub fn allowing_destructive(mut self) -> Self {
        self.allow_destructive = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafetyAssessment {
    pub confidence: f64,
    pub safe_to_execute: bool,
    pub destructive: bool,
    pub warnings: Vec<String>,
}

/// Confidence from the validator warning count alone
pub fn baseline_confidence(warning_count: usize) -> f64 {
    (1.0 - WARNING_PENALTY * warning_count as f64).clamp(0.0, 1.0)
}

pub fn score(
    candidate: &ParsedCandidate,
    report: &ValidationReport,
    command: &CommandPayload,
    policy: &SafetyPolicy,
) -> SafetyAssessment {
    let destructive = report.profile.is_destructive();
    let mut confidence = baseline_confidence(report.warnings.len());
    let mut warnings = Vec::new();

    if destructive {
        if policy.allow_destructive {
            warnings.push(format!(
                "destructive {} statement allowed by override",
                report.profile.kind
            ));
        } else {
            confidence = confidence.min(policy.destructive_ceiling);
            warnings.push(format!(
                "destructive {} statement requires explicit approval",
                report.profile.kind
            ));
        }
    }

    if report.profile.kind.is_accepted() && !command.intent().accepts(&report.profile.kind) {
        warnings.push(format!(
            "statement type {} does not match the requested intent '{}'",
            report.profile.kind,
            command.intent()
        ));
    }

    if let Some(declared) = candidate.declared_destructive {
        if declared != destructive {
            warnings.push(format!(
                "model marked the statement as {}destructive but it was classified as {}destructive",
                if declared { "" } else { "non-" },
                if destructive { "" } else { "non-" }
            ));
        }
    }

    let safe_to_execute = report.ok()
        && confidence >= policy.confidence_threshold
        && (!destructive || policy.allow_destructive);

    SafetyAssessment {
        confidence,
        safe_to_execute,
        destructive,
        warnings,
    }
}
