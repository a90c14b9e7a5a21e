//! Intervention safety checks against user flags

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Boundary, RiskLevel, SafetyDecision, SafetyIssue, SafetyIssueCode};
use crate::governance::EvidenceGrade;
use crate::registry::Registry;

/// User-level safety flags (conditions and medications)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSafetyFlags {
    pub pregnant: bool,
    pub trying_to_conceive: bool,
    pub kidney_disease: bool,
    pub bleeding_disorder: bool,
    pub warfarin: bool,
    pub anticoagulants: bool,
    pub levothyroxine: bool,
    pub tetracycline_antibiotics: bool,
    pub immunosuppressants: bool,
}

impl UserSafetyFlags {
    /// Names of the flags that are set
    pub fn active(&self) -> Vec<&'static str> {
        [
            ("pregnant", self.pregnant),
            ("trying_to_conceive", self.trying_to_conceive),
            ("kidney_disease", self.kidney_disease),
            ("bleeding_disorder", self.bleeding_disorder),
            ("warfarin", self.warfarin),
            ("anticoagulants", self.anticoagulants),
            ("levothyroxine", self.levothyroxine),
            ("tetracycline_antibiotics", self.tetracycline_antibiotics),
            ("immunosuppressants", self.immunosuppressants),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }

    pub fn has(&self, flag: &str) -> bool {
        self.active().contains(&flag)
    }
}

/// Evaluates interventions against the intervention registry
pub struct InterventionSafety {
    registry: Arc<Registry>,
}

impl InterventionSafety {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Decide whether an intervention may be surfaced to this user
    ///
    /// Unknown interventions are allowed but labelled experimental with
    /// grade D evidence. Any contraindication blocks.
    pub fn evaluate(
        &self,
        intervention_key: &str,
        flags: &UserSafetyFlags,
        requested_boundary: Option<&str>,
        requested_evidence: Option<&str>,
    ) -> SafetyDecision {
        let Some(spec) = self.registry.get_intervention(intervention_key) else {
            return SafetyDecision {
                allowed: true,
                risk: RiskLevel::Moderate,
                issues: vec![SafetyIssue {
                    code: SafetyIssueCode::UnknownIntervention,
                    severity: RiskLevel::Moderate,
                    message: "This intervention is not in the safety registry yet. Treat as experimental and proceed cautiously.".to_string(),
                    subject: Some(intervention_key.to_string()),
                }],
                boundary: Boundary::Experiment,
                evidence_grade: EvidenceGrade::D,
            };
        };

        let mut issues = Vec::new();
        let mut risk = spec.default_risk;

        for flag in spec.contraindications.iter().filter(|f| flags.has(f)) {
            issues.push(SafetyIssue {
                code: SafetyIssueCode::Contraindication,
                severity: RiskLevel::High,
                message: format!(
                    "User has contraindication flag '{flag}' for {}.",
                    spec.display_name
                ),
                subject: Some(flag.clone()),
            });
            risk = risk.max(RiskLevel::High);
        }

        for flag in spec.interactions.iter().filter(|f| flags.has(f)) {
            issues.push(SafetyIssue {
                code: SafetyIssueCode::Interaction,
                severity: RiskLevel::Moderate,
                message: format!(
                    "User has interaction flag '{flag}' for {}.",
                    spec.display_name
                ),
                subject: Some(flag.clone()),
            });
            risk = risk.max(RiskLevel::Moderate);
        }

        let boundary = match requested_boundary {
            Some(requested) => Boundary::parse(requested).unwrap_or_else(|| {
                issues.push(SafetyIssue {
                    code: SafetyIssueCode::InvalidBoundary,
                    severity: RiskLevel::Low,
                    message: "Invalid boundary requested; defaulting to 'experiment'.".to_string(),
                    subject: Some(requested.to_string()),
                });
                Boundary::Experiment
            }),
            None if risk == RiskLevel::Low => Boundary::Lifestyle,
            None => Boundary::Experiment,
        };

        let evidence_grade = match requested_evidence {
            Some(requested) => EvidenceGrade::parse(requested).unwrap_or_else(|| {
                issues.push(SafetyIssue {
                    code: SafetyIssueCode::InvalidEvidenceGrade,
                    severity: RiskLevel::Low,
                    message: "Invalid evidence grade requested; using registry grade.".to_string(),
                    subject: Some(requested.to_string()),
                });
                spec.evidence_grade
            }),
            None => spec.evidence_grade,
        };

        let allowed = !issues
            .iter()
            .any(|i| i.code == SafetyIssueCode::Contraindication && i.severity == RiskLevel::High);

        SafetyDecision {
            allowed,
            risk,
            issues,
            boundary,
            evidence_grade,
        }
    }
}
