//! Confidence governance: what may be claimed, how strongly, and when.
//!
//! - [`GradeRubric`] turns statistics into an [`EvidenceGrade`].
//! - [`SignalClassifier`] places a claim on the 1-5 [`ConfidenceLevel`]
//!   hierarchy and builds its [`DecisionSignal`].
//! - [`ClaimGovernor`] checks text against both and repairs or flags it.
//! - [`InsightGuardrails`] and [`InsightSuppressor`] decide which insights
//!   are surfaced at all.

mod claims;
mod evidence;
mod guardrails;
mod hierarchy;
mod suppression;

pub use claims::{ClaimGovernor, ClaimGovernorConfig, ClaimStatus, ClaimViolation, GovernedText};
pub use evidence::{
    suggest_claim_language, ClaimDirection, ClaimPolicies, ClaimPolicy, ClaimStrength,
    EvidenceGrade, GradeCutoff, GradeInputs, GradeRubric,
};
pub use guardrails::{GuardrailConfig, GuardrailPolicy, InsightGuardrails};
pub use hierarchy::{
    AllowedAction, ConfidenceLevel, DecisionSignal, HierarchyConfig, LevelPolicies, LevelPolicy,
    SignalClassifier, SignalOrigin,
};
pub use suppression::{InsightSuppressor, SuppressionConfig};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// All governance tables, loaded once from the `[governance]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub rubric: GradeRubric,
    pub claims: ClaimPolicies,
    pub levels: LevelPolicies,
    pub hierarchy: HierarchyConfig,
    pub claim_governor: ClaimGovernorConfig,
    pub suppression: SuppressionConfig,
    pub guardrails: GuardrailConfig,
}

impl GovernanceConfig {
    /// Compile the claim governor for these policies
    pub fn claim_governor(&self) -> Result<ClaimGovernor> {
        ClaimGovernor::new(&self.claims, &self.levels, self.claim_governor.clone())
    }

    pub fn signal_classifier(&self) -> SignalClassifier {
        SignalClassifier::with_config(self.levels.clone(), self.hierarchy.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_compiles() {
        let config = GovernanceConfig::default();
        assert!(config.claim_governor().is_ok());
        assert_eq!(config.suppression.max_daily_insights, 10);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: GovernanceConfig = toml::from_str(
            r#"
            [suppression]
            max_daily_insights = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.suppression.max_daily_insights, 3);
        assert_eq!(config.suppression.min_days_between_repeats, 7);
        assert_eq!(config.rubric, GradeRubric::default());
    }
}
