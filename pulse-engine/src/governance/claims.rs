//! Claim-language governor
//!
//! Text shown to a user is checked against its evidence grade and, when
//! known, its confidence level. Forbidden phrases are rewritten through a
//! replacement table and a missing uncertainty marker is appended. Whatever
//! cannot be repaired is returned flagged. Nothing here ever fails a request.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::evidence::{ClaimPolicies, EvidenceGrade};
use super::hierarchy::{ConfidenceLevel, LevelPolicies};
use crate::error::{EngineError, Result};

/// Outcome of governing a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Text was acceptable as written
    Compliant,
    /// Text was rewritten and is now acceptable
    Adjusted,
    /// Text still violates policy and must be shown with a warning
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimViolation {
    /// A phrase the evidence grade forbids
    DisallowedPhrase { phrase: String, grade: EvidenceGrade },
    /// A phrase the confidence level forbids
    ForbiddenAtLevel { phrase: String, level: ConfidenceLevel },
    /// The grade requires an uncertainty word and none is present
    MissingUncertainty { grade: EvidenceGrade },
    /// The level requires one of its phrases and none is present
    MissingRequiredPhrase { level: ConfidenceLevel },
    /// None of the grade's allowed verbs is present
    NoAllowedVerb { grade: EvidenceGrade },
}

/// Governed text ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernedText {
    pub text: String,
    pub status: ClaimStatus,
    pub grade: EvidenceGrade,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ConfidenceLevel>,
    /// Violations found in the original text
    pub violations: Vec<ClaimViolation>,
}

/// Replacement table and switches for the governor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimGovernorConfig {
    /// Forbidden phrase to softer phrase (matched case-insensitively)
    pub replacements: BTreeMap<String, String>,
    /// Appended when a grade requires uncertainty (default: " (uncertain)")
    pub uncertainty_suffix: String,
    /// Treat missing allowed verbs as a violation (default: false)
    pub require_allowed_verb: bool,
}

impl Default for ClaimGovernorConfig {
    fn default() -> Self {
        let replacements = [
            ("causes", "may be associated with"),
            ("proves", "suggests"),
            ("guarantees", "may support"),
            ("ensures", "may support"),
            ("definitely", "possibly"),
            ("significantly", "noticeably"),
            ("consistently", "repeatedly"),
            ("improves", "might improve"),
            ("increases", "might increase"),
            ("appears to", "might"),
            ("worsens", "may worsen"),
            ("recommend", "suggest"),
            ("prescribe", "consider"),
            ("cures", "may help with"),
            ("always works", "has worked before"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        Self {
            replacements,
            uncertainty_suffix: " (uncertain)".to_string(),
            require_allowed_verb: false,
        }
    }
}

/// A phrase compiled to a case-insensitive whole-word pattern
struct Phrase {
    text: String,
    regex: Regex,
}

impl Phrase {
    fn compile(text: &str) -> Result<Self> {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(text.trim()));
        let regex = Regex::new(&pattern).map_err(|e| {
            EngineError::Config(format!("invalid claim phrase '{text}': {e}"))
        })?;
        Ok(Self {
            text: text.to_string(),
            regex,
        })
    }

    fn compile_all(list: &[String]) -> Result<Vec<Self>> {
        list.iter().map(|p| Self::compile(p)).collect()
    }

    fn found_in(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

struct GradeRules {
    allowed: Vec<Phrase>,
    disallowed: Vec<Phrase>,
    uncertainty_required: bool,
}

struct LevelRules {
    level: ConfidenceLevel,
    must_use: Vec<Phrase>,
    must_not_use: Vec<Phrase>,
    requires_phrase: bool,
}

/// Validates and repairs claim language
pub struct ClaimGovernor {
    grades: BTreeMap<EvidenceGrade, GradeRules>,
    levels: Vec<LevelRules>,
    uncertainty: Vec<Phrase>,
    replacements: Vec<(Phrase, String)>,
    config: ClaimGovernorConfig,
}

impl ClaimGovernor {
    /// Compile every policy phrase up front
    pub fn new(
        claims: &ClaimPolicies,
        levels: &LevelPolicies,
        config: ClaimGovernorConfig,
    ) -> Result<Self> {
        let mut grades = BTreeMap::new();
        for grade in [EvidenceGrade::A, EvidenceGrade::B, EvidenceGrade::C, EvidenceGrade::D] {
            let policy = claims.get(grade);
            grades.insert(
                grade,
                GradeRules {
                    allowed: Phrase::compile_all(&policy.allowed_verbs)?,
                    disallowed: Phrase::compile_all(&policy.disallowed_verbs)?,
                    uncertainty_required: policy.uncertainty_required,
                },
            );
        }

        let mut level_rules = Vec::new();
        for level in [
            ConfidenceLevel::Observational,
            ConfidenceLevel::Correlational,
            ConfidenceLevel::Attributed,
            ConfidenceLevel::Evaluated,
            ConfidenceLevel::Reconfirmed,
        ] {
            let policy = levels.get(level);
            level_rules.push(LevelRules {
                level,
                must_use: Phrase::compile_all(&policy.must_use)?,
                must_not_use: Phrase::compile_all(&policy.must_not_use)?,
                requires_phrase: policy.requires_phrase(),
            });
        }

        // Longest phrases first so "always works" wins over shorter overlaps
        let mut pairs: Vec<(&String, &String)> = config.replacements.iter().collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        let replacements = pairs
            .into_iter()
            .map(|(from, to)| Ok((Phrase::compile(from)?, to.clone())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            grades,
            levels: level_rules,
            uncertainty: Phrase::compile_all(&claims.uncertainty_words)?,
            replacements,
            config,
        })
    }

    /// Governor over the built-in policies
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            &ClaimPolicies::default(),
            &LevelPolicies::default(),
            ClaimGovernorConfig::default(),
        )
    }

    fn level_rules(&self, level: ConfidenceLevel) -> Option<&LevelRules> {
        self.levels.iter().find(|l| l.level == level)
    }

    /// Every violation in `text`, in a stable order
    pub fn validate(
        &self,
        text: &str,
        grade: EvidenceGrade,
        level: Option<ConfidenceLevel>,
    ) -> Vec<ClaimViolation> {
        let mut violations = Vec::new();

        if let Some(rules) = self.grades.get(&grade) {
            for phrase in rules.disallowed.iter().filter(|p| p.found_in(text)) {
                violations.push(ClaimViolation::DisallowedPhrase {
                    phrase: phrase.text.clone(),
                    grade,
                });
            }
            if rules.uncertainty_required && !self.uncertainty.iter().any(|p| p.found_in(text)) {
                violations.push(ClaimViolation::MissingUncertainty { grade });
            }
            if self.config.require_allowed_verb
                && !rules.allowed.is_empty()
                && !rules.allowed.iter().any(|p| p.found_in(text))
            {
                violations.push(ClaimViolation::NoAllowedVerb { grade });
            }
        }

        if let Some(rules) = level.and_then(|l| self.level_rules(l)) {
            for phrase in rules.must_not_use.iter().filter(|p| p.found_in(text)) {
                violations.push(ClaimViolation::ForbiddenAtLevel {
                    phrase: phrase.text.clone(),
                    level: rules.level,
                });
            }
            if rules.requires_phrase && !rules.must_use.iter().any(|p| p.found_in(text)) {
                violations.push(ClaimViolation::MissingRequiredPhrase { level: rules.level });
            }
        }

        violations
    }

    /// Disallowed or level-forbidden phrases present in `text`
    fn offending_phrases(
        &self,
        text: &str,
        grade: EvidenceGrade,
        level: Option<ConfidenceLevel>,
    ) -> Vec<&Phrase> {
        let by_grade = self
            .grades
            .get(&grade)
            .into_iter()
            .flat_map(|rules| rules.disallowed.iter());
        let by_level = level
            .and_then(|l| self.level_rules(l))
            .into_iter()
            .flat_map(|rules| rules.must_not_use.iter());
        by_grade.chain(by_level).filter(|p| p.found_in(text)).collect()
    }

    /// Validate, repair what can be repaired, flag the rest
    pub fn govern(
        &self,
        text: &str,
        grade: EvidenceGrade,
        level: Option<ConfidenceLevel>,
    ) -> GovernedText {
        let violations = self.validate(text, grade, level);
        if violations.is_empty() {
            return GovernedText {
                text: text.to_string(),
                status: ClaimStatus::Compliant,
                grade,
                level,
                violations,
            };
        }

        // Only phrases behind a violation are rewritten
        let offending = self.offending_phrases(text, grade, level);
        let mut repaired = text.to_string();
        for (phrase, replacement) in &self.replacements {
            let targeted = offending
                .iter()
                .any(|o| o.found_in(&phrase.text) || phrase.found_in(&o.text));
            if targeted && phrase.found_in(&repaired) {
                repaired = phrase
                    .regex
                    .replace_all(&repaired, regex::NoExpand(replacement.as_str()))
                    .into_owned();
            }
        }

        let needs_uncertainty = self
            .validate(&repaired, grade, level)
            .iter()
            .any(|v| matches!(v, ClaimViolation::MissingUncertainty { .. }));
        if needs_uncertainty {
            repaired = format!(
                "{}{}",
                repaired.trim_end_matches('.'),
                self.config.uncertainty_suffix
            );
        }

        let status = if self.validate(&repaired, grade, level).is_empty() {
            ClaimStatus::Adjusted
        } else {
            ClaimStatus::Flagged
        };

        GovernedText {
            text: repaired,
            status,
            grade,
            level,
            violations,
        }
    }
}
