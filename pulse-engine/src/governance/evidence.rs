//! Evidence grades and the phrasing each grade permits

use serde::{Deserialize, Serialize};

/// Evidence grade, A strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceGrade {
    A,
    B,
    C,
    D,
}

impl EvidenceGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }

    /// Parse a grade letter, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }
}

impl std::fmt::Display for EvidenceGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStrength {
    Weak,
    Moderate,
    Strong,
}

/// Minimums a result must meet for one grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeCutoff {
    pub min_confidence: f64,
    pub min_sample_size: usize,
    pub min_coverage: f64,
}

impl GradeCutoff {
    fn admits(&self, inputs: &GradeInputs) -> bool {
        inputs.confidence >= self.min_confidence
            && inputs.sample_size >= self.min_sample_size
            && inputs.coverage >= self.min_coverage
    }
}

/// Statistics a grade is assigned from
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeInputs {
    pub confidence: f64,
    pub sample_size: usize,
    pub coverage: f64,
    pub effect_size: Option<f64>,
    pub p_value: Option<f64>,
}

/// Cut-points from statistics to an evidence grade
///
/// Grade A additionally needs a large effect or a small p-value. Anything
/// below the C cut-off is D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeRubric {
    pub a: GradeCutoff,
    /// |effect size| that qualifies for A (default: 0.5)
    pub a_min_effect_size: f64,
    /// p-value that qualifies for A (default: 0.01)
    pub a_max_p_value: f64,
    pub b: GradeCutoff,
    pub c: GradeCutoff,
}

impl Default for GradeRubric {
    fn default() -> Self {
        Self {
            a: GradeCutoff {
                min_confidence: 0.8,
                min_sample_size: 30,
                min_coverage: 0.7,
            },
            a_min_effect_size: 0.5,
            a_max_p_value: 0.01,
            b: GradeCutoff {
                min_confidence: 0.6,
                min_sample_size: 14,
                min_coverage: 0.5,
            },
            c: GradeCutoff {
                min_confidence: 0.4,
                min_sample_size: 7,
                min_coverage: 0.3,
            },
        }
    }
}

impl GradeRubric {
    pub fn grade(&self, inputs: &GradeInputs) -> EvidenceGrade {
        if self.a.admits(inputs) {
            let large_effect = inputs
                .effect_size
                .is_some_and(|e| e.abs() >= self.a_min_effect_size);
            let significant = inputs.p_value.is_some_and(|p| p < self.a_max_p_value);
            if large_effect || significant {
                return EvidenceGrade::A;
            }
        }
        if self.b.admits(inputs) {
            EvidenceGrade::B
        } else if self.c.admits(inputs) {
            EvidenceGrade::C
        } else {
            EvidenceGrade::D
        }
    }
}

/// Language permitted for one evidence grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimPolicy {
    pub grade: EvidenceGrade,
    pub strength: ClaimStrength,
    pub allowed_verbs: Vec<String>,
    pub allowed_modifiers: Vec<String>,
    pub disallowed_verbs: Vec<String>,
    /// Text must contain an uncertainty word
    pub uncertainty_required: bool,
    pub example_phrases: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// One claim policy per grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimPolicies {
    pub a: ClaimPolicy,
    pub b: ClaimPolicy,
    pub c: ClaimPolicy,
    pub d: ClaimPolicy,
    /// Words that count as expressing uncertainty
    pub uncertainty_words: Vec<String>,
}

impl ClaimPolicies {
    pub fn get(&self, grade: EvidenceGrade) -> &ClaimPolicy {
        match grade {
            EvidenceGrade::A => &self.a,
            EvidenceGrade::B => &self.b,
            EvidenceGrade::C => &self.c,
            EvidenceGrade::D => &self.d,
        }
    }
}

impl Default for ClaimPolicies {
    fn default() -> Self {
        Self {
            a: ClaimPolicy {
                grade: EvidenceGrade::A,
                strength: ClaimStrength::Strong,
                allowed_verbs: words(&[
                    "improves",
                    "increases",
                    "decreases",
                    "reduces",
                    "enhances",
                    "correlates with",
                    "is associated with",
                    "shows",
                ]),
                allowed_modifiers: words(&["significantly", "consistently", "reliably"]),
                disallowed_verbs: words(&["causes", "guarantees", "ensures", "proves"]),
                uncertainty_required: false,
                example_phrases: words(&[
                    "significantly improves",
                    "is consistently associated with",
                    "shows a reliable increase",
                ]),
            },
            b: ClaimPolicy {
                grade: EvidenceGrade::B,
                strength: ClaimStrength::Moderate,
                allowed_verbs: words(&[
                    "appears to improve",
                    "may increase",
                    "suggests",
                    "is associated with",
                    "tends to",
                    "shows",
                ]),
                allowed_modifiers: words(&["likely", "probably", "often"]),
                disallowed_verbs: words(&["causes", "guarantees", "ensures", "proves", "definitely"]),
                uncertainty_required: true,
                example_phrases: words(&[
                    "appears to improve",
                    "may be associated with",
                    "suggests a likely increase",
                ]),
            },
            c: ClaimPolicy {
                grade: EvidenceGrade::C,
                strength: ClaimStrength::Weak,
                allowed_verbs: words(&[
                    "might improve",
                    "could increase",
                    "possibly",
                    "may be associated with",
                    "suggests a potential",
                ]),
                allowed_modifiers: words(&["possibly", "potentially", "uncertain"]),
                disallowed_verbs: words(&[
                    "improves",
                    "increases",
                    "causes",
                    "guarantees",
                    "ensures",
                    "proves",
                    "definitely",
                    "significantly",
                    "consistently",
                ]),
                uncertainty_required: true,
                example_phrases: words(&[
                    "might be associated with",
                    "could potentially improve",
                    "suggests a possible increase (uncertain)",
                ]),
            },
            d: ClaimPolicy {
                grade: EvidenceGrade::D,
                strength: ClaimStrength::Weak,
                allowed_verbs: words(&[
                    "might suggest",
                    "could indicate",
                    "possibly hints at",
                    "uncertain association with",
                ]),
                allowed_modifiers: words(&["uncertain", "unclear", "inconclusive", "limited evidence"]),
                disallowed_verbs: words(&[
                    "improves",
                    "increases",
                    "causes",
                    "guarantees",
                    "ensures",
                    "proves",
                    "definitely",
                    "significantly",
                    "consistently",
                    "appears to",
                ]),
                uncertainty_required: true,
                example_phrases: words(&[
                    "uncertain association (limited evidence)",
                    "might suggest (inconclusive)",
                    "could indicate (unclear)",
                ]),
            },
            uncertainty_words: words(&[
                "uncertain",
                "unclear",
                "may",
                "might",
                "could",
                "possibly",
                "potentially",
                "suggests",
            ]),
        }
    }
}

/// Direction a suggested claim describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDirection {
    Positive,
    Negative,
    Neutral,
}

/// Deterministic phrase for `metric_key` that fits the grade's policy
pub fn suggest_claim_language(
    grade: EvidenceGrade,
    metric_key: &str,
    direction: ClaimDirection,
) -> String {
    let verb = match (direction, grade) {
        (ClaimDirection::Positive, EvidenceGrade::A) => "improves",
        (ClaimDirection::Positive, EvidenceGrade::B) => "appears to improve",
        (ClaimDirection::Positive, _) => "might improve",
        (ClaimDirection::Negative, EvidenceGrade::A) => "decreases",
        (ClaimDirection::Negative, EvidenceGrade::B) => "appears to decrease",
        (ClaimDirection::Negative, _) => "might decrease",
        (ClaimDirection::Neutral, EvidenceGrade::A | EvidenceGrade::B) => "is associated with",
        (ClaimDirection::Neutral, _) => "might be associated with",
    };
    match grade {
        EvidenceGrade::C | EvidenceGrade::D => format!("{verb} {metric_key} (uncertain)"),
        EvidenceGrade::A | EvidenceGrade::B => format!("{verb} {metric_key}"),
    }
}
