//! Question types and their per-type capabilities.
//!
//! Each type answers the same small set of questions (how are answers shaped,
//! how are options rendered, which store payload record backs it) so callers
//! never branch on type names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Answer, AnswerDraft, QuestionDraft};

/// Separator between prompt and match in a matching-pair answer body.
pub const MATCHING_SEPARATOR: &str = "->";

/// Supported question types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "multichoice")]
    MultipleChoice,
    #[serde(rename = "multiresponse")]
    MultipleResponse,
    #[serde(rename = "truefalse")]
    TrueFalse,
    #[serde(rename = "shortanswer")]
    ShortAnswer,
    #[serde(rename = "essay")]
    Essay,
    #[serde(rename = "matching")]
    Matching,
    #[serde(rename = "scenario")]
    Scenario,
}

impl QuestionType {
    /// Destination store type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multichoice",
            QuestionType::MultipleResponse => "multiresponse",
            QuestionType::TrueFalse => "truefalse",
            QuestionType::ShortAnswer => "shortanswer",
            QuestionType::Essay => "essay",
            QuestionType::Matching => "matching",
            QuestionType::Scenario => "scenario",
        }
    }

    pub fn all() -> &'static [QuestionType] {
        &[
            QuestionType::MultipleChoice,
            QuestionType::MultipleResponse,
            QuestionType::TrueFalse,
            QuestionType::ShortAnswer,
            QuestionType::Essay,
            QuestionType::Matching,
            QuestionType::Scenario,
        ]
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "multichoice" | "multiplechoice" | "mc" | "mcq" => Ok(QuestionType::MultipleChoice),
            "multiresponse" | "multipleresponse" | "mr" => Ok(QuestionType::MultipleResponse),
            "truefalse" | "tf" => Ok(QuestionType::TrueFalse),
            "shortanswer" | "sa" => Ok(QuestionType::ShortAnswer),
            "essay" => Ok(QuestionType::Essay),
            "matching" => Ok(QuestionType::Matching),
            "scenario" | "scenariobased" => Ok(QuestionType::Scenario),
            _ => Err(Error::Validation(format!("unknown question type '{}'", s))),
        }
    }
}

/// Per-type behavior used by generation, review, deployment and diagnostics.
pub trait QuestionCapabilities {
    /// Check that a draft's answers have the shape this type requires.
    fn validate_answer_shape(&self, answers: &[AnswerDraft]) -> Result<()>;

    /// Render options for display, in `sort_order`.
    fn render_answer_options(&self, answers: &[Answer]) -> Vec<String>;

    /// Destination store payload table holding this type's options record.
    fn payload_table(&self) -> &'static str;

    /// Exactly one answer may carry a positive weight.
    fn requires_unique_correct(&self) -> bool;

    /// Drafts with too few options are topped up with generated distractors.
    fn needs_distractors(&self) -> bool;
}

impl QuestionCapabilities for QuestionType {
    fn validate_answer_shape(&self, answers: &[AnswerDraft]) -> Result<()> {
        let correct = answers.iter().filter(|a| a.is_correct()).count();
        let blank = answers.iter().any(|a| a.body.trim().is_empty());
        if blank {
            return Err(shape_error(*self, "answer text must not be empty"));
        }

        match self {
            QuestionType::TrueFalse => {
                if answers.len() != 2 {
                    return Err(shape_error(
                        *self,
                        &format!("expected exactly 2 options, got {}", answers.len()),
                    ));
                }
                if correct != 1 {
                    return Err(shape_error(
                        *self,
                        &format!("expected exactly 1 correct option, got {}", correct),
                    ));
                }
            }
            QuestionType::MultipleChoice | QuestionType::Scenario => {
                if answers.len() < 2 {
                    return Err(shape_error(
                        *self,
                        &format!("expected at least 2 options, got {}", answers.len()),
                    ));
                }
                if correct != 1 {
                    return Err(shape_error(
                        *self,
                        &format!("expected exactly 1 correct option, got {}", correct),
                    ));
                }
            }
            QuestionType::MultipleResponse => {
                if answers.len() < 2 {
                    return Err(shape_error(
                        *self,
                        &format!("expected at least 2 options, got {}", answers.len()),
                    ));
                }
                if correct == 0 {
                    return Err(shape_error(*self, "expected at least 1 correct option"));
                }
            }
            QuestionType::ShortAnswer => {
                if answers.is_empty() {
                    return Err(shape_error(*self, "expected at least 1 accepted answer"));
                }
                if correct != answers.len() {
                    return Err(shape_error(*self, "every accepted answer must carry credit"));
                }
            }
            QuestionType::Matching => {
                if answers.len() < 2 {
                    return Err(shape_error(
                        *self,
                        &format!("expected at least 2 pairs, got {}", answers.len()),
                    ));
                }
                if let Some(bad) = answers.iter().find(|a| split_pair(&a.body).is_none()) {
                    return Err(shape_error(
                        *self,
                        &format!("pair '{}' is not written as 'prompt -> match'", bad.body),
                    ));
                }
            }
            QuestionType::Essay => {
                if !answers.is_empty() {
                    return Err(shape_error(*self, "essay questions take no options"));
                }
            }
        }
        Ok(())
    }

    fn render_answer_options(&self, answers: &[Answer]) -> Vec<String> {
        let mut sorted: Vec<&Answer> = answers.iter().collect();
        sorted.sort_by_key(|a| a.sort_order);

        match self {
            QuestionType::Essay => Vec::new(),
            QuestionType::TrueFalse => sorted
                .iter()
                .map(|a| {
                    let mark = if a.is_correct() { " (correct)" } else { "" };
                    format!("{}{}", a.body.trim(), mark)
                })
                .collect(),
            QuestionType::Matching => sorted
                .iter()
                .map(|a| match split_pair(&a.body) {
                    Some((prompt, matched)) => format!("{} \u{2192} {}", prompt, matched),
                    None => a.body.trim().to_string(),
                })
                .collect(),
            QuestionType::ShortAnswer => sorted
                .iter()
                .map(|a| format!("Accepted: {}", a.body.trim()))
                .collect(),
            QuestionType::MultipleChoice
            | QuestionType::MultipleResponse
            | QuestionType::Scenario => sorted
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    let label = option_label(i);
                    if a.is_correct() {
                        format!("{}. {} ({}%)", label, a.body.trim(), weight_percent(a.weight))
                    } else {
                        format!("{}. {}", label, a.body.trim())
                    }
                })
                .collect(),
        }
    }

    fn payload_table(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice
            | QuestionType::MultipleResponse
            | QuestionType::Scenario => "bank_payload_multichoice",
            QuestionType::TrueFalse => "bank_payload_truefalse",
            QuestionType::ShortAnswer => "bank_payload_shortanswer",
            QuestionType::Essay => "bank_payload_essay",
            QuestionType::Matching => "bank_payload_matching",
        }
    }

    fn requires_unique_correct(&self) -> bool {
        matches!(
            self,
            QuestionType::MultipleChoice | QuestionType::TrueFalse | QuestionType::Scenario
        )
    }

    fn needs_distractors(&self) -> bool {
        matches!(
            self,
            QuestionType::MultipleChoice | QuestionType::MultipleResponse | QuestionType::Scenario
        )
    }
}

fn shape_error(qtype: QuestionType, detail: &str) -> Error {
    Error::Validation(format!("{} answers invalid: {}", qtype, detail))
}

/// Split a matching answer body into (prompt, match).
pub fn split_pair(body: &str) -> Option<(&str, &str)> {
    let (prompt, matched) = body.split_once(MATCHING_SEPARATOR)?;
    let (prompt, matched) = (prompt.trim(), matched.trim());
    if prompt.is_empty() || matched.is_empty() {
        None
    } else {
        Some((prompt, matched))
    }
}

fn option_label(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letter, index / 26)
    }
}

fn weight_percent(weight: f64) -> i64 {
    (weight * 100.0).round() as i64
}

/// Quality score (0-100) for a generated draft.
///
/// A draft whose answers fail `validate_answer_shape` scores 0. Otherwise
/// points are deducted for a thin stem and missing feedback or reasoning.
pub fn score_draft(draft: &QuestionDraft) -> f32 {
    if draft
        .question_type
        .validate_answer_shape(&draft.answers)
        .is_err()
    {
        return 0.0;
    }

    let mut score: f32 = 100.0;
    let body_len = draft.body.trim().chars().count();
    if body_len < 20 {
        score -= 30.0;
    } else if body_len < 40 {
        score -= 10.0;
    }
    if draft.general_feedback.trim().is_empty() {
        score -= 15.0;
    }
    if draft.ai_reasoning.trim().is_empty() {
        score -= 5.0;
    }
    let unexplained = draft
        .answers
        .iter()
        .filter(|a| a.feedback.trim().is_empty())
        .count();
    score -= (unexplained as f32 * 5.0).min(20.0);
    if draft.question_type == QuestionType::MultipleChoice
        && draft.answers.len() < crate::defaults::DISTRACTOR_TARGET
    {
        score -= 10.0;
    }
    score.clamp(0.0, 100.0)
}
