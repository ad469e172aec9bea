//! Gateway wire format.
//!
//! Requests are `{"quality": ..., "payload": {...}}`; successful responses
//! carry `{"content": ...}` and failures `{"error": "..."}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quizgen_core::{AnswerDraft, CognitiveLevel, Difficulty, QuestionDraft, QuestionType};

#[derive(Debug, Serialize)]
pub(crate) struct GatewayRequest<'a, P: Serialize> {
    pub quality: &'a str,
    pub payload: P,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GatewayResponse {
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GatewayError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzePayload<'a> {
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct GeneratePayload<'a> {
    pub topic_title: &'a str,
    pub topic_content: &'a str,
    /// One entry per requested question.
    pub question_types: Vec<&'static str>,
    pub difficulty_distribution: BTreeMap<&'static str, u32>,
    pub blooms_distribution: BTreeMap<&'static str, u32>,
    pub num_questions: u32,
    pub existing_questions: &'a [String],
    pub is_regeneration: bool,
    pub old_question_text: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefinePayload<'a> {
    pub existing_question: &'a str,
    pub topic_title: &'a str,
    pub topic_content: &'a str,
    pub question_type: &'static str,
    pub difficulty: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DistractorPayload<'a> {
    pub question_text: &'a str,
    pub correct_answer: &'a str,
    pub difficulty: &'static str,
    pub num_distractors: usize,
}

/// `/generate_key` reads its fields from the top level, not from a payload.
#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeyRequest<'a> {
    pub quality: &'a str,
    pub question: &'a str,
    pub question_text: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireAnswer {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub fraction: f64,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireQuestion {
    #[serde(default)]
    pub questiontext: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub blooms_level: Option<String>,
    #[serde(default)]
    pub answers: Vec<WireAnswer>,
    #[serde(default)]
    pub generalfeedback: Value,
    #[serde(default)]
    pub ai_reasoning: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireDistractor {
    /// `{"text": ..., "reasoning": ...}`; the reasoning is not kept.
    Detailed { text: String },
    Plain(String),
}

impl WireDistractor {
    pub fn into_text(self) -> String {
        match self {
            WireDistractor::Detailed { text, .. } => text,
            WireDistractor::Plain(text) => text,
        }
    }
}

/// Models return fractions as 0..1 or as percentages.
fn normalize_fraction(fraction: f64) -> f64 {
    if fraction > 1.0 {
        (fraction / 100.0).min(1.0)
    } else {
        fraction.max(0.0)
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

impl WireQuestion {
    /// Convert into a draft of the requested type.
    ///
    /// Unknown difficulty or cognitive labels fall back to the given defaults.
    pub fn into_draft(
        self,
        question_type: QuestionType,
        default_difficulty: Difficulty,
    ) -> QuestionDraft {
        QuestionDraft {
            question_type,
            difficulty: self
                .difficulty
                .and_then(|d| d.parse().ok())
                .unwrap_or(default_difficulty),
            cognitive_level: self
                .blooms_level
                .and_then(|b| b.parse().ok())
                .unwrap_or(CognitiveLevel::Understand),
            body: self.questiontext.trim().to_string(),
            general_feedback: text_value(&self.generalfeedback),
            ai_reasoning: text_value(&self.ai_reasoning),
            answers: self
                .answers
                .into_iter()
                .filter(|a| !a.text.trim().is_empty())
                .map(|a| AnswerDraft {
                    body: a.text.trim().to_string(),
                    weight: normalize_fraction(a.fraction),
                    feedback: a.feedback,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_question_into_draft() {
        let wire: WireQuestion = serde_json::from_value(json!({
            "questiontext": " What produces ATP? ",
            "difficulty": "hard",
            "blooms_level": "apply",
            "answers": [
                {"text": "Mitochondria", "fraction": 100, "feedback": "Yes"},
                {"text": "Ribosome", "fraction": 0},
                {"text": "  ", "fraction": 0}
            ],
            "generalfeedback": "Powerhouse.",
            "ai_reasoning": "Recall"
        }))
        .unwrap();
        let draft = wire.into_draft(QuestionType::MultipleChoice, Difficulty::Medium);
        assert_eq!(draft.body, "What produces ATP?");
        assert_eq!(draft.difficulty, Difficulty::Hard);
        assert_eq!(draft.cognitive_level, CognitiveLevel::Apply);
        assert_eq!(draft.answers.len(), 2);
        assert_eq!(draft.answers[0].weight, 1.0);
        assert_eq!(draft.answers[0].feedback, "Yes");
    }

    #[test]
    fn test_unknown_labels_fall_back() {
        let wire: WireQuestion = serde_json::from_value(json!({
            "questiontext": "Define osmosis.",
            "difficulty": "brutal",
            "blooms_level": "memorize",
            "generalfeedback": {"model_answer": "Water moves."}
        }))
        .unwrap();
        let draft = wire.into_draft(QuestionType::Essay, Difficulty::Easy);
        assert_eq!(draft.difficulty, Difficulty::Easy);
        assert_eq!(draft.cognitive_level, CognitiveLevel::Understand);
        assert!(draft.general_feedback.contains("Water moves."));
    }

    #[test]
    fn test_distractor_shapes() {
        let list: Vec<WireDistractor> = serde_json::from_value(json!([
            {"text": "Golgi body", "reasoning": "Also an organelle"},
            "Nucleus"
        ]))
        .unwrap();
        let texts: Vec<String> = list.into_iter().map(WireDistractor::into_text).collect();
        assert_eq!(texts, vec!["Golgi body", "Nucleus"]);
    }
}
