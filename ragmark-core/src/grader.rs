//! Exam grading over the RAG pipeline.
//!
//! [`ExamGrader`] retrieves supporting context for each question, asks
//! the answer generator to grade the student answer against the
//! reference answer, and extracts a numeric score plus structured
//! feedback from the model output.
//!
//! Score contract: an integer in 0–100. Extraction is deterministic:
//! fenced code blocks are stripped, the first JSON object is parsed for a
//! numeric `score`, and only then a small set of regex fallbacks is
//! tried. Output with no extractable score, or a score outside the
//! range, raises [`RagError::GradingParse`] — never a default score.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::RagEngine;
use crate::error::{RagError, Result};
use crate::prompt;

/// Score at or above which an answer counts as correct when the model
/// does not state `is_correct` itself.
const PASS_SCORE: u8 = 50;

/// One exam item: a question with the student's and the reference answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamItem {
    /// The exam question.
    pub question: String,
    /// The answer the student gave.
    pub student_answer: String,
    /// The reference answer to grade against.
    pub correct_answer: String,
}

/// The graded result for a single exam item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    /// The exam question.
    pub question: String,
    /// The answer the student gave.
    pub student_answer: String,
    /// The reference answer.
    pub correct_answer: String,
    /// Score in 0–100.
    pub score: u8,
    /// Whether the answer counts as correct.
    pub is_correct: bool,
    /// Free-text feedback from the grader.
    pub feedback: String,
    /// Points the student covered.
    pub key_points_covered: Vec<String>,
    /// Points the student missed.
    pub missing_points: Vec<String>,
    /// The retrieved context the grading was based on.
    pub retrieved_context: String,
}

/// A batch entry: either a grading result or a per-item failure marker.
///
/// One malformed item never voids the whole run; its failure is recorded
/// here and the batch continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GradedItem {
    /// The item was graded successfully.
    Graded {
        /// 1-based position in the exam.
        number: usize,
        /// The grading result.
        #[serde(flatten)]
        result: GradingResult,
    },
    /// Grading this item failed.
    Failed {
        /// 1-based position in the exam.
        number: usize,
        /// The exam question, for the report.
        question: String,
        /// Why grading failed.
        error: String,
    },
}

impl GradedItem {
    /// The score, if this item was graded.
    pub fn score(&self) -> Option<u8> {
        match self {
            GradedItem::Graded { result, .. } => Some(result.score),
            GradedItem::Failed { .. } => None,
        }
    }

    /// Whether this item was graded successfully.
    pub fn is_graded(&self) -> bool {
        matches!(self, GradedItem::Graded { .. })
    }
}

/// Aggregate statistics over a graded exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSummary {
    /// Items graded correct.
    pub num_correct: usize,
    /// Items graded incorrect.
    pub num_incorrect: usize,
    /// Items whose grading failed.
    pub num_failed: usize,
    /// Mean score over graded items.
    pub average_score: f32,
    /// Whether the average score reaches the pass mark.
    pub passed: bool,
}

/// The full outcome of grading an exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamOutcome {
    /// Per-item results, in exam order.
    pub items: Vec<GradedItem>,
    /// Sum of scores over graded items.
    pub total_score: u32,
    /// Maximum possible score (100 per item).
    pub max_score: u32,
    /// `total_score` as a percentage of `max_score`.
    pub percentage: f32,
    /// Number of items in the exam.
    pub num_questions: usize,
    /// Aggregate statistics.
    pub summary: ExamSummary,
}

/// Grades exam answers using the engine's retrieval and generator.
pub struct ExamGrader {
    engine: Arc<RagEngine>,
}

impl ExamGrader {
    /// Create a grader over an initialized engine.
    pub fn new(engine: Arc<RagEngine>) -> Self {
        Self { engine }
    }

    /// Grade one answer: retrieve context for the question, ask the
    /// generator for a structured grade, and parse it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GradingParse`] when the model output violates
    /// the score contract, and propagates retrieval/generation errors.
    pub async fn grade_answer(
        &self,
        question: &str,
        student_answer: &str,
        correct_answer: &str,
    ) -> Result<GradingResult> {
        let chunks = self.engine.retrieve(question).await?;
        let context = prompt::format_context(&chunks);
        let grading_prompt =
            prompt::grading_prompt(&context, question, correct_answer, student_answer);

        let raw = self.engine.generator().generate(&grading_prompt).await?;
        let parsed = parse_grading_response(&raw)?;

        info!(score = parsed.score, "graded answer");
        Ok(GradingResult {
            question: question.to_string(),
            student_answer: student_answer.to_string(),
            correct_answer: correct_answer.to_string(),
            score: parsed.score,
            is_correct: parsed.is_correct.unwrap_or(parsed.score >= PASS_SCORE),
            feedback: parsed.feedback.unwrap_or_else(|| raw.trim().to_string()),
            key_points_covered: parsed.key_points_covered,
            missing_points: parsed.missing_points,
            retrieved_context: context,
        })
    }

    /// Grade a whole exam with per-item failure isolation.
    pub async fn grade_exam(&self, items: &[ExamItem]) -> Result<ExamOutcome> {
        self.grade_exam_with(items, &CancellationToken::new()).await
    }

    /// [`grade_exam`](ExamGrader::grade_exam) with cooperative
    /// cancellation, checked between items.
    pub async fn grade_exam_with(
        &self,
        items: &[ExamItem],
        cancel: &CancellationToken,
    ) -> Result<ExamOutcome> {
        info!(items = items.len(), "grading exam");
        let mut graded = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled);
            }
            let number = i + 1;
            match self
                .grade_answer(&item.question, &item.student_answer, &item.correct_answer)
                .await
            {
                Ok(result) => graded.push(GradedItem::Graded { number, result }),
                Err(e) => {
                    warn!(number, error = %e, "grading failed for item, continuing");
                    graded.push(GradedItem::Failed {
                        number,
                        question: item.question.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summarize(graded))
    }
}

fn summarize(items: Vec<GradedItem>) -> ExamOutcome {
    let num_questions = items.len();
    let max_score = num_questions as u32 * 100;
    let total_score: u32 = items.iter().filter_map(|i| i.score().map(u32::from)).sum();

    let num_graded = items.iter().filter(|i| i.is_graded()).count();
    let num_failed = num_questions - num_graded;
    let num_correct = items
        .iter()
        .filter(|i| matches!(i, GradedItem::Graded { result, .. } if result.is_correct))
        .count();
    let num_incorrect = num_graded - num_correct;

    let average_score =
        if num_graded > 0 { total_score as f32 / num_graded as f32 } else { 0.0 };
    let percentage =
        if max_score > 0 { total_score as f32 / max_score as f32 * 100.0 } else { 0.0 };

    ExamOutcome {
        items,
        total_score,
        max_score,
        percentage,
        num_questions,
        summary: ExamSummary {
            num_correct,
            num_incorrect,
            num_failed,
            average_score,
            passed: average_score >= PASS_SCORE as f32,
        },
    }
}

/// Render a human-readable grading report.
pub fn render_report(outcome: &ExamOutcome) -> String {
    let mut report = String::new();
    let rule = "=".repeat(60);

    report.push_str(&rule);
    report.push_str("\nExam grading report\n");
    report.push_str(&rule);
    report.push_str(&format!(
        "\n\nTotal score: {}/{}\nPercentage: {:.1}%\nCorrect answers: {}/{}\nResult: {}\n",
        outcome.total_score,
        outcome.max_score,
        outcome.percentage,
        outcome.summary.num_correct,
        outcome.num_questions,
        if outcome.summary.passed { "pass" } else { "fail" },
    ));
    if outcome.summary.num_failed > 0 {
        report.push_str(&format!("Items not graded: {}\n", outcome.summary.num_failed));
    }

    report.push_str(&format!("\n{rule}\nPer-question detail\n{rule}\n"));
    for item in &outcome.items {
        match item {
            GradedItem::Graded { number, result } => {
                report.push_str(&format!(
                    "\nQuestion {number}: {}\nScore: {}/100 ({})\n\nStudent answer:\n{}\n\nReference answer:\n{}\n\nFeedback:\n{}\n",
                    result.question,
                    result.score,
                    if result.is_correct { "correct" } else { "incorrect" },
                    result.student_answer,
                    result.correct_answer,
                    result.feedback,
                ));
                if !result.key_points_covered.is_empty() {
                    report.push_str("\nPoints covered:\n");
                    for point in &result.key_points_covered {
                        report.push_str(&format!("  - {point}\n"));
                    }
                }
                if !result.missing_points.is_empty() {
                    report.push_str("\nPoints missing:\n");
                    for point in &result.missing_points {
                        report.push_str(&format!("  - {point}\n"));
                    }
                }
            }
            GradedItem::Failed { number, question, error } => {
                report.push_str(&format!(
                    "\nQuestion {number}: {question}\nNot graded: {error}\n"
                ));
            }
        }
        report.push_str(&format!("\n{}\n", "-".repeat(60)));
    }

    report
}

// ── Score extraction ───────────────────────────────────────────────

#[derive(Debug)]
struct ParsedGrading {
    score: u8,
    is_correct: Option<bool>,
    feedback: Option<String>,
    key_points_covered: Vec<String>,
    missing_points: Vec<String>,
}

static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""score"\s*:\s*(-?\d+(?:\.\d+)?)"#,
        r"(?i)\bscore\b\s*[:=]?\s*(-?\d+(?:\.\d+)?)",
        r"(-?\d+(?:\.\d+)?)\s*/\s*100",
        r"(-?\d+(?:\.\d+)?)\s*%",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("score pattern is valid"))
    .collect()
});

/// Extract a grading structure from raw model output.
fn parse_grading_response(raw: &str) -> Result<ParsedGrading> {
    let cleaned = strip_code_fences(raw);

    if let Some(object) = first_json_object(cleaned) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(object) {
            if let Some(score) = value.get("score").and_then(|s| s.as_f64()) {
                return Ok(ParsedGrading {
                    score: validate_score(score)?,
                    is_correct: value.get("is_correct").and_then(|v| v.as_bool()),
                    feedback: value
                        .get("feedback")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    key_points_covered: string_array(&value, "key_points_covered"),
                    missing_points: string_array(&value, "missing_points"),
                });
            }
        }
    }

    // Fallback: scan the raw text for a score expression.
    for pattern in SCORE_PATTERNS.iter() {
        if let Some(capture) = pattern.captures(cleaned) {
            let number: f64 = capture[1].parse().map_err(|_| RagError::GradingParse {
                message: format!("unparseable score '{}'", &capture[1]),
            })?;
            return Ok(ParsedGrading {
                score: validate_score(number)?,
                is_correct: None,
                feedback: None,
                key_points_covered: Vec::new(),
                missing_points: Vec::new(),
            });
        }
    }

    Err(RagError::GradingParse {
        message: format!(
            "no numeric score found in generator output ({} chars)",
            raw.chars().count()
        ),
    })
}

fn validate_score(score: f64) -> Result<u8> {
    if !(0.0..=100.0).contains(&score) {
        return Err(RagError::GradingParse {
            message: format!("score {score} is outside the 0-100 range"),
        });
    }
    Ok(score.round() as u8)
}

/// Drop markdown code fences, keeping their content.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the optional language tag on the fence line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.rsplit_once("```").map(|(body, _)| body).unwrap_or(body).trim()
}

/// The first balanced top-level JSON object in `text`, if any.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_json() {
        let raw = r#"{"score": 85, "is_correct": true, "feedback": "good",
                      "key_points_covered": ["P term"], "missing_points": []}"#;
        let parsed = parse_grading_response(raw).unwrap();
        assert_eq!(parsed.score, 85);
        assert_eq!(parsed.is_correct, Some(true));
        assert_eq!(parsed.feedback.as_deref(), Some("good"));
        assert_eq!(parsed.key_points_covered, vec!["P term"]);
    }

    #[test]
    fn parses_json_inside_code_fences() {
        let raw = "```json\n{\"score\": 70, \"is_correct\": false, \"feedback\": \"partial\"}\n```";
        let parsed = parse_grading_response(raw).unwrap();
        assert_eq!(parsed.score, 70);
        assert_eq!(parsed.is_correct, Some(false));
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let raw = "Here is my assessment: {\"score\": 90} — well done.";
        assert_eq!(parse_grading_response(raw).unwrap().score, 90);
    }

    #[test]
    fn falls_back_to_score_expressions() {
        assert_eq!(parse_grading_response("I would give this 75/100.").unwrap().score, 75);
        assert_eq!(parse_grading_response("Score: 60").unwrap().score, 60);
        assert_eq!(parse_grading_response("The answer deserves 80%").unwrap().score, 80);
    }

    #[test]
    fn missing_score_is_a_parse_error() {
        let err = parse_grading_response("The answer is quite good overall.").unwrap_err();
        assert!(matches!(err, RagError::GradingParse { .. }));
    }

    #[test]
    fn out_of_range_score_is_a_parse_error_not_a_clamp() {
        let err = parse_grading_response(r#"{"score": 150}"#).unwrap_err();
        assert!(matches!(err, RagError::GradingParse { .. }));
        let err = parse_grading_response(r#"{"score": -5}"#).unwrap_err();
        assert!(matches!(err, RagError::GradingParse { .. }));
    }

    #[test]
    fn fractional_scores_round() {
        assert_eq!(parse_grading_response(r#"{"score": 87.5}"#).unwrap().score, 88);
    }

    #[test]
    fn nested_json_objects_are_balanced() {
        let raw = r#"{"score": 40, "detail": {"inner": "with } brace in string"}}"#;
        assert_eq!(parse_grading_response(raw).unwrap().score, 40);
    }

    #[test]
    fn summary_counts_failed_items() {
        let result = GradingResult {
            question: "q".into(),
            student_answer: "s".into(),
            correct_answer: "c".into(),
            score: 80,
            is_correct: true,
            feedback: "ok".into(),
            key_points_covered: vec![],
            missing_points: vec![],
            retrieved_context: String::new(),
        };
        let items = vec![
            GradedItem::Graded { number: 1, result: result.clone() },
            GradedItem::Failed { number: 2, question: "q2".into(), error: "parse".into() },
        ];
        let outcome = summarize(items);
        assert_eq!(outcome.total_score, 80);
        assert_eq!(outcome.max_score, 200);
        assert_eq!(outcome.summary.num_failed, 1);
        assert_eq!(outcome.summary.num_correct, 1);
        assert_eq!(outcome.summary.average_score, 80.0);
    }
}
