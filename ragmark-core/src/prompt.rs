//! Prompt templates for answering and grading.

use crate::document::ScoredChunk;

/// Marker inserted in place of context when retrieval returns nothing.
///
/// Generation always proceeds — with this marker the model can say it
/// does not know, instead of the caller inferring meaning from silence.
pub const NO_CONTEXT_MARKER: &str = "No relevant context was found in the knowledge base.";

/// Format retrieved chunks as numbered `[Source N]` blocks.
///
/// Returns [`NO_CONTEXT_MARKER`] when `chunks` is empty.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let source = chunk.source.get("source").map(String::as_str).unwrap_or("unknown");
        out.push_str(&format!("[Source {}] ({})\n{}\n\n", i + 1, source, chunk.text));
    }
    out.trim_end().to_string()
}

/// Build the question-answering prompt from context and question.
pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert assistant for a control-systems course.\n\
         Answer the question using only the context below.\n\
         If the context does not contain the answer, say that you do not know.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// Build the exam-grading prompt.
///
/// Instructs the model to return a JSON object with an integer score in
/// 0–100 plus structured feedback, which [`crate::grader`] parses.
pub fn grading_prompt(
    context: &str,
    question: &str,
    correct_answer: &str,
    student_answer: &str,
) -> String {
    format!(
        "You are an expert control-systems examiner.\n\n\
         Relevant course material:\n{context}\n\n\
         Question: {question}\n\n\
         Reference answer: {correct_answer}\n\n\
         Student answer: {student_answer}\n\n\
         Grade the student answer against the reference answer and the course material.\n\
         Respond with a JSON object only:\n\
         {{\n\
         \x20 \"score\": <integer 0-100>,\n\
         \x20 \"is_correct\": <true|false>,\n\
         \x20 \"feedback\": \"<explanation and suggestions>\",\n\
         \x20 \"key_points_covered\": [\"<points the student got right>\"],\n\
         \x20 \"missing_points\": [\"<points the student missed>\"]\n\
         }}"
    )
}
