//! Interpretation of raw model replies.

use serde_json::Value;

use crate::error::AppError;

/// What the model said about one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelVerdict {
    /// Structured data was found.
    Data(Value),
    /// The model signalled there is nothing relevant in the file.
    NothingRelevant,
}

/// Parse a model reply into a verdict.
///
/// Strips a surrounding markdown code fence, then treats an empty reply,
/// `null`, `{}`, `[]`, `""`, and `false` as "nothing relevant". Anything
/// that still fails to parse is [`AppError::MalformedOutput`].
pub fn parse_reply(raw: &str) -> Result<ModelVerdict, AppError> {
    let body = strip_code_fence(raw);

    if body.is_empty() || body.eq_ignore_ascii_case("null") {
        return Ok(ModelVerdict::NothingRelevant);
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        AppError::MalformedOutput(format!("{e}. Raw: {}", preview(body)))
    })?;

    if is_empty_value(&value) {
        Ok(ModelVerdict::NothingRelevant)
    } else {
        Ok(ModelVerdict::Data(value))
    }
}

/// Accept any non-blank reply as plain text (used for prompt refinement).
pub fn parse_text(raw: &str) -> Result<String, AppError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        Err(AppError::MalformedOutput("empty reply".into()))
    } else {
        Ok(text.to_string())
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}
