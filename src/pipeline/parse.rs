//! Structured completion parsing.
//!
//! Completions are expected to be a single JSON object, optionally wrapped in
//! one markdown code fence. Values of the wrong type are rejected, never
//! coerced.

use serde::Deserialize;

use super::state::Citation;
use crate::core::errors::RagError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StructuredAnswer {
    pub answer: Option<String>,
    pub reasoning: String,
    pub hypothesis: String,
    pub suggestions: Vec<String>,
    pub sources: Vec<Citation>,
    pub confidence: f64,
}

/// Removes one ```json or ``` fence layer, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let body_start = if let Some(pos) = text.find("```json") {
        pos + "```json".len()
    } else if let Some(pos) = text.find("```") {
        pos + "```".len()
    } else {
        return text.trim();
    };

    let body_end = match text.rfind("```") {
        Some(end) if end >= body_start => end,
        _ => text.len(),
    };

    text[body_start..body_end].trim()
}

pub fn parse_structured_answer(raw: &str) -> Result<StructuredAnswer, RagError> {
    let body = strip_code_fence(raw);
    let mut parsed: StructuredAnswer =
        serde_json::from_str(body).map_err(|e| RagError::Parse(e.to_string()))?;

    if !parsed.confidence.is_finite() {
        return Err(RagError::Parse("confidence is not a finite number".to_string()));
    }
    parsed.confidence = parsed.confidence.clamp(0.0, 1.0);
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"answer": "Bacteria X", "reasoning": "Table 2", "hypothesis": "", "suggestions": ["Check pH"], "sources": [{"index": 1, "source": "a.pdf", "page": 3, "excerpt": "degrades"}], "confidence": 0.8}"#;

    #[test]
    fn fenced_and_plain_parse_identically() {
        let plain = parse_structured_answer(BODY).unwrap();
        let json_fenced = parse_structured_answer(&format!("```json\n{}\n```", BODY)).unwrap();
        let bare_fenced =
            parse_structured_answer(&format!("Here you go:\n```\n{}\n```\n", BODY)).unwrap();

        for parsed in [&json_fenced, &bare_fenced] {
            assert_eq!(parsed.answer, plain.answer);
            assert_eq!(parsed.suggestions, plain.suggestions);
            assert_eq!(parsed.sources, plain.sources);
            assert_eq!(parsed.confidence, plain.confidence);
        }
    }

    #[test]
    fn unterminated_fence_uses_rest_of_text() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn missing_fields_default() {
        let parsed = parse_structured_answer(r#"{"answer": "short"}"#).unwrap();
        assert_eq!(parsed.answer.as_deref(), Some("short"));
        assert!(parsed.sources.is_empty());
        assert_eq!(parsed.confidence, 0.0);
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_structured_answer(r#"{"answer": "a", "confidence": "high"}"#).is_err());
        assert!(parse_structured_answer(r#"{"answer": "a", "suggestions": "one"}"#).is_err());
        assert!(parse_structured_answer("plain prose answer").is_err());
    }

    #[test]
    fn confidence_is_clamped() {
        let parsed = parse_structured_answer(r#"{"answer": "a", "confidence": 7}"#).unwrap();
        assert_eq!(parsed.confidence, 1.0);
    }
}
