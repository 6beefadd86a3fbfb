use crate::core::text::truncate_chars;
use crate::rag::ScoredChunk;

use super::state::HistoryTurn;

pub const NO_HISTORY: &str = "No previous conversation";

pub const SYSTEM_PROMPT: &str = r#"You are a senior research scientist in microbiology and biotechnology, advising colleagues who are reading the same set of papers.

Answer strictly from the numbered sources you are given, citing them by number. When the sources do not settle a point, say so plainly.

Reply with one JSON object and nothing else:
{
  "answer": "direct answer to the question",
  "reasoning": "the mechanisms and evidence behind the answer",
  "hypothesis": "one testable hypothesis suggested by the evidence",
  "suggestions": ["follow-up question or experiment", "..."],
  "sources": [{"index": 1, "source": "source id", "page": 3, "excerpt": "short supporting quote"}],
  "confidence": 0.0
}

"confidence" is a number between 0 and 1 reflecting how well the sources support the answer."#;

/// Numbered context block from at most `max_chunks` hits, each cut to
/// `char_budget` characters.
pub fn build_context(retrieved: &[ScoredChunk], max_chunks: usize, char_budget: usize) -> String {
    if retrieved.is_empty() {
        return "No documents were retrieved.".to_string();
    }

    retrieved
        .iter()
        .take(max_chunks)
        .enumerate()
        .map(|(i, hit)| {
            let chunk = &hit.chunk;
            let page = chunk
                .page
                .map(|p| p.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "[Source {}] {} (page {}, type {})\n{}\n",
                i + 1,
                chunk.origin_file,
                page,
                chunk.kind.as_str(),
                truncate_chars(&chunk.content, char_budget)
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Newest `max_turns` turns as `ROLE: text`, each cut to `turn_chars`.
pub fn format_history(history: &[HistoryTurn], max_turns: usize, turn_chars: usize) -> String {
    let start = history.len().saturating_sub(max_turns);
    let recent = &history[start..];
    if recent.is_empty() {
        return NO_HISTORY.to_string();
    }

    recent
        .iter()
        .map(|turn| {
            format!(
                "{}: {}",
                turn.role.as_str().to_uppercase(),
                truncate_chars(&turn.content, turn_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn user_prompt(question: &str, context: &str, history: &str) -> String {
    format!(
        "Question:\n{}\n\nSources:\n{}\n\nConversation so far:\n{}\n\nRespond with the JSON object described in your instructions.",
        question, context, history
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::Role;
    use crate::rag::Chunk;

    #[test]
    fn history_keeps_last_turns_and_truncates() {
        let history: Vec<HistoryTurn> = (0..20)
            .map(|i| HistoryTurn::new(Role::User, format!("question-{:02} {}", i, "x".repeat(300))))
            .collect();
        let text = format_history(&history, 8, 200);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[0].starts_with("USER: question-12"));
        assert!(!text.contains("question-11"));
        assert!(lines.iter().all(|l| l.chars().count() <= "USER: ".len() + 200));
    }

    #[test]
    fn empty_history_has_placeholder() {
        assert_eq!(format_history(&[], 8, 200), NO_HISTORY);
        let one = [HistoryTurn::new(Role::Assistant, "hi")];
        assert_eq!(format_history(&one, 0, 200), NO_HISTORY);
    }

    #[test]
    fn context_is_bounded() {
        let hits: Vec<ScoredChunk> = (0..20)
            .map(|i| ScoredChunk {
                chunk: Chunk::new(format!("chunk-{} {}", i, "y".repeat(2000)), "a.pdf"),
                score: 1.0,
            })
            .collect();
        let context = build_context(&hits, 15, 1000);

        assert!(context.contains("[Source 15]"));
        assert!(!context.contains("[Source 16]"));
        assert!(!context.contains(&"y".repeat(1000)));
    }
}
