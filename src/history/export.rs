use std::fmt::Write;

use super::types::ConversationSession;
use crate::pipeline::{PageRef, Role};

pub(crate) fn render_markdown(session: &ConversationSession) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", session.title);
    let _ = writeln!(
        out,
        "\n_Created {} · Updated {} · {} questions_\n",
        session.created_at.format("%Y-%m-%d %H:%M UTC"),
        session.updated_at.format("%Y-%m-%d %H:%M UTC"),
        session.turn_count
    );

    for message in &session.messages {
        let heading = match message.role {
            Role::User => "Question",
            Role::Assistant => "Answer",
        };
        let _ = writeln!(
            out,
            "## {} ({})\n\n{}\n",
            heading,
            message.timestamp.format("%Y-%m-%d %H:%M:%S"),
            message.content
        );

        let Some(meta) = &message.metadata else {
            continue;
        };
        if !meta.reasoning.is_empty() {
            let _ = writeln!(out, "**Reasoning:** {}\n", meta.reasoning);
        }
        if !meta.hypothesis.is_empty() {
            let _ = writeln!(out, "**Hypothesis:** {}\n", meta.hypothesis);
        }
        if !meta.suggestions.is_empty() {
            let _ = writeln!(out, "**Suggestions:**");
            for suggestion in &meta.suggestions {
                let _ = writeln!(out, "- {}", suggestion);
            }
            out.push('\n');
        }
        if !meta.sources.is_empty() {
            let _ = writeln!(out, "**Sources:**");
            for source in &meta.sources {
                let page = match &source.page {
                    Some(PageRef::Number(n)) => format!(", page {}", n),
                    Some(PageRef::Label(label)) => format!(", page {}", label),
                    None => String::new(),
                };
                let _ = writeln!(out, "- [{}] {}{}", source.index, source.source, page);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "_Confidence: {:.2}_\n", meta.confidence);
    }

    out
}
