//! Binds pipeline runs to persisted conversations.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::core::config::ConversationConfig;
use crate::core::errors::RagError;
use crate::core::text::truncate_chars;
use crate::history::ConversationStore;
use crate::pipeline::{Answer, HistoryTurn, RagPipeline, Role};

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub answer: Answer,
    /// Bounded history window after both turns were appended.
    pub history: Vec<HistoryTurn>,
}

pub struct SessionOrchestrator {
    pipeline: Arc<RagPipeline>,
    conversations: Arc<ConversationStore>,
    config: ConversationConfig,
}

impl SessionOrchestrator {
    pub fn new(
        pipeline: Arc<RagPipeline>,
        conversations: Arc<ConversationStore>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            pipeline,
            conversations,
            config,
        }
    }

    /// Answers `question` inside a conversation, creating one when
    /// `session_id` is `None`.
    pub async fn ask(&self, session_id: Option<&str>, question: &str) -> Result<TurnOutcome, RagError> {
        let history = match session_id {
            Some(id) => {
                if !self.conversations.exists(id).await {
                    return Err(RagError::SessionNotFound(id.to_string()));
                }
                self.conversations.get_history(id).await?
            }
            None => Vec::new(),
        };

        // A run that fails fast must not leave an empty conversation behind.
        let answer = self.pipeline.run(question, &history).await?;

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => {
                let title = self.title_for(question);
                self.conversations.create(Some(&title)).await?
            }
        };

        let recorded = self
            .conversations
            .append(&session_id, Role::User, question, None)
            .await?
            && self
                .conversations
                .append(
                    &session_id,
                    Role::Assistant,
                    &answer.answer,
                    Some(answer.metadata()),
                )
                .await?;
        // The session was deleted while the pipeline ran.
        if !recorded {
            return Err(RagError::SessionNotFound(session_id));
        }

        let full = self.conversations.get_history(&session_id).await?;
        let start = full.len().saturating_sub(self.pipeline.max_history_turns());
        let history = full[start..].to_vec();

        info!(
            session_id = %session_id,
            confidence = answer.confidence,
            "Conversation turn recorded"
        );

        Ok(TurnOutcome {
            session_id,
            answer,
            history,
        })
    }

    fn title_for(&self, question: &str) -> String {
        let question = question.trim();
        let prefix = truncate_chars(question, self.config.title_prefix_chars);
        if prefix.len() < question.len() {
            format!("{}...", prefix)
        } else {
            prefix.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{IndexConfig, PipelineConfig};
    use crate::gateway::mock::{Completion, MockGateway};
    use crate::rag::{Chunk, VectorIndex};

    struct Fixture {
        _tmp: tempfile::TempDir,
        gateway: Arc<MockGateway>,
        conversations: Arc<ConversationStore>,
        orchestrator: SessionOrchestrator,
    }

    async fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let gateway = Arc::new(MockGateway::new());
        let index = Arc::new(
            VectorIndex::open(tmp.path().join("vectors"), IndexConfig::default(), gateway.clone())
                .await
                .unwrap(),
        );
        index
            .ingest(vec![Chunk::new(
                "Bacteria X degrades compound Y in aerobic soil",
                "a.pdf",
            )])
            .await
            .unwrap();

        let pipeline = Arc::new(RagPipeline::new(
            index,
            gateway.clone(),
            PipelineConfig::default(),
        ));
        let conversations = Arc::new(
            ConversationStore::open(tmp.path().join("conversations"), ConversationConfig::default())
                .await
                .unwrap(),
        );
        let orchestrator =
            SessionOrchestrator::new(pipeline, conversations.clone(), ConversationConfig::default());

        Fixture {
            _tmp: tmp,
            gateway,
            conversations,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn first_question_creates_titled_session() {
        let fx = fixture().await;
        let question = "Which organisms are able to degrade compound Y in soil under aerobic conditions?";

        let outcome = fx.orchestrator.ask(None, question).await.unwrap();

        let session = fx
            .conversations
            .get(&outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.title, format!("{}...", &question[..50]));
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.turn_count, 1);
        assert_eq!(session.messages[1].content, outcome.answer.answer);
        assert!(session.messages[1].metadata.is_some());
        assert_eq!(outcome.history.len(), 2);
    }

    #[tokio::test]
    async fn follow_up_sees_previous_turns() {
        let fx = fixture().await;
        let first = fx.orchestrator.ask(None, "What degrades Y?").await.unwrap();

        fx.gateway.push_completion(Completion::Reply(
            r#"{"answer": "Yes, under aerobic conditions.", "confidence": 0.7}"#.to_string(),
        ));
        let second = fx
            .orchestrator
            .ask(Some(&first.session_id), "Does it need oxygen?")
            .await
            .unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.history.len(), 4);
        let prompts = fx.gateway.prompts();
        assert!(prompts[1].1.contains("USER: What degrades Y?"));
    }

    #[tokio::test]
    async fn history_window_is_bounded() {
        let fx = fixture().await;
        let id = fx.orchestrator.ask(None, "q0").await.unwrap().session_id;
        let mut last = None;
        for i in 1..6 {
            last = Some(
                fx.orchestrator
                    .ask(Some(&id), &format!("q{}", i))
                    .await
                    .unwrap(),
            );
        }
        let last = last.unwrap();
        assert_eq!(last.history.len(), 8);
        assert_eq!(last.history[7].role, Role::Assistant);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .orchestrator
            .ask(Some("000000000000"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn session_deleted_during_run_is_reported() {
        let fx = fixture().await;
        let id = fx.conversations.create(Some("short lived")).await.unwrap();
        fx.gateway.push_completion(Completion::Delayed(
            std::time::Duration::from_millis(300),
            r#"{"answer": "late", "confidence": 0.5}"#.to_string(),
        ));

        let ask = fx.orchestrator.ask(Some(&id), "What degrades Y?");
        let delete = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            fx.conversations.delete(&id).await.unwrap()
        };
        let (outcome, deleted) = tokio::join!(ask, delete);

        assert!(deleted);
        assert!(matches!(outcome, Err(RagError::SessionNotFound(ref missing)) if missing == &id));
        assert!(!fx.conversations.exists(&id).await);
    }

    #[tokio::test]
    async fn degraded_answers_are_still_recorded() {
        let fx = fixture().await;
        fx.gateway.push_completion(Completion::Transient);

        let outcome = fx.orchestrator.ask(None, "What degrades Y?").await.unwrap();
        assert_eq!(outcome.answer.confidence, 0.0);

        let messages = fx.conversations.messages(&outcome.session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        let meta = messages[1].metadata.as_ref().unwrap();
        assert_eq!(meta.confidence, 0.0);
        assert!(!meta.suggestions.is_empty());
    }
}
