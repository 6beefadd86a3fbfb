use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, RagConfig};
use crate::gateway::{Gateway, OpenAiGateway};
use crate::history::ConversationStore;
use crate::pipeline::RagPipeline;
use crate::rag::VectorIndex;
use crate::session::SessionOrchestrator;

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
///
/// Every component receives its slice of the immutable [`RagConfig`] at
/// construction; nothing reads configuration after startup.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<RagConfig>,
    pub index: Arc<VectorIndex>,
    pub pipeline: Arc<RagPipeline>,
    pub conversations: Arc<ConversationStore>,
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    /// Loads configuration for `paths` and wires the OpenAI-compatible
    /// gateway into every component.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone())
            .load_config()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let gateway: Arc<dyn Gateway> = Arc::new(
            OpenAiGateway::new(&config.gateway)
                .map_err(|e| InitializationError::Gateway(e.into()))?,
        );
        if config.gateway.api_key.is_none() {
            tracing::warn!("No API key configured; gateway requests will be rejected upstream");
        }

        Self::with_gateway(paths, config, gateway).await
    }

    /// Builds the state around an already constructed gateway.
    pub async fn with_gateway(
        paths: Arc<AppPaths>,
        config: RagConfig,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Arc<Self>, InitializationError> {
        let vector_dir = config
            .index
            .persist_dir
            .as_deref()
            .map(|raw| paths.resolve(raw))
            .unwrap_or_else(|| paths.vector_dir.clone());

        let index = Arc::new(
            VectorIndex::open(vector_dir, config.index.clone(), gateway.clone())
                .await
                .map_err(|e| InitializationError::Index(e.into()))?,
        );

        let pipeline = Arc::new(RagPipeline::new(
            index.clone(),
            gateway,
            config.pipeline.clone(),
        ));

        let conversations = Arc::new(
            ConversationStore::open(paths.conversations_dir.clone(), config.conversation.clone())
                .await
                .map_err(|e| InitializationError::Conversations(e.into()))?,
        );

        let orchestrator = Arc::new(SessionOrchestrator::new(
            pipeline.clone(),
            conversations.clone(),
            config.conversation.clone(),
        ));

        tracing::info!(
            vector_dir = %index.dir().display(),
            conversations_dir = %conversations.dir().display(),
            "Application state initialized"
        );

        Ok(Arc::new(Self {
            paths,
            config: Arc::new(config),
            index,
            pipeline,
            conversations,
            orchestrator,
        }))
    }
}
