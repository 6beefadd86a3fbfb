#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jivanu_backend::core::config::{AppPaths, RagConfig};
use jivanu_backend::state::AppState;
use jivanu_backend::{Gateway, GatewayError};

const DIMENSIONS: usize = 32;

/// Hashed bag-of-words embeddings and queued completion outcomes.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, GatewayError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, err: GatewayError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(17usize, |acc, b| acc.wrapping_mul(131).wrapping_add(b as usize))
                % DIMENSIONS;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }

    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, GatewayError> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"answer": "default answer", "confidence": 0.6}"#.to_string()))
    }
}

pub async fn app_state(dir: &Path, gateway: Arc<ScriptedGateway>) -> Arc<AppState> {
    let paths = Arc::new(AppPaths::with_data_dir(
        dir.to_path_buf(),
        dir.join("data"),
    ));
    AppState::with_gateway(paths, RagConfig::default(), gateway)
        .await
        .unwrap()
}
