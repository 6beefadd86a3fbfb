//! Deterministic in-process gateway for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::provider::Gateway;
use crate::core::errors::GatewayError;

const DIMENSIONS: usize = 64;

#[derive(Debug, Clone)]
pub enum Completion {
    Reply(String),
    Transient,
    Auth,
    Delayed(Duration, String),
}

/// Bag-of-words embeddings plus scripted completions.
pub struct MockGateway {
    completions: Mutex<VecDeque<Completion>>,
    default_reply: String,
    prompts: Mutex<Vec<(String, String)>>,
    fail_embeddings: AtomicBool,
    short_batches: AtomicBool,
    embed_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(VecDeque::new()),
            default_reply: r#"{"answer": "ok", "confidence": 0.9}"#.to_string(),
            prompts: Mutex::new(Vec::new()),
            fail_embeddings: AtomicBool::new(false),
            short_batches: AtomicBool::new(false),
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_completion(&self, completion: Completion) {
        self.completions.lock().unwrap().push_back(completion);
    }

    pub fn set_fail_embeddings(&self, fail: bool) {
        self.fail_embeddings.store(fail, Ordering::SeqCst);
    }

    /// Makes `embed_batch` return one vector fewer than requested.
    pub fn set_short_batches(&self, short: bool) {
        self.short_batches.store(short, Ordering::SeqCst);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// `(system_prompt, user_prompt)` pairs seen by `complete`, oldest first.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let bucket = word
                .bytes()
                .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
                as usize
                % DIMENSIONS;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(GatewayError::Transient("embedding service offline".to_string()));
        }
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        if self.short_batches.load(Ordering::SeqCst) {
            vectors.pop();
        }
        Ok(vectors)
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GatewayError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        let next = self.completions.lock().unwrap().pop_front();
        match next {
            None => Ok(self.default_reply.clone()),
            Some(Completion::Reply(text)) => Ok(text),
            Some(Completion::Transient) => {
                Err(GatewayError::Transient("connection reset".to_string()))
            }
            Some(Completion::Auth) => Err(GatewayError::Auth("invalid api key".to_string())),
            Some(Completion::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }
}
