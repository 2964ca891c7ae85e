//! In-memory doubles for the external collaborators, shared by unit tests

use crate::embeddings::{Embedder, EmbeddingTask};
use crate::llm::{Completion, CompletionService, FinishReason, GenerationConfig};
use crate::retrieval::ContextRetriever;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Replies from a queue, then with a fixed default. Records every prompt.
pub struct ScriptedCompletion {
    queue: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<(String, GenerationConfig)>>,
    default_reply: String,
}

impl ScriptedCompletion {
    pub fn replying(default_reply: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            default_reply: default_reply.to_string(),
        }
    }

    pub fn then_ok(self, text: &str) -> Self {
        self.queue.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn then_err(self, error: &str) -> Self {
        self.queue.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn configs(&self) -> Vec<GenerationConfig> {
        self.prompts.lock().unwrap().iter().map(|(_, c)| *c).collect()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<Completion> {
        self.prompts.lock().unwrap().push((prompt.to_string(), *config));
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(Completion::new(text, FinishReason::Stop)),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(Completion::new(self.default_reply.clone(), FinishReason::Stop)),
        }
    }
}

/// Always fails with the given message
pub struct FailingCompletion(pub &'static str);

#[async_trait]
impl CompletionService for FailingCompletion {
    async fn complete(&self, _prompt: &str, _config: &GenerationConfig) -> Result<Completion> {
        Err(anyhow!(self.0))
    }
}

/// Never answers within any reasonable deadline
pub struct SlowCompletion;

#[async_trait]
impl CompletionService for SlowCompletion {
    async fn complete(&self, _prompt: &str, _config: &GenerationConfig) -> Result<Completion> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Completion::new("too late", FinishReason::Stop))
    }
}

/// Returns the same snippets for every query and records the queries
#[derive(Default)]
pub struct StaticRetriever {
    snippets: Vec<String>,
    queries: Mutex<Vec<(String, String, usize)>>,
}

impl StaticRetriever {
    pub fn with(snippets: &[&str]) -> Self {
        Self {
            snippets: snippets.iter().map(|s| s.to_string()).collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn search_context(&self, user_id: &str, query: &str, top_k: usize) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .push((user_id.to_string(), query.to_string(), top_k));
        self.snippets.iter().take(top_k).cloned().collect()
    }
}

/// Two-dimensional embeddings keyed on a marker word
pub struct MarkerEmbedder(pub &'static str);

#[async_trait]
impl Embedder for MarkerEmbedder {
    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
        if text.to_lowercase().contains(self.0) {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
}

pub struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
        Err(anyhow!("embedding service unavailable"))
    }
}
