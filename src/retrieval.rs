//! Retrieval service: prior journal context for a user
//!
//! Order of attempts:
//! 1. Semantic match against embedded entries (similarity >= threshold)
//! 2. Most recent entries for the user
//! 3. Nothing
//!
//! Callers never see an error from here.

use crate::db::JournalStore;
use crate::embeddings::{Embedder, EmbeddingTask};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default similarity cut-off for semantic matches
pub const MATCH_THRESHOLD: f32 = 0.7;

/// Ranked context snippets for a query
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn search_context(&self, user_id: &str, query: &str, top_k: usize) -> Vec<String>;
}

/// Run a retrieval with a deadline; a timeout yields no context
pub async fn search_with_timeout(
    retriever: &dyn ContextRetriever,
    user_id: &str,
    query: &str,
    top_k: usize,
    timeout: Duration,
) -> Vec<String> {
    match tokio::time::timeout(timeout, retriever.search_context(user_id, query, top_k)).await {
        Ok(snippets) => snippets,
        Err(_) => {
            tracing::warn!("[RAG] Retrieval timed out after {:?}", timeout);
            Vec::new()
        }
    }
}

/// Journal-backed retriever
pub struct JournalRetriever {
    store: Arc<JournalStore>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
}

impl JournalRetriever {
    pub fn new(store: Arc<JournalStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            threshold: MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    async fn semantic(&self, user_id: &str, query: &str, top_k: usize) -> anyhow::Result<Vec<String>> {
        let query_embedding = self.embedder.embed(query, EmbeddingTask::Query).await?;
        let matches = self
            .store
            .match_entries(user_id, &query_embedding, self.threshold, top_k)?;
        Ok(matches.into_iter().map(|m| m.content).collect())
    }
}

#[async_trait]
impl ContextRetriever for JournalRetriever {
    async fn search_context(&self, user_id: &str, query: &str, top_k: usize) -> Vec<String> {
        if top_k == 0 {
            return Vec::new();
        }

        match self.semantic(user_id, query, top_k).await {
            Ok(snippets) if !snippets.is_empty() => {
                tracing::info!("[RAG] {} semantic matches for {}", snippets.len(), user_id);
                return snippets;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[RAG] Semantic search failed, falling back to recent entries: {:#}", e);
            }
        }

        match self.store.recent_entries(user_id, top_k) {
            Ok(entries) => {
                if !entries.is_empty() {
                    tracing::info!("[RAG] Returning {} recent entries as fallback", entries.len());
                }
                entries.into_iter().map(|e| e.content).collect()
            }
            Err(e) => {
                tracing::warn!("[RAG] Search error: {:#}", e);
                Vec::new()
            }
        }
    }
}
