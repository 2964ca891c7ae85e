//! Semantic embeddings for journal retrieval
//!
//! Journal entries are embedded once at ingest; queries are embedded at
//! retrieval time and compared by cosine similarity. Vectors are stored
//! L2-normalised as little-endian f32 BLOBs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How the embedding will be used; the hosted model tunes vectors per task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingTask {
    Document,
    Query,
}

impl EmbeddingTask {
    fn api_name(&self) -> &'static str {
        match self {
            EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Turns text into a vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>>;
}

/// Hosted Gemini embedding model
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(anyhow!("GOOGLE_API_KEY not set. Embeddings require API access."));
        }

        let url = format!(
            "{}/models/{}:embedContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );
        let request_body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [ { "text": text } ] },
            "taskType": task.api_name(),
        });

        let api_response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("embedding request failed")?;

        if !api_response.status().is_success() {
            let status = api_response.status();
            let error_text = api_response.text().await.unwrap_or_default();
            return Err(anyhow!("Embedding API error {}: {}", status, error_text));
        }

        let response_json: serde_json::Value = api_response.json().await?;
        let values = response_json["embedding"]["values"]
            .as_array()
            .ok_or_else(|| anyhow!("embedding response has no values"))?;

        let embedding: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();
        if embedding.is_empty() {
            return Err(anyhow!("embedding response was empty"));
        }

        Ok(l2_normalize(&embedding))
    }
}

/// L2 normalize a vector
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.iter().map(|x| x / norm).collect()
    } else {
        vec.to_vec()
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.001);

        // Magnitude does not matter
        let d = vec![5.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let vec = vec![3.0, 4.0];
        let normalized = l2_normalize(&vec);

        // 3-4-5 triangle: norm should be 5
        assert!((normalized[0] - 0.6).abs() < 0.001);
        assert!((normalized[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_blob_keeps_values() {
        let embedding = vec![0.25_f32, -1.5, 3.0];
        let blob = to_blob(&embedding);
        assert_eq!(blob.len(), 12);
        assert_eq!(from_blob(&blob), embedding);
    }
}
