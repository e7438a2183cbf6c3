use crate::config::EmbeddingConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use crate::services::conversation::EmbeddingProvider;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create embedding HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Embed texts in `batch_size` chunks, preserving input order
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let mut vectors = self.embed_chunk(batch).await?;
            embeddings.append(&mut vectors);
        }

        Ok(embeddings)
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("Generating embeddings for {} texts", texts.len());

        let url = format!("{}/v1/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest { input: texts })
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embeddings = parse_embeddings(&json_value)?;

        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, got {}",
                texts.len(),
                embeddings.len()
            );
        }

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                anyhow::bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    embedding.len()
                );
            }
        }

        Ok(embeddings)
    }
}

/// Accepts `{"data":[{"embedding":[..]}]}` (OpenAI), `{"embeddings":[[..]]}`
/// and a bare `[[..]]` array.
fn parse_embeddings(json_value: &Value) -> Result<Vec<Vec<f32>>> {
    let rows = if let Some(data) = json_value.get("data").and_then(Value::as_array) {
        data.iter()
            .map(|item| &item["embedding"])
            .collect::<Vec<_>>()
    } else if let Some(embeddings) = json_value.get("embeddings").and_then(Value::as_array) {
        embeddings.iter().collect()
    } else if let Some(arr) = json_value.as_array() {
        arr.iter().collect()
    } else {
        anyhow::bail!("Unrecognized embedding response format: {}", json_value);
    };

    rows.into_iter()
        .map(|row| -> Result<Vec<f32>> {
            let values = row
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding is not an array: {}", row))?;
            let vector: Vec<f32> = values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            if vector.is_empty() {
                anyhow::bail!("Generated embedding is empty");
            }
            Ok(vector)
        })
        .collect()
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_texts(texts).await
    }
}
