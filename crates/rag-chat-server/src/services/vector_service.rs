use crate::config::VectorConfig;
use crate::services::conversation::{RetrievalProvider, SearchHit, VectorQuery};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    db_name: &'a str,
    collection_name: &'a str,
    data: &'a [Vec<f32>],
    anns_field: &'a str,
    limit: usize,
    output_fields: &'a [String],
    search_params: SearchParamsBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchParamsBody<'a> {
    metric_type: &'a str,
    params: NprobeParams,
}

#[derive(Debug, Serialize)]
struct NprobeParams {
    nprobe: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<Value>,
}

/// Milvus RESTful vector search client
#[derive(Clone)]
pub struct VectorSearchService {
    client: Client,
    config: VectorConfig,
}

impl VectorSearchService {
    pub fn new(config: VectorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create vector search HTTP client")?;

        Ok(Self { client, config })
    }

    /// Raw search; errors propagate. See [`RetrievalProvider::search`] for
    /// the absorbing variant the orchestrator uses.
    pub async fn try_search(&self, query: &VectorQuery) -> Result<Vec<Vec<SearchHit>>> {
        debug!(
            "Searching collection {} (metric={}, nprobe={}, top_k={}, queries={})",
            query.collection,
            query.metric_type,
            query.nprobe,
            query.top_k,
            query.vectors.len()
        );

        let request = SearchRequest {
            db_name: &self.config.database,
            collection_name: &query.collection,
            data: &query.vectors,
            anns_field: &self.config.anns_field,
            limit: query.top_k,
            output_fields: &query.output_fields,
            search_params: SearchParamsBody {
                metric_type: &query.metric_type,
                params: NprobeParams {
                    nprobe: query.nprobe,
                },
            },
        };

        let url = format!(
            "{}/v2/vectordb/entities/search",
            self.config.base_url.trim_end_matches('/')
        );
        let mut builder = self.client.post(&url).json(&request);
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .context("Failed to connect to vector database")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Vector search API error ({}): {}", status, body);
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse vector search response")?;

        if body.code != 0 {
            anyhow::bail!(
                "Vector search failed with code {}: {}",
                body.code,
                body.message.unwrap_or_default()
            );
        }

        Ok(group_hits(body.data))
    }
}

/// Multi-vector responses nest one array per query; single-vector responses
/// are a flat list of hit objects.
fn group_hits(data: Vec<Value>) -> Vec<Vec<SearchHit>> {
    if data.iter().all(Value::is_array) && !data.is_empty() {
        return data
            .into_iter()
            .map(|group| match group {
                Value::Array(hits) => hits.into_iter().filter_map(to_hit).collect(),
                _ => Vec::new(),
            })
            .collect();
    }

    vec![data.into_iter().filter_map(to_hit).collect()]
}

fn to_hit(value: Value) -> Option<SearchHit> {
    match value {
        Value::Object(fields) => Some(SearchHit { fields }),
        _ => None,
    }
}

#[async_trait::async_trait]
impl RetrievalProvider for VectorSearchService {
    async fn search(&self, query: &VectorQuery) -> Vec<Vec<SearchHit>> {
        match self.try_search(query).await {
            Ok(hits) => hits,
            Err(e) => {
                error!("Vector search error on collection {}: {:#}", query.collection, e);
                Vec::new()
            }
        }
    }
}
