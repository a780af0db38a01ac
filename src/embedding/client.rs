//! HTTP client for the embedding and reranking service.
//!
//! The service hosts several models at once; every request names its
//! model explicitly. Concurrency towards the service is bounded by a
//! fair FIFO semaphore. Embedding failures surface as errors; reranking
//! degrades deterministically to identity order so downstream ranking
//! code never sees missing fields.

use crate::config::EmbeddingConfig;
use crate::embedding::models::{EmbeddingModel, model_by_id};
use crate::error::{RetrievalError, RetrievalResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// How long a positive health probe stays trusted.
const HEALTH_CACHE_TTL: Duration = Duration::from_secs(10);

/// Score step for degraded rerank placeholders; keeps scores strictly
/// decreasing.
const PLACEHOLDER_STEP: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct RerankEntry {
    /// Index into the caller's document list.
    pub index: usize,
    pub score: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    pub entries: Vec<RerankEntry>,
    /// True when the service was unavailable and identity order was
    /// substituted.
    pub degraded: bool,
}

/// Capability surface for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts with the named model. `is_query` switches
    /// the service-side task prompt.
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        is_query: bool,
    ) -> RetrievalResult<Vec<Vec<f32>>>;

    /// Rescore `documents` against `query`, returning the top `top_k`.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
        model: &str,
    ) -> RetrievalResult<RerankOutcome>;

    /// Probe the service. Bounded by the configured health timeout.
    async fn healthy(&self) -> bool;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    task: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    model: String,
    dimensionality: usize,
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_k: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResponseEntry>,
}

#[derive(Deserialize)]
struct RerankResponseEntry {
    index: usize,
    score: f64,
}

pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Semaphore,
    health_timeout: Duration,
    health_cache: Mutex<Option<(Instant, bool)>>,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: config.service_url.trim_end_matches('/').to_string(),
            limiter: Semaphore::new(config.max_in_flight.max(1)),
            health_timeout: Duration::from_millis(config.health_timeout_ms),
            health_cache: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn expected_model(&self, model: &str) -> RetrievalResult<&'static EmbeddingModel> {
        model_by_id(model).ok_or_else(|| {
            RetrievalError::invalid(format!("unknown embedding model '{model}'"))
        })
    }

    async fn probe_health(&self) -> bool {
        {
            let cache = self.health_cache.lock();
            if let Some((at, healthy)) = *cache {
                if at.elapsed() < HEALTH_CACHE_TTL {
                    return healthy;
                }
            }
        }
        let url = format!("{}/health", self.base_url);
        let result = tokio::time::timeout(self.health_timeout, self.http.get(&url).send()).await;
        let healthy = matches!(result, Ok(Ok(resp)) if resp.status().is_success());
        *self.health_cache.lock() = Some((Instant::now(), healthy));
        healthy
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        is_query: bool,
    ) -> RetrievalResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = self.expected_model(model)?;

        if expected.gpu_only && !self.probe_health().await {
            return Err(RetrievalError::ServiceUnavailable {
                endpoint: self.base_url.clone(),
                message: format!("service unhealthy; '{model}' requires the GPU backend"),
            });
        }

        let _permit = self.limiter.acquire().await.map_err(|_| {
            RetrievalError::cancelled("embedding limiter closed")
        })?;

        let request = EmbedRequest {
            model,
            input: texts,
            task: if is_query { "query" } else { "document" },
        };
        let url = format!("{}/embed", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::ServiceUnavailable {
                endpoint: self.base_url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RetrievalError::ServiceUnavailable {
                endpoint: self.base_url.clone(),
                message: format!("embed returned {}", response.status()),
            });
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            RetrievalError::ServiceUnavailable {
                endpoint: self.base_url.clone(),
                message: format!("malformed embed response: {e}"),
            }
        })?;

        if body.dimensionality != expected.dimensionality {
            return Err(RetrievalError::DimensionMismatch {
                model: body.model,
                expected: expected.dimensionality,
                actual: body.dimensionality,
            });
        }
        for vector in &body.embeddings {
            if vector.len() != expected.dimensionality {
                return Err(RetrievalError::DimensionMismatch {
                    model: body.model,
                    expected: expected.dimensionality,
                    actual: vector.len(),
                });
            }
        }
        if body.embeddings.len() != texts.len() {
            return Err(RetrievalError::ServiceUnavailable {
                endpoint: self.base_url.clone(),
                message: format!(
                    "embed returned {} vectors for {} inputs",
                    body.embeddings.len(),
                    texts.len()
                ),
            });
        }
        Ok(body.embeddings)
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
        model: &str,
    ) -> RetrievalResult<RerankOutcome> {
        if documents.is_empty() || top_k == 0 {
            return Ok(RerankOutcome {
                entries: Vec::new(),
                degraded: false,
            });
        }
        let top_k = top_k.min(documents.len());

        let attempt = async {
            let _permit = self
                .limiter
                .acquire()
                .await
                .map_err(|_| RetrievalError::cancelled("rerank limiter closed"))?;
            let request = RerankRequest {
                model,
                query,
                documents,
                top_k,
            };
            let url = format!("{}/rerank", self.base_url);
            let response = self.http.post(&url).json(&request).send().await.map_err(|e| {
                RetrievalError::ServiceUnavailable {
                    endpoint: self.base_url.clone(),
                    message: e.to_string(),
                }
            })?;
            if !response.status().is_success() {
                return Err(RetrievalError::ServiceUnavailable {
                    endpoint: self.base_url.clone(),
                    message: format!("rerank returned {}", response.status()),
                });
            }
            let body: RerankResponse = response.json().await.map_err(|e| {
                RetrievalError::ServiceUnavailable {
                    endpoint: self.base_url.clone(),
                    message: format!("malformed rerank response: {e}"),
                }
            })?;
            Ok::<RerankResponse, RetrievalError>(body)
        };

        match attempt.await {
            Ok(body) => {
                let mut entries: Vec<RerankEntry> = body
                    .results
                    .into_iter()
                    .filter(|r| r.index < documents.len())
                    .map(|r| RerankEntry {
                        index: r.index,
                        score: r.score,
                        rank: 0,
                    })
                    .collect();
                entries.sort_by(|a, b| {
                    b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
                });
                entries.truncate(top_k);
                for (rank, entry) in entries.iter_mut().enumerate() {
                    entry.rank = rank;
                }
                Ok(RerankOutcome {
                    entries,
                    degraded: false,
                })
            }
            Err(err) => {
                tracing::warn!("Reranker unavailable, degrading to identity order: {err}");
                Ok(identity_rerank(documents.len(), top_k))
            }
        }
    }

    async fn healthy(&self) -> bool {
        self.probe_health().await
    }
}

/// Deterministic degradation: the first `top_k` documents in input
/// order, with strictly decreasing placeholder scores.
pub fn identity_rerank(document_count: usize, top_k: usize) -> RerankOutcome {
    let take = top_k.min(document_count);
    let entries = (0..take)
        .map(|i| RerankEntry {
            index: i,
            score: 1.0 - PLACEHOLDER_STEP * i as f64,
            rank: i,
        })
        .collect();
    RerankOutcome {
        entries,
        degraded: true,
    }
}

/// Offline, fully deterministic embedding backend. Token hashes are
/// folded into a fixed-dimension vector, so equal texts always embed
/// identically — the backend behind benchmark fixtures and tests.
pub struct HashEmbeddingProvider {
    pub dimensionality: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensionality: usize) -> Self {
        Self { dimensionality }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};
        let mut vector = vec![0.0f32; self.dimensionality];
        for token in crate::index::tokenise(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensionality;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(
        &self,
        texts: &[String],
        _model: &str,
        _is_query: bool,
    ) -> RetrievalResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_k: usize,
        _model: &str,
    ) -> RetrievalResult<RerankOutcome> {
        Ok(identity_rerank(documents.len(), top_k))
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            service_url: server.uri(),
            default_model: "gemma3".to_string(),
            max_in_flight: 8,
            health_timeout_ms: 500,
            request_timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn embed_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gemma3",
                "dimensionality": 768,
                "embeddings": [vec![0.1f32; 768]],
            })))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(&config_for(&server));
        let vectors = client
            .embed(&["hello".to_string()], "gemma3", false)
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].len(), 768);
    }

    #[tokio::test]
    async fn dimension_disagreement_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gemma3",
                "dimensionality": 512,
                "embeddings": [vec![0.1f32; 512]],
            })))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(&config_for(&server));
        let err = client
            .embed(&["hello".to_string()], "gemma3", true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "dimension_mismatch");
    }

    #[tokio::test]
    async fn gpu_model_fails_fast_when_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(&config_for(&server));
        let err = client
            .embed(&["x".to_string()], "qwen3", false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "service_unavailable");
    }

    #[tokio::test]
    async fn rerank_degrades_to_identity_when_down() {
        // No mock mounted: every request fails.
        let server = MockServer::start().await;
        let client = HttpEmbeddingClient::new(&config_for(&server));

        let docs: Vec<String> = (0..5).map(|i| format!("doc {i}")).collect();
        let outcome = client.rerank("query", &docs, 3, "qwen3").await.unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.entries.len(), 3);
        for (i, entry) in outcome.entries.iter().enumerate() {
            assert_eq!(entry.index, i);
            assert_eq!(entry.rank, i);
            if i > 0 {
                assert!(entry.score < outcome.entries[i - 1].score);
            }
        }
    }

    #[tokio::test]
    async fn unknown_model_is_invalid_argument() {
        let server = MockServer::start().await;
        let client = HttpEmbeddingClient::new(&config_for(&server));
        let err = client
            .embed(&["x".to_string()], "bert-base", false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn hash_provider_is_deterministic() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed_one("token optimization reduces prompt size");
        let b = provider.embed_one("token optimization reduces prompt size");
        let c = provider.embed_one("entirely different words");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // L2-normalised
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
