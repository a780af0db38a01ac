//! Hybrid retrieval: keyword and dense-vector channels fused by
//! reciprocal ranks, optionally reranked.
//!
//! Every mode is independently invocable; the benchmark harness depends
//! on that. Queries carry a deadline — a channel that overruns its share
//! is abandoned and the answer is fused from whatever arrived, with
//! provenance saying so. `no_results` is a valid, non-error outcome.

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, RetrievalResult};
use crate::index::{KeywordHit, SymbolIndex, tokenise};
use crate::vector::{VectorHit, VectorStore};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Floor for the keyword channel's candidate pool.
const MIN_CHANNEL_K: usize = 20;
/// Floor for the rerank window.
const MIN_RERANK_K: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Bm25Only,
    SymbolBm25Only,
    VectorOnly,
    Hybrid,
    Reranked,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bm25Only => "bm25_only",
            Self::SymbolBm25Only => "symbol_bm25_only",
            Self::VectorOnly => "vector_only",
            Self::Hybrid => "hybrid",
            Self::Reranked => "reranked",
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Bm25Only,
            Self::SymbolBm25Only,
            Self::VectorOnly,
            Self::Hybrid,
            Self::Reranked,
        ]
    }

    fn uses_keyword(&self) -> bool {
        !matches!(self, Self::VectorOnly)
    }

    fn uses_vector(&self) -> bool {
        matches!(self, Self::VectorOnly | Self::Hybrid | Self::Reranked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemStatus {
    Ok,
    /// Not invoked in this mode, or failed and was dropped from fusion.
    Missing,
    /// Deadline expired before the subsystem answered.
    Cancelled,
    /// Answered with a deterministic fallback (identity rerank).
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub bm25: SubsystemStatus,
    pub vector: SubsystemStatus,
    pub reranker: SubsystemStatus,
}

impl Provenance {
    fn none() -> Self {
        Self {
            bm25: SubsystemStatus::Missing,
            vector: SubsystemStatus::Missing,
            reranker: SubsystemStatus::Missing,
        }
    }

    pub fn clean(&self) -> bool {
        self.bm25 != SubsystemStatus::Cancelled && self.vector != SubsystemStatus::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDocument {
    pub doc_id: String,
    /// Zero-based final rank.
    pub rank: usize,
    pub score: f64,
    pub bm25_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<RankedDocument>,
    pub provenance: Provenance,
}

/// The memoisation key for expensive pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryFingerprint {
    pub normalised_query: String,
    pub model_id: String,
    pub k: usize,
    pub filters: String,
}

/// Pipeline stage notifications; the host decides whether to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started,
    KeywordDone { hits: usize },
    VectorDone { hits: usize },
    Fused { candidates: usize },
    Reranked { kept: usize },
    Finished,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub text: String,
    pub k: usize,
    pub mode: RetrievalMode,
    /// Lower similarity cut for the vector channel; 0.0 disables.
    pub threshold: f32,
    pub deadline: Option<Duration>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>, k: usize, mode: RetrievalMode) -> Self {
        Self {
            text: text.into(),
            k,
            mode,
            threshold: 0.0,
            deadline: None,
        }
    }
}

/// Resolves a document id back to rerankable text.
pub trait DocumentSource: Send + Sync {
    fn text_for(&self, doc_id: &str) -> Option<String>;
}

pub struct HybridRetriever {
    index: Arc<SymbolIndex>,
    vectors: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    documents: Option<Arc<dyn DocumentSource>>,
    config: RetrievalConfig,
    collection: String,
    model: String,
    memo: DashMap<QueryFingerprint, RetrievalResponse>,
    progress: Option<crossbeam_channel::Sender<ProgressEvent>>,
}

impl HybridRetriever {
    pub fn new(
        index: Arc<SymbolIndex>,
        vectors: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        collection: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            index,
            vectors,
            embedder,
            documents: None,
            config,
            collection: collection.into(),
            model: model.into(),
            memo: DashMap::new(),
            progress: None,
        }
    }

    pub fn with_document_source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.documents = Some(source);
        self
    }

    /// Attach a progress channel; events are best-effort.
    pub fn with_progress(mut self, sender: crossbeam_channel::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            let _ = sender.try_send(event);
        }
    }

    fn fingerprint(&self, request: &SearchRequest) -> QueryFingerprint {
        QueryFingerprint {
            normalised_query: tokenise(&request.text).join(" "),
            model_id: self.model.clone(),
            k: request.k,
            filters: format!("{}:{}:{}", self.collection, request.mode.as_str(), request.threshold),
        }
    }

    pub async fn search(&self, request: SearchRequest) -> RetrievalResult<RetrievalResponse> {
        if request.k == 0 {
            return Err(RetrievalError::invalid("k must be positive"));
        }
        if request.text.trim().is_empty() {
            return Err(RetrievalError::invalid("query text must be non-empty"));
        }

        let fingerprint = self.fingerprint(&request);
        if self.config.memoise {
            if let Some(cached) = self.memo.get(&fingerprint) {
                return Ok(cached.clone());
            }
        }

        self.emit(ProgressEvent::Started);
        let deadline = request.deadline.or_else(|| {
            (self.config.deadline_ms > 0).then(|| Duration::from_millis(self.config.deadline_ms))
        });

        let mut provenance = Provenance::none();
        let mut channel_failed = false;
        let k_channel = request.k.max(MIN_CHANNEL_K);

        let keyword_future = self.keyword_channel(&request, k_channel, deadline);
        let vector_future = self.vector_channel(&request, k_channel, deadline);
        let (keyword_outcome, vector_outcome) = tokio::join!(keyword_future, vector_future);

        let keyword_hits = match keyword_outcome {
            ChannelOutcome::Hits(hits) => {
                provenance.bm25 = SubsystemStatus::Ok;
                self.emit(ProgressEvent::KeywordDone { hits: hits.len() });
                hits
            }
            ChannelOutcome::Cancelled => {
                provenance.bm25 = SubsystemStatus::Cancelled;
                Vec::new()
            }
            ChannelOutcome::Skipped => Vec::new(),
            ChannelOutcome::Failed(err) => {
                if request.mode.uses_vector() {
                    tracing::warn!("Keyword channel failed, continuing without it: {err}");
                    channel_failed = true;
                    Vec::new()
                } else {
                    return Err(err);
                }
            }
        };

        let vector_hits = match vector_outcome {
            ChannelOutcome::Hits(hits) => {
                provenance.vector = SubsystemStatus::Ok;
                self.emit(ProgressEvent::VectorDone { hits: hits.len() });
                hits
            }
            ChannelOutcome::Cancelled => {
                provenance.vector = SubsystemStatus::Cancelled;
                Vec::new()
            }
            ChannelOutcome::Skipped => Vec::new(),
            ChannelOutcome::Failed(err) => {
                if request.mode.uses_keyword() {
                    tracing::warn!("Vector channel failed, continuing without it: {err}");
                    channel_failed = true;
                    Vec::new()
                } else {
                    return Err(err);
                }
            }
        };

        let keyword_list: Vec<(String, f32)> = keyword_hits
            .iter()
            .map(|h: &KeywordHit| (h.path.clone(), h.score))
            .collect();
        let vector_list: Vec<(String, f32)> = vector_hits
            .iter()
            .map(|h: &VectorHit| (h.doc_id.clone(), h.similarity))
            .collect();

        let mut fused = fuse(
            &keyword_list,
            &vector_list,
            self.config.rrf_weight_bm25,
            self.config.rrf_weight_vector,
            self.config.rrf_c,
        );
        self.emit(ProgressEvent::Fused {
            candidates: fused.len(),
        });

        if request.mode == RetrievalMode::Reranked && !fused.is_empty() {
            let window = request.k.max(MIN_RERANK_K).min(fused.len());
            let candidates = &fused[..window];
            let texts: Vec<String> = candidates
                .iter()
                .map(|doc| {
                    self.documents
                        .as_ref()
                        .and_then(|source| source.text_for(&doc.doc_id))
                        .unwrap_or_else(|| doc.doc_id.clone())
                })
                .collect();

            let outcome = self
                .embedder
                .rerank(&request.text, &texts, request.k, &self.config.rerank_model)
                .await?;
            provenance.reranker = if outcome.degraded {
                SubsystemStatus::Degraded
            } else {
                SubsystemStatus::Ok
            };

            let mut reranked = Vec::with_capacity(outcome.entries.len());
            for entry in outcome.entries {
                let mut doc = candidates[entry.index].clone();
                doc.score = entry.score;
                reranked.push(doc);
            }
            fused = reranked;
            self.emit(ProgressEvent::Reranked { kept: fused.len() });
        }

        fused.truncate(request.k);
        for (rank, doc) in fused.iter_mut().enumerate() {
            doc.rank = rank;
        }

        let response = RetrievalResponse {
            results: fused,
            provenance,
        };
        self.emit(ProgressEvent::Finished);

        if self.config.memoise && provenance.clean() && !channel_failed {
            self.memo.insert(fingerprint, response.clone());
        }
        Ok(response)
    }

    async fn keyword_channel(
        &self,
        request: &SearchRequest,
        k: usize,
        deadline: Option<Duration>,
    ) -> ChannelOutcome<Vec<KeywordHit>> {
        if !request.mode.uses_keyword() {
            return ChannelOutcome::Skipped;
        }
        let index = self.index.clone();
        let text = request.text.clone();
        let symbol_aware = request.mode != RetrievalMode::Bm25Only;

        let work = tokio::task::spawn_blocking(move || {
            if symbol_aware {
                index.search_symbol_bm25(&text, k)
            } else {
                index.search_bm25(&text, k)
            }
        });

        let joined = match deadline {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(joined) => joined,
                Err(_) => return ChannelOutcome::Cancelled,
            },
            None => work.await,
        };

        match joined {
            Ok(Ok(hits)) => ChannelOutcome::Hits(hits),
            Ok(Err(err)) => ChannelOutcome::Failed(err.into()),
            Err(join_err) => ChannelOutcome::Failed(RetrievalError::io(
                "keyword channel",
                join_err,
            )),
        }
    }

    async fn vector_channel(
        &self,
        request: &SearchRequest,
        k: usize,
        deadline: Option<Duration>,
    ) -> ChannelOutcome<Vec<VectorHit>> {
        if !request.mode.uses_vector() {
            return ChannelOutcome::Skipped;
        }

        let work = async {
            let query_vectors = self
                .embedder
                .embed(&[request.text.clone()], &self.model, true)
                .await?;
            let query = query_vectors.into_iter().next().ok_or_else(|| {
                RetrievalError::ServiceUnavailable {
                    endpoint: "embedding service".to_string(),
                    message: "empty embedding batch".to_string(),
                }
            })?;

            let vectors = self.vectors.clone();
            let collection = self.collection.clone();
            let threshold = request.threshold;
            tokio::task::spawn_blocking(move || vectors.search(&collection, &query, k, threshold))
                .await
                .map_err(|e| RetrievalError::io("vector channel", e))?
        };

        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => return ChannelOutcome::Cancelled,
            },
            None => work.await,
        };

        match outcome {
            Ok(hits) => ChannelOutcome::Hits(hits),
            Err(err) => ChannelOutcome::Failed(err),
        }
    }
}

enum ChannelOutcome<T> {
    Hits(T),
    Cancelled,
    Skipped,
    Failed(RetrievalError),
}

/// Reciprocal-rank fusion. Each input list is rank-ordered best first;
/// a document absent from a list contributes zero from it. Ties break on
/// the raw keyword score, then on doc id.
pub fn fuse(
    keyword: &[(String, f32)],
    vector: &[(String, f32)],
    w_bm25: f64,
    w_vector: f64,
    c: f64,
) -> Vec<RankedDocument> {
    use std::collections::HashMap;

    struct Entry {
        bm25_rank: Option<usize>,
        bm25_score: f32,
        vector_rank: Option<usize>,
    }

    let mut entries: HashMap<&str, Entry> = HashMap::new();
    for (rank, (doc_id, score)) in keyword.iter().enumerate() {
        entries
            .entry(doc_id.as_str())
            .and_modify(|e| {
                e.bm25_rank.get_or_insert(rank);
                e.bm25_score = *score;
            })
            .or_insert(Entry {
                bm25_rank: Some(rank),
                bm25_score: *score,
                vector_rank: None,
            });
    }
    for (rank, (doc_id, _score)) in vector.iter().enumerate() {
        entries
            .entry(doc_id.as_str())
            .and_modify(|e| {
                e.vector_rank.get_or_insert(rank);
            })
            .or_insert(Entry {
                bm25_rank: None,
                bm25_score: 0.0,
                vector_rank: Some(rank),
            });
    }

    let mut fused: Vec<(RankedDocument, f32)> = entries
        .into_iter()
        .map(|(doc_id, entry)| {
            // Ranks are zero-based internally; the fusion formula uses
            // one-based ranks.
            let mut score = 0.0;
            if let Some(rank) = entry.bm25_rank {
                score += w_bm25 / (c + (rank + 1) as f64);
            }
            if let Some(rank) = entry.vector_rank {
                score += w_vector / (c + (rank + 1) as f64);
            }
            (
                RankedDocument {
                    doc_id: doc_id.to_string(),
                    rank: 0,
                    score,
                    bm25_rank: entry.bm25_rank,
                    vector_rank: entry.vector_rank,
                },
                entry.bm25_score,
            )
        })
        .collect();

    fused.sort_by(|(a, a_bm), (b, b_bm)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b_bm.partial_cmp(a_bm).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });

    fused
        .into_iter()
        .enumerate()
        .map(|(rank, (mut doc, _))| {
            doc.rank = rank;
            doc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::embedding::{HashEmbeddingProvider, RerankOutcome};
    use crate::index::FileDocument;
    use crate::vector::{EmbeddedDocument, Similarity};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    fn ranked(list: &[(&str, f32)]) -> Vec<(String, f32)> {
        list.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn fusion_combines_both_channels() {
        let keyword = ranked(&[("a", 10.0), ("b", 8.0), ("c", 5.0)]);
        let vector = ranked(&[("b", 0.9), ("d", 0.8)]);
        let fused = fuse(&keyword, &vector, 1.0, 1.0, 60.0);

        // b appears in both lists and wins.
        assert_eq!(fused[0].doc_id, "b");
        assert_eq!(fused[0].bm25_rank, Some(1));
        assert_eq!(fused[0].vector_rank, Some(0));
        let ids: Vec<&str> = fused.iter().map(|d| d.doc_id.as_str()).collect();
        assert!(ids.contains(&"d"));
    }

    #[test]
    fn fusion_is_monotonic_in_rank_improvement() {
        // Property: improving a document's rank in one channel never
        // worsens its fused rank, all else equal.
        let keyword_before = ranked(&[("x", 5.0), ("target", 4.0), ("y", 3.0)]);
        let keyword_after = ranked(&[("target", 4.0), ("x", 5.0), ("y", 3.0)]);
        let vector = ranked(&[("z", 0.9)]);

        let before = fuse(&keyword_before, &vector, 1.0, 1.0, 60.0);
        let after = fuse(&keyword_after, &vector, 1.0, 1.0, 60.0);

        let rank_of = |fused: &[RankedDocument], id: &str| {
            fused.iter().position(|d| d.doc_id == id).unwrap()
        };
        assert!(rank_of(&after, "target") <= rank_of(&before, "target"));
    }

    #[test]
    fn missing_rank_contributes_zero() {
        let keyword = ranked(&[("only_kw", 1.0)]);
        let fused = fuse(&keyword, &[], 1.0, 1.0, 60.0);
        assert_eq!(fused.len(), 1);
        let expected = 1.0 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-12);
        assert_eq!(fused[0].vector_rank, None);
    }

    struct SlowEmbedder {
        inner: HashEmbeddingProvider,
        delay: Duration,
    }

    #[async_trait]
    impl crate::embedding::EmbeddingProvider for SlowEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            model: &str,
            is_query: bool,
        ) -> RetrievalResult<Vec<Vec<f32>>> {
            tokio::time::sleep(self.delay).await;
            self.inner.embed(texts, model, is_query).await
        }

        async fn rerank(
            &self,
            query: &str,
            documents: &[String],
            top_k: usize,
            model: &str,
        ) -> RetrievalResult<RerankOutcome> {
            self.inner.rerank(query, documents, top_k, model).await
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    struct Fixture {
        _dir: TempDir,
        retriever: HybridRetriever,
    }

    fn fixture(embedder: Arc<dyn crate::embedding::EmbeddingProvider>, memoise: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(SymbolIndex::open(&dir.path().join("keyword")).unwrap());
        let vectors = Arc::new(VectorStore::open(dir.path().join("vector")).unwrap());
        vectors
            .create_collection("corpus", "gemma3", 64, Similarity::Cosine)
            .unwrap();

        let hasher = HashEmbeddingProvider::new(64);
        let corpus = [
            ("docs/auth.md", "authentication token login session"),
            ("docs/tokens.md", "token optimization reduces prompt size"),
            ("docs/index.md", "hybrid retrieval fuses keyword and vector search"),
        ];
        for (path, content) in corpus {
            index
                .replace_file(&FileDocument {
                    path: path.to_string(),
                    content: content.to_string(),
                    mtime: 1,
                    file_hash: path.to_string(),
                    ..Default::default()
                })
                .unwrap();
            vectors
                .insert(
                    "corpus",
                    "gemma3",
                    vec![EmbeddedDocument {
                        id: path.to_string(),
                        digest: path.to_string(),
                        metadata: json!({}),
                        vector: hasher.embed_one(content),
                    }],
                )
                .unwrap();
        }
        index.commit().unwrap();

        let config = RetrievalConfig {
            memoise,
            ..Default::default()
        };
        let retriever =
            HybridRetriever::new(index, vectors, embedder, config, "corpus", "gemma3");
        Fixture {
            _dir: dir,
            retriever,
        }
    }

    #[tokio::test]
    async fn hybrid_finds_results_from_both_channels() {
        let fixture = fixture(Arc::new(HashEmbeddingProvider::new(64)), false);
        let response = fixture
            .retriever
            .search(SearchRequest::new("token optimization", 5, RetrievalMode::Hybrid))
            .await
            .unwrap();

        assert_eq!(response.provenance.bm25, SubsystemStatus::Ok);
        assert_eq!(response.provenance.vector, SubsystemStatus::Ok);
        assert!(!response.results.is_empty());
        assert_eq!(response.results[0].doc_id, "docs/tokens.md");
        // Final ranks are dense and zero-based.
        for (i, doc) in response.results.iter().enumerate() {
            assert_eq!(doc.rank, i);
        }
    }

    #[tokio::test]
    async fn cancelled_vector_channel_yields_partial_but_valid() {
        let slow = Arc::new(SlowEmbedder {
            inner: HashEmbeddingProvider::new(64),
            delay: Duration::from_millis(500),
        });
        let fixture = fixture(slow, false);

        let mut request = SearchRequest::new("token optimization", 5, RetrievalMode::Hybrid);
        request.deadline = Some(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let response = fixture.retriever.search(request).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));

        assert_eq!(response.provenance.bm25, SubsystemStatus::Ok);
        assert_eq!(response.provenance.vector, SubsystemStatus::Cancelled);
        // Keyword results still ranked.
        assert!(!response.results.is_empty());
        assert!(response.results.iter().all(|d| d.vector_rank.is_none()));
    }

    #[tokio::test]
    async fn vector_only_does_not_touch_keyword_channel() {
        let fixture = fixture(Arc::new(HashEmbeddingProvider::new(64)), false);
        let response = fixture
            .retriever
            .search(SearchRequest::new("keyword vector fusion", 3, RetrievalMode::VectorOnly))
            .await
            .unwrap();
        assert_eq!(response.provenance.bm25, SubsystemStatus::Missing);
        assert_eq!(response.provenance.vector, SubsystemStatus::Ok);
        assert!(response.results.iter().all(|d| d.bm25_rank.is_none()));
    }

    #[tokio::test]
    async fn no_results_is_valid() {
        let fixture = fixture(Arc::new(HashEmbeddingProvider::new(64)), false);
        let response = fixture
            .retriever
            .search(SearchRequest::new("zzzzzz qqqqqq", 5, RetrievalMode::Bm25Only))
            .await
            .unwrap();
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn memoised_query_returns_identical_response() {
        let fixture = fixture(Arc::new(HashEmbeddingProvider::new(64)), true);
        let request = SearchRequest::new("hybrid retrieval", 5, RetrievalMode::Hybrid);
        let first = fixture.retriever.search(request.clone()).await.unwrap();
        let second = fixture.retriever.search(request).await.unwrap();
        assert_eq!(first.results, second.results);
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected() {
        let fixture = fixture(Arc::new(HashEmbeddingProvider::new(64)), false);
        let err = fixture
            .retriever
            .search(SearchRequest::new("query", 0, RetrievalMode::Hybrid))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let err = fixture
            .retriever
            .search(SearchRequest::new("   ", 5, RetrievalMode::Hybrid))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }
}
