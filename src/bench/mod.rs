//! Retrieval quality benchmark.
//!
//! Drives the retriever over a labelled query suite in every mode and
//! reports Recall@K, Precision@K, MRR and nDCG@K plus latency
//! aggregates. The quality numbers are pure functions of the retrieval
//! results: the same suite and the same embedding model produce
//! bit-identical metrics across runs.

use crate::error::{RetrievalError, RetrievalResult};
use crate::retrieve::{HybridRetriever, RetrievalMode, SearchRequest};
use comfy_table::Table;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Code,
    Conceptual,
    Mixed,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Conceptual => "conceptual",
            Self::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub query_text: String,
    pub relevant_docs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchSuite {
    pub version: String,
    pub queries: Vec<BenchQuery>,
}

impl BenchSuite {
    pub fn load_from_path(path: &Path) -> RetrievalResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RetrievalError::io_path(path, e))?;
        let suite: Self = serde_json::from_str(&raw).map_err(|e| {
            RetrievalError::invalid(format!("suite {} does not parse: {e}", path.display()))
        })?;
        suite.validate()?;
        Ok(suite)
    }

    pub fn validate(&self) -> RetrievalResult<()> {
        if self.queries.is_empty() {
            return Err(RetrievalError::invalid("suite must include at least one query"));
        }
        let mut ids = BTreeSet::new();
        for query in &self.queries {
            if query.id.trim().is_empty() {
                return Err(RetrievalError::invalid("query id must be non-empty"));
            }
            if query.query_text.trim().is_empty() {
                return Err(RetrievalError::invalid(format!(
                    "query '{}' has empty text",
                    query.id
                )));
            }
            if query.relevant_docs.is_empty() {
                return Err(RetrievalError::invalid(format!(
                    "query '{}' has no relevance labels",
                    query.id
                )));
            }
            if !ids.insert(query.id.clone()) {
                return Err(RetrievalError::invalid(format!(
                    "duplicate query id '{}'",
                    query.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LatencySummary {
    pub mean_us: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MethodMetrics {
    pub recall_at_k: f64,
    pub precision_at_k: f64,
    pub mrr: f64,
    pub ndcg_at_k: f64,
    pub query_count: usize,
    pub latency: LatencySummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub suite_version: String,
    pub k: usize,
    pub per_method: BTreeMap<String, MethodMetrics>,
    /// method -> query type -> metrics
    pub per_type: BTreeMap<String, BTreeMap<String, MethodMetrics>>,
    /// Methods ranked by nDCG@K, best first.
    pub leaderboard: Vec<String>,
}

pub struct BenchmarkHarness<'a> {
    retriever: &'a HybridRetriever,
    k: usize,
}

impl<'a> BenchmarkHarness<'a> {
    pub fn new(retriever: &'a HybridRetriever, k: usize) -> Self {
        Self { k: k.max(1), retriever }
    }

    pub async fn run(&self, suite: &BenchSuite) -> RetrievalResult<BenchReport> {
        suite.validate()?;

        let mut per_method = BTreeMap::new();
        let mut per_type: BTreeMap<String, BTreeMap<String, MethodMetrics>> = BTreeMap::new();

        for mode in RetrievalMode::all() {
            let mut samples: Vec<QuerySample> = Vec::with_capacity(suite.queries.len());
            for query in &suite.queries {
                let started = Instant::now();
                let response = self
                    .retriever
                    .search(SearchRequest::new(query.query_text.clone(), self.k, mode))
                    .await?;
                let elapsed_us = started.elapsed().as_micros() as f64;

                let retrieved: Vec<String> =
                    response.results.into_iter().map(|d| d.doc_id).collect();
                samples.push(QuerySample {
                    query_type: query.query_type,
                    retrieved,
                    relevant: query.relevant_docs.clone(),
                    elapsed_us,
                });
            }

            per_method.insert(mode.as_str().to_string(), aggregate(&samples, self.k));

            let mut by_type: BTreeMap<String, MethodMetrics> = BTreeMap::new();
            for query_type in [QueryType::Code, QueryType::Conceptual, QueryType::Mixed] {
                let subset: Vec<QuerySample> = samples
                    .iter()
                    .filter(|s| s.query_type == query_type)
                    .cloned()
                    .collect();
                if !subset.is_empty() {
                    by_type.insert(query_type.as_str().to_string(), aggregate(&subset, self.k));
                }
            }
            per_type.insert(mode.as_str().to_string(), by_type);
        }

        let mut leaderboard: Vec<String> = per_method.keys().cloned().collect();
        leaderboard.sort_by(|a, b| {
            let ma = &per_method[a];
            let mb = &per_method[b];
            mb.ndcg_at_k
                .partial_cmp(&ma.ndcg_at_k)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    mb.recall_at_k
                        .partial_cmp(&ma.recall_at_k)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.cmp(b))
        });

        Ok(BenchReport {
            suite_version: suite.version.clone(),
            k: self.k,
            per_method,
            per_type,
            leaderboard,
        })
    }
}

#[derive(Debug, Clone)]
struct QuerySample {
    query_type: QueryType,
    retrieved: Vec<String>,
    relevant: Vec<String>,
    elapsed_us: f64,
}

fn aggregate(samples: &[QuerySample], k: usize) -> MethodMetrics {
    if samples.is_empty() {
        return MethodMetrics::default();
    }
    let n = samples.len() as f64;
    let mut metrics = MethodMetrics {
        query_count: samples.len(),
        ..Default::default()
    };
    for sample in samples {
        metrics.recall_at_k += recall_at_k(&sample.retrieved, &sample.relevant, k);
        metrics.precision_at_k += precision_at_k(&sample.retrieved, &sample.relevant, k);
        metrics.mrr += reciprocal_rank(&sample.retrieved, &sample.relevant);
        metrics.ndcg_at_k += ndcg_at_k(&sample.retrieved, &sample.relevant, k);
    }
    metrics.recall_at_k /= n;
    metrics.precision_at_k /= n;
    metrics.mrr /= n;
    metrics.ndcg_at_k /= n;

    let mut latencies: Vec<f64> = samples.iter().map(|s| s.elapsed_us).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    metrics.latency = LatencySummary {
        mean_us: latencies.iter().sum::<f64>() / n,
        p50_us: percentile(&latencies, 50.0),
        p95_us: percentile(&latencies, 95.0),
        p99_us: percentile(&latencies, 99.0),
    };
    metrics
}

pub fn recall_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let cut: BTreeSet<&String> = retrieved.iter().take(k).collect();
    let hits = relevant.iter().filter(|r| cut.contains(r)).count();
    hits as f64 / relevant.len() as f64
}

pub fn precision_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let relevant_set: BTreeSet<&String> = relevant.iter().collect();
    let hits = retrieved
        .iter()
        .take(k)
        .filter(|r| relevant_set.contains(r))
        .count();
    hits as f64 / k as f64
}

pub fn reciprocal_rank(retrieved: &[String], relevant: &[String]) -> f64 {
    let relevant_set: BTreeSet<&String> = relevant.iter().collect();
    retrieved
        .iter()
        .position(|r| relevant_set.contains(r))
        .map(|rank| 1.0 / (rank + 1) as f64)
        .unwrap_or(0.0)
}

/// Binary-relevance nDCG with the standard log2 discount.
pub fn ndcg_at_k(retrieved: &[String], relevant: &[String], k: usize) -> f64 {
    let relevant_set: BTreeSet<&String> = relevant.iter().collect();
    let dcg: f64 = retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, r)| relevant_set.contains(r))
        .map(|(i, _)| 1.0 / ((i + 2) as f64).log2())
        .sum();
    let ideal_hits = relevant.len().min(k);
    let idcg: f64 = (0..ideal_hits).map(|i| 1.0 / ((i + 2) as f64).log2()).sum();
    if idcg == 0.0 { 0.0 } else { dcg / idcg }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Leaderboard rendering for the CLI.
pub fn render_leaderboard(report: &BenchReport) -> String {
    let mut table = Table::new();
    table.set_header(vec![
        "method".to_string(),
        format!("recall@{}", report.k),
        format!("precision@{}", report.k),
        "mrr".to_string(),
        format!("ndcg@{}", report.k),
        "p50 (us)".to_string(),
        "p95 (us)".to_string(),
        "p99 (us)".to_string(),
    ]);
    for method in &report.leaderboard {
        let metrics = &report.per_method[method];
        table.add_row(vec![
            method.clone(),
            format!("{:.4}", metrics.recall_at_k),
            format!("{:.4}", metrics.precision_at_k),
            format!("{:.4}", metrics.mrr),
            format!("{:.4}", metrics.ndcg_at_k),
            format!("{:.0}", metrics.latency.p50_us),
            format!("{:.0}", metrics.latency.p95_us),
            format!("{:.0}", metrics.latency.p99_us),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn recall_counts_intersection_over_relevant() {
        let retrieved = docs(&["a", "b", "c", "d"]);
        let relevant = docs(&["b", "d", "z"]);
        assert!((recall_at_k(&retrieved, &relevant, 4) - 2.0 / 3.0).abs() < 1e-12);
        assert!((recall_at_k(&retrieved, &relevant, 1) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn precision_divides_by_k() {
        let retrieved = docs(&["a", "b", "c", "d"]);
        let relevant = docs(&["b", "d"]);
        assert!((precision_at_k(&retrieved, &relevant, 4) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mrr_uses_first_relevant_hit() {
        let retrieved = docs(&["x", "y", "b"]);
        let relevant = docs(&["b"]);
        assert!((reciprocal_rank(&retrieved, &relevant) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(reciprocal_rank(&retrieved, &docs(&["q"])), 0.0);
    }

    #[test]
    fn ndcg_perfect_ranking_is_one() {
        let relevant = docs(&["a", "b"]);
        let perfect = docs(&["a", "b", "x"]);
        assert!((ndcg_at_k(&perfect, &relevant, 10) - 1.0).abs() < 1e-12);

        let worse = docs(&["x", "a", "b"]);
        let score = ndcg_at_k(&worse, &relevant, 10);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn percentile_picks_upper_rank() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&sorted, 50.0), 5.0);
        assert_eq!(percentile(&sorted, 95.0), 10.0);
        assert_eq!(percentile(&sorted, 99.0), 10.0);
    }

    #[test]
    fn suite_validation_rejects_duplicates_and_blanks() {
        let mut suite = BenchSuite {
            version: "1".to_string(),
            queries: vec![
                BenchQuery {
                    id: "q1".to_string(),
                    query_type: QueryType::Code,
                    query_text: "find auth".to_string(),
                    relevant_docs: docs(&["a.ts"]),
                },
                BenchQuery {
                    id: "q1".to_string(),
                    query_type: QueryType::Mixed,
                    query_text: "again".to_string(),
                    relevant_docs: docs(&["b.ts"]),
                },
            ],
        };
        assert!(suite.validate().is_err());

        suite.queries[1].id = "q2".to_string();
        assert!(suite.validate().is_ok());

        suite.queries[1].relevant_docs.clear();
        assert!(suite.validate().is_err());
    }

    #[test]
    fn aggregate_is_a_pure_function_of_results() {
        let samples = vec![
            QuerySample {
                query_type: QueryType::Code,
                retrieved: docs(&["a", "b"]),
                relevant: docs(&["a"]),
                elapsed_us: 100.0,
            },
            QuerySample {
                query_type: QueryType::Conceptual,
                retrieved: docs(&["x", "a"]),
                relevant: docs(&["a"]),
                elapsed_us: 300.0,
            },
        ];
        let first = aggregate(&samples, 5);
        let second = aggregate(&samples, 5);
        assert_eq!(first.recall_at_k.to_bits(), second.recall_at_k.to_bits());
        assert_eq!(first.mrr.to_bits(), second.mrr.to_bits());
        assert_eq!(first.ndcg_at_k.to_bits(), second.ndcg_at_k.to_bits());
    }
}
