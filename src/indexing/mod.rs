//! Bulk file indexing: walk, parse, commit, embed.
//!
//! Per file the commit is atomic — relational row, symbols, imports and
//! keyword postings either all land or none do. Across files no ordering
//! is guaranteed; parsing fans out on the rayon pool while store writes
//! stay sequential. Transient per-file read failures are recorded and do
//! not abort the run.

use crate::config::IndexingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, RetrievalResult};
use crate::index::{FileDocument, SymbolIndex};
use crate::parsing::{Language, ParsedFile, ParserRegistry};
use crate::project::CLAUDE_IGNORE_FILE;
use crate::storage::relational::{FileRecord, RelationalStore};
use crate::storage::{ContentStore, FileContent};
use crate::vector::{EmbeddedDocument, VectorStore};
use ignore::WalkBuilder;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Byte cap on content sent to the embedding service per file.
const EMBED_CONTENT_CAP: usize = 8_192;

/// Typed progress updates; the host decides whether to consume them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexProgress {
    Walking { discovered: usize },
    Parsed { current: usize, total: usize },
    Committed { files: usize },
    Embedding { current: usize, total: usize },
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub files_tombstoned: usize,
    pub symbols: usize,
    pub embedded: usize,
}

pub struct FilePipeline {
    content: Arc<ContentStore>,
    registry: Arc<ParserRegistry>,
    relational: Arc<Mutex<RelationalStore>>,
    index: Arc<SymbolIndex>,
    vectors: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: IndexingConfig,
    collection: String,
    model: String,
    progress: Option<crossbeam_channel::Sender<IndexProgress>>,
}

struct ParsedUnit {
    path: PathBuf,
    content: FileContent,
    language: Language,
    parsed: ParsedFile,
}

impl FilePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content: Arc<ContentStore>,
        registry: Arc<ParserRegistry>,
        relational: Arc<Mutex<RelationalStore>>,
        index: Arc<SymbolIndex>,
        vectors: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: IndexingConfig,
        collection: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            content,
            registry,
            relational,
            index,
            vectors,
            embedder,
            config,
            collection: collection.into(),
            model: model.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: crossbeam_channel::Sender<IndexProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, event: IndexProgress) {
        if let Some(sender) = &self.progress {
            let _ = sender.try_send(event);
        }
    }

    /// Index every file under the given roots, tombstoning records whose
    /// files disappeared.
    pub async fn index_paths(&self, roots: &[PathBuf]) -> RetrievalResult<IndexStats> {
        let files = self.discover(roots);
        self.emit(IndexProgress::Walking {
            discovered: files.len(),
        });

        let content = self.content.clone();
        let registry = self.registry.clone();
        let parse_threads = self.config.parallel_threads.max(1);
        let units_and_failures = tokio::task::spawn_blocking(move || {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(parse_threads)
                .build();
            let parse_all = |files: &[PathBuf]| -> Vec<(PathBuf, Option<ParsedUnit>)> {
                files
                    .par_iter()
                    .map(|path| {
                        let outcome = parse_one(&content, &registry, path);
                        (path.clone(), outcome)
                    })
                    .collect()
            };
            match pool {
                Ok(pool) => pool.install(|| parse_all(&files)),
                Err(_) => parse_all(&files),
            }
        })
        .await
        .map_err(|e| RetrievalError::io("indexing pool", e))?;

        let mut stats = IndexStats::default();
        let mut units = Vec::new();
        let total = units_and_failures.len();
        for (i, (path, unit)) in units_and_failures.into_iter().enumerate() {
            match unit {
                Some(unit) => units.push(unit),
                None => {
                    tracing::warn!("Skipping unreadable file {}", path.display());
                    stats.files_failed += 1;
                }
            }
            self.emit(IndexProgress::Parsed {
                current: i + 1,
                total,
            });
        }

        // Per-file atomic commits into the relational store and the
        // keyword index; the single tantivy commit at the end is the
        // segment swap readers observe.
        for unit in &units {
            self.commit_unit(unit)?;
            stats.files_indexed += 1;
            stats.symbols += unit.parsed.symbols.len();
        }
        self.index.commit()?;
        self.emit(IndexProgress::Committed {
            files: stats.files_indexed,
        });

        stats.files_tombstoned = self.tombstone_missing(roots, &units)?;
        stats.embedded = self.embed_units(&units).await?;
        self.emit(IndexProgress::Finished);
        Ok(stats)
    }

    fn discover(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in roots {
            if root.is_file() {
                files.push(root.clone());
                continue;
            }
            let mut builder = WalkBuilder::new(root);
            builder
                .hidden(true)
                .git_ignore(true)
                .git_global(true)
                .require_git(false)
                .follow_links(false)
                .add_custom_ignore_filename(CLAUDE_IGNORE_FILE);

            let mut override_builder = ignore::overrides::OverrideBuilder::new(root);
            for pattern in &self.config.ignore_patterns {
                if let Err(e) = override_builder.add(&format!("!{pattern}")) {
                    tracing::warn!("Invalid ignore pattern '{pattern}': {e}");
                }
            }
            if let Ok(overrides) = override_builder.build() {
                builder.overrides(overrides);
            }

            files.extend(
                builder
                    .build()
                    .filter_map(Result::ok)
                    .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
                    .map(|entry| entry.path().to_path_buf()),
            );
        }
        files.sort();
        files.dedup();
        files
    }

    fn commit_unit(&self, unit: &ParsedUnit) -> RetrievalResult<()> {
        let mtime = unit
            .content
            .mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let record = FileRecord {
            path: unit.path.clone(),
            hash: unit.content.hash.clone(),
            size: unit.content.size,
            mtime,
            language: unit.language.name().to_string(),
            parse_success: unit.parsed.parse_success,
            parse_errors: unit
                .parsed
                .diagnostics
                .iter()
                .map(|d| format!("{}:{}: {}", d.line + 1, d.column, d.message))
                .collect(),
            tombstoned: false,
        };
        self.relational
            .lock()
            .upsert_file(&record, &unit.parsed.symbols, &unit.parsed.imports)?;

        let content_text = unit.content.text().unwrap_or("").to_string();
        self.index.replace_file(&FileDocument {
            path: unit.path.to_string_lossy().into_owned(),
            content: content_text,
            symbols: unit.parsed.symbols.iter().map(|s| s.name.to_string()).collect(),
            defined: unit
                .parsed
                .symbols
                .iter()
                .filter(|s| s.kind.is_definition())
                .map(|s| s.name.to_string())
                .collect(),
            exports: unit.parsed.exports.clone(),
            imports: unit
                .parsed
                .imports
                .iter()
                .map(|i| i.specifier.to_string())
                .collect(),
            mtime,
            file_hash: unit.content.hash.clone(),
        })?;
        Ok(())
    }

    fn tombstone_missing(&self, roots: &[PathBuf], units: &[ParsedUnit]) -> RetrievalResult<usize> {
        let live = self.relational.lock().live_files()?;
        let seen: std::collections::HashSet<&Path> =
            units.iter().map(|u| u.path.as_path()).collect();

        let mut tombstoned = 0;
        for record in live {
            let under_root = roots.iter().any(|root| record.path.starts_with(root));
            if under_root && !seen.contains(record.path.as_path()) && !record.path.exists() {
                self.relational.lock().tombstone_file(&record.path)?;
                self.index
                    .remove_file(&record.path.to_string_lossy())?;
                self.vectors
                    .remove(&self.collection, &[record.path.to_string_lossy().into_owned()])?;
                tombstoned += 1;
            }
        }
        if tombstoned > 0 {
            self.index.commit()?;
        }
        Ok(tombstoned)
    }

    async fn embed_units(&self, units: &[ParsedUnit]) -> RetrievalResult<usize> {
        let candidates: Vec<&ParsedUnit> = units.iter().filter(|u| u.content.is_text).collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut embedded = 0;
        let batch_size = self.config.embed_batch_size.max(1);
        for (batch_index, batch) in candidates.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch
                .iter()
                .map(|unit| {
                    let text = unit.content.text().unwrap_or("");
                    crate::parsing::parser::truncate_utf8(text, EMBED_CONTENT_CAP).to_string()
                })
                .collect();

            let vectors = match self.embedder.embed(&texts, &self.model, false).await {
                Ok(vectors) => vectors,
                Err(err @ RetrievalError::DimensionMismatch { .. }) => return Err(err),
                Err(err) => {
                    tracing::warn!("Embedding batch failed, keyword-only index for it: {err}");
                    continue;
                }
            };

            let documents: Vec<EmbeddedDocument> = batch
                .iter()
                .zip(vectors)
                .map(|(unit, vector)| EmbeddedDocument {
                    id: unit.path.to_string_lossy().into_owned(),
                    digest: unit.content.hash.clone(),
                    metadata: json!({
                        "language": unit.language.name(),
                        "path": unit.path.to_string_lossy(),
                    }),
                    vector,
                })
                .collect();
            embedded += self.vectors.insert(&self.collection, &self.model, documents)?;
            self.emit(IndexProgress::Embedding {
                current: (batch_index * batch_size + batch.len()).min(candidates.len()),
                total: candidates.len(),
            });
        }
        Ok(embedded)
    }
}

fn parse_one(
    content: &ContentStore,
    registry: &ParserRegistry,
    path: &Path,
) -> Option<ParsedUnit> {
    let file_content = content.read(path).ok()?;
    let language = if file_content.is_text {
        Language::from_path(path).unwrap_or(Language::Unknown)
    } else {
        Language::Binary
    };
    let parsed = match file_content.text() {
        Some(text) => registry.parse(language, text),
        None => ParsedFile::empty(language, 0),
    };
    Some(ParsedUnit {
        path: path.to_path_buf(),
        content: file_content,
        language,
        parsed,
    })
}
