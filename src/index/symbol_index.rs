//! Keyword index with symbol-aware ranking.
//!
//! The base relevance signal is BM25 over tokenised file content
//! (tantivy's scorer, k1 = 1.2, b = 0.75, average document length
//! maintained online). On top of the base score, per matched query term:
//!
//! - basename substring match          +2.0
//! - exported symbol name match        +3.0
//! - defined (class/fn/method) match   +1.5
//! - any symbol name match             +0.5
//!
//! A file that only *imports* a term — defining or exporting nothing for
//! it, and exporting no symbols at all — is scaled by 0.3. Query terms
//! of length <= 2 are dropped from symbol matching only. Ties break by
//! newer mtime, shorter path, then lexicographic path.

use crate::error::{IndexError, IndexResult};
use crate::index::schema::KeywordSchema;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{
    Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, TantivyDocument as Document,
    Term,
};

/// Boost constants from the ranking contract.
const BOOST_BASENAME: f32 = 2.0;
const BOOST_EXPORTED: f32 = 3.0;
const BOOST_DEFINED: f32 = 1.5;
const BOOST_ANY_SYMBOL: f32 = 0.5;
const IMPORT_ONLY_FACTOR: f32 = 0.3;

/// Minimum term length for symbol matching.
const MIN_SYMBOL_TERM: usize = 3;

/// Writer heap for batch operations.
const WRITER_HEAP_BYTES: usize = 100_000_000;

/// Everything the index stores about one file version.
#[derive(Debug, Clone, Default)]
pub struct FileDocument {
    pub path: String,
    pub content: String,
    pub symbols: Vec<String>,
    pub defined: Vec<String>,
    pub exports: Vec<String>,
    pub imports: Vec<String>,
    pub mtime: i64,
    pub file_hash: String,
}

/// One ranked keyword hit.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub path: String,
    /// Final score after boosts (equal to `bm25` in plain mode).
    pub score: f32,
    /// Raw content BM25 component.
    pub bm25: f32,
    pub mtime: i64,
}

pub struct SymbolIndex {
    index: Index,
    reader: IndexReader,
    fields: KeywordSchema,
    writer: Mutex<Option<IndexWriter<Document>>>,
}

impl SymbolIndex {
    pub fn open(index_path: &Path) -> IndexResult<Self> {
        std::fs::create_dir_all(index_path).map_err(|e| IndexError::Open {
            path: index_path.to_path_buf(),
            message: e.to_string(),
        })?;

        let (schema, fields) = KeywordSchema::build();
        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(index_path).map_err(|e| IndexError::tantivy("open", e))?
        } else {
            let dir = MmapDirectory::open(index_path).map_err(|e| IndexError::tantivy("open", e))?;
            Index::create(dir, schema, IndexSettings::default())
                .map_err(|e| IndexError::tantivy("create", e))?
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::tantivy("reader", e))?;
        reader.reload().map_err(|e| IndexError::tantivy("reload", e))?;

        Ok(Self {
            index,
            reader,
            fields,
            writer: Mutex::new(None),
        })
    }

    /// Open a writer for a batch of replacements. Idempotent.
    pub fn start_batch(&self) -> IndexResult<()> {
        let mut writer_lock = self.writer.lock().expect("writer lock");
        if writer_lock.is_none() {
            let writer = self
                .index
                .writer::<Document>(WRITER_HEAP_BYTES)
                .map_err(|e| IndexError::tantivy("writer", e))?;
            *writer_lock = Some(writer);
        }
        Ok(())
    }

    /// Queue an atomic per-file replacement: all old postings for the
    /// path are deleted and the new document added in the same commit,
    /// so readers never observe a half-updated file.
    pub fn replace_file(&self, doc: &FileDocument) -> IndexResult<()> {
        self.start_batch()?;
        let mut writer_lock = self.writer.lock().expect("writer lock");
        let writer = writer_lock.as_mut().expect("batch started");

        writer.delete_term(Term::from_field_text(self.fields.path, &doc.path));

        let mut document = Document::new();
        document.add_text(self.fields.path, &doc.path);
        document.add_text(self.fields.basename, basename_of(&doc.path));
        document.add_text(self.fields.content, &doc.content);
        document.add_text(self.fields.symbols, doc.symbols.join("\n"));
        document.add_text(self.fields.defined, doc.defined.join("\n"));
        document.add_text(self.fields.exports, doc.exports.join("\n"));
        document.add_text(self.fields.imports, doc.imports.join("\n"));
        document.add_i64(self.fields.mtime, doc.mtime);
        document.add_text(self.fields.file_hash, &doc.file_hash);
        writer
            .add_document(document)
            .map_err(|e| IndexError::tantivy("add_document", e))?;
        Ok(())
    }

    /// Delete all postings for a path in the current batch.
    pub fn remove_file(&self, path: &str) -> IndexResult<()> {
        self.start_batch()?;
        let mut writer_lock = self.writer.lock().expect("writer lock");
        let writer = writer_lock.as_mut().expect("batch started");
        writer.delete_term(Term::from_field_text(self.fields.path, path));
        Ok(())
    }

    /// Commit the batch and reload the reader; this is the single
    /// segment swap readers wait on.
    pub fn commit(&self) -> IndexResult<()> {
        let mut writer_lock = self.writer.lock().expect("writer lock");
        if let Some(writer) = writer_lock.as_mut() {
            writer.commit().map_err(|e| IndexError::tantivy("commit", e))?;
        }
        *writer_lock = None;
        self.reader.reload().map_err(|e| IndexError::tantivy("reload", e))?;
        Ok(())
    }

    /// Drop every document. Used by the destructive wipe path.
    pub fn clear(&self) -> IndexResult<()> {
        self.start_batch()?;
        {
            let mut writer_lock = self.writer.lock().expect("writer lock");
            let writer = writer_lock.as_mut().expect("batch started");
            writer
                .delete_all_documents()
                .map_err(|e| IndexError::tantivy("delete_all", e))?;
        }
        self.commit()
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Plain BM25 over content, no symbol boosts.
    pub fn search_bm25(&self, query: &str, k: usize) -> IndexResult<Vec<KeywordHit>> {
        self.search_inner(query, k, false)
    }

    /// Symbol-aware BM25: content base plus the boost table.
    pub fn search_symbol_bm25(&self, query: &str, k: usize) -> IndexResult<Vec<KeywordHit>> {
        self.search_inner(query, k, true)
    }

    fn search_inner(&self, query: &str, k: usize, symbol_aware: bool) -> IndexResult<Vec<KeywordHit>> {
        let terms = tokenise(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let symbol_terms: Vec<&String> =
            terms.iter().filter(|t| t.len() >= MIN_SYMBOL_TERM).collect();

        let searcher = self.reader.searcher();
        let pool = (k * 3).max(50);

        // Base pass: BM25 over content only.
        let content_query = self.should_query(&terms, &[self.fields.content]);
        let content_hits = searcher
            .search(&content_query, &TopDocs::with_limit(pool))
            .map_err(|e| IndexError::tantivy("search", e))?;

        let mut scored: HashMap<String, ScoredDoc> = HashMap::new();
        for (score, addr) in content_hits {
            let doc: Document = searcher
                .doc(addr)
                .map_err(|e| IndexError::tantivy("doc", e))?;
            let stored = self.stored_fields(&doc);
            scored
                .entry(stored.path.clone())
                .or_insert(ScoredDoc { bm25: score, stored });
        }

        // Recall pass: files that only match on the symbol side still
        // become candidates (zero content BM25).
        if symbol_aware && !symbol_terms.is_empty() {
            let owned: Vec<String> = symbol_terms.iter().map(|t| (*t).clone()).collect();
            let side_query = self.should_query(
                &owned,
                &[
                    self.fields.symbols,
                    self.fields.exports,
                    self.fields.imports,
                    self.fields.basename,
                ],
            );
            let side_hits = searcher
                .search(&side_query, &TopDocs::with_limit(pool))
                .map_err(|e| IndexError::tantivy("search", e))?;
            for (_score, addr) in side_hits {
                let doc: Document = searcher
                    .doc(addr)
                    .map_err(|e| IndexError::tantivy("doc", e))?;
                let stored = self.stored_fields(&doc);
                scored
                    .entry(stored.path.clone())
                    .or_insert(ScoredDoc { bm25: 0.0, stored });
            }
        }

        let mut hits: Vec<KeywordHit> = scored
            .into_values()
            .map(|doc| {
                let score = if symbol_aware {
                    boost_score(doc.bm25, &doc.stored, &symbol_terms)
                } else {
                    doc.bm25
                };
                KeywordHit {
                    path: doc.stored.path,
                    score,
                    bm25: doc.bm25,
                    mtime: doc.stored.mtime,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.mtime.cmp(&a.mtime))
                .then_with(|| a.path.len().cmp(&b.path.len()))
                .then_with(|| a.path.cmp(&b.path))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn should_query(&self, terms: &[String], fields: &[tantivy::schema::Field]) -> BooleanQuery {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for term in terms {
            for field in fields {
                let term_query = TermQuery::new(
                    Term::from_field_text(*field, term),
                    IndexRecordOption::WithFreqs,
                );
                clauses.push((Occur::Should, Box::new(term_query)));
            }
        }
        BooleanQuery::new(clauses)
    }

    fn stored_fields(&self, doc: &Document) -> StoredDoc {
        let text = |field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        let names = |field| -> Vec<String> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(|s| s.split('\n').filter(|n| !n.is_empty()).map(str::to_lowercase).collect())
                .unwrap_or_default()
        };
        StoredDoc {
            path: text(self.fields.path),
            basename: text(self.fields.basename).to_lowercase(),
            symbols: names(self.fields.symbols),
            defined: names(self.fields.defined),
            exports: names(self.fields.exports),
            imports: names(self.fields.imports),
            mtime: doc
                .get_first(self.fields.mtime)
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        }
    }
}

struct ScoredDoc {
    bm25: f32,
    stored: StoredDoc,
}

struct StoredDoc {
    path: String,
    basename: String,
    symbols: Vec<String>,
    defined: Vec<String>,
    exports: Vec<String>,
    imports: Vec<String>,
    mtime: i64,
}

/// Lowercase, split on non-alphanumeric (underscore kept), drop empties.
pub fn tokenise(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn basename_of(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Exported names match in both directions ("matches / is matched by").
fn exported_matches(name: &str, term: &str) -> bool {
    name == term || name.contains(term) || term.contains(name)
}

/// Defined and plain symbol names match when they contain the term.
fn name_contains(name: &str, term: &str) -> bool {
    name == term || name.contains(term)
}

fn boost_score(bm25: f32, stored: &StoredDoc, symbol_terms: &[&String]) -> f32 {
    let mut score = bm25;
    let mut import_only_term = false;

    for term in symbol_terms.iter().copied() {
        let term: &str = term.as_str();
        if stored.basename.contains(term) {
            score += BOOST_BASENAME;
        }
        let exported = stored.exports.iter().any(|n| exported_matches(n, term));
        if exported {
            score += BOOST_EXPORTED;
        }
        let defined = stored.defined.iter().any(|n| name_contains(n, term));
        if defined {
            score += BOOST_DEFINED;
        }
        let any_symbol = stored.symbols.iter().any(|n| name_contains(n, term));
        if any_symbol {
            score += BOOST_ANY_SYMBOL;
        }
        let imported = stored.imports.iter().any(|n| name_contains(n, term));
        if imported && !defined && !exported && !any_symbol {
            import_only_term = true;
        }
    }

    if import_only_term && stored.exports.is_empty() {
        score *= IMPORT_ONLY_FACTOR;
    }
    score
}
