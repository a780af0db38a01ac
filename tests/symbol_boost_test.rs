//! End-to-end ranking: a file defining an exported symbol must outrank a
//! file that merely imports it, in every mode except vector-only.

use lodestone::config::{IndexingConfig, RetrievalConfig};
use lodestone::embedding::HashEmbeddingProvider;
use lodestone::index::SymbolIndex;
use lodestone::indexing::FilePipeline;
use lodestone::parsing::ParserRegistry;
use lodestone::retrieve::{HybridRetriever, RetrievalMode, SearchRequest};
use lodestone::storage::{ContentStore, RelationalStore};
use lodestone::vector::{Similarity, VectorStore};
use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const DIMS: usize = 64;

struct Corpus {
    _state: TempDir,
    corpus: TempDir,
    retriever: HybridRetriever,
}

async fn indexed_corpus() -> Corpus {
    let state = TempDir::new().unwrap();
    let corpus = TempDir::new().unwrap();
    let root = corpus.path();

    fs::create_dir_all(root.join("src/services")).unwrap();
    fs::write(
        root.join("src/services/AuthService.ts"),
        r#"// AuthService validates AuthService sessions for the AuthService API.
export class AuthService {
    login(user: string): boolean {
        return AuthService.enabled && user.length > 0;
    }
    static enabled = true;
}
"#,
    )
    .unwrap();
    fs::write(
        root.join("src/app.ts"),
        r#"import { AuthService as Auth } from "./services/AuthService";

const service = new Auth();
service.login("admin");
"#,
    )
    .unwrap();
    fs::write(
        root.join("src/logger.ts"),
        "export class Logger { info(message: string): void {} }\n",
    )
    .unwrap();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(
        root.join("docs/auth-guide.md"),
        "The AuthService handles login and sessions for every request.\n",
    )
    .unwrap();
    fs::write(
        root.join("docs/sso.md"),
        "Single sign-on builds on AuthService tokens.\n",
    )
    .unwrap();

    let relational = Arc::new(Mutex::new(RelationalStore::open_in_memory().unwrap()));
    let index = Arc::new(SymbolIndex::open(&state.path().join("keyword")).unwrap());
    let vectors = Arc::new(VectorStore::open(state.path().join("vector")).unwrap());
    vectors
        .create_collection("knowledge", "gemma3", DIMS, Similarity::Cosine)
        .unwrap();
    let embedder = Arc::new(HashEmbeddingProvider::new(DIMS));

    let pipeline = FilePipeline::new(
        Arc::new(ContentStore::new()),
        Arc::new(ParserRegistry::new()),
        relational,
        index.clone(),
        vectors.clone(),
        embedder.clone(),
        IndexingConfig::default(),
        "knowledge",
        "gemma3",
    );
    let stats = pipeline.index_paths(&[root.to_path_buf()]).await.unwrap();
    assert_eq!(stats.files_indexed, 5);

    let retriever = HybridRetriever::new(
        index,
        vectors,
        embedder,
        RetrievalConfig {
            memoise: false,
            ..Default::default()
        },
        "knowledge",
        "gemma3",
    );

    Corpus {
        _state: state,
        corpus,
        retriever,
    }
}

#[tokio::test]
async fn defining_file_ranks_first_under_symbol_bm25() {
    let fixture = indexed_corpus().await;

    let response = fixture
        .retriever
        .search(SearchRequest::new(
            "AuthService",
            5,
            RetrievalMode::SymbolBm25Only,
        ))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    assert!(
        response.results[0].doc_id.ends_with("src/services/AuthService.ts"),
        "definer should rank first, got {:?}",
        response.results[0].doc_id
    );

    // The import-only caller is either below rank 3 or absent.
    if let Some(position) = response
        .results
        .iter()
        .position(|d| d.doc_id.ends_with("src/app.ts"))
    {
        assert!(position >= 2, "penalised importer climbed to rank {position}");
    }

    let _ = &fixture.corpus;
}

#[tokio::test]
async fn definer_outranks_importer_in_every_keyword_mode() {
    let fixture = indexed_corpus().await;

    for mode in [
        RetrievalMode::Bm25Only,
        RetrievalMode::SymbolBm25Only,
        RetrievalMode::Hybrid,
    ] {
        let response = fixture
            .retriever
            .search(SearchRequest::new("AuthService", 5, mode))
            .await
            .unwrap();

        let rank_of = |suffix: &str| {
            response
                .results
                .iter()
                .position(|d| d.doc_id.ends_with(suffix))
        };
        let definer = rank_of("AuthService.ts");
        let importer = rank_of("app.ts");
        assert!(definer.is_some(), "definer missing in {mode:?}");
        if let (Some(definer), Some(importer)) = (definer, importer) {
            assert!(
                definer < importer,
                "mode {mode:?}: definer at {definer}, importer at {importer}"
            );
        }
    }
}
