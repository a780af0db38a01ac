//! Lodestone CLI: index, search, benchmark, and serve the MCP surface.

use clap::{Parser, Subcommand};
use lodestone::bench::{BenchSuite, BenchmarkHarness, render_leaderboard};
use lodestone::mcp::RetrievalServer;
use lodestone::retrieve::{RetrievalMode, SearchRequest};
use lodestone::AppContext;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lodestone", version, about = "Hybrid code and knowledge retrieval engine")]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialise storage for the selected scope
    Init,
    /// Index files into the knowledge base
    Index {
        /// Files or directories to index
        paths: Vec<PathBuf>,
    },
    /// Run a ranked query
    Search {
        query: String,
        /// Number of results
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        /// One of bm25_only, symbol_bm25_only, vector_only, hybrid, reranked
        #[arg(short, long, default_value = "hybrid")]
        mode: String,
        /// Lower similarity cut for the vector channel
        #[arg(long, default_value_t = 0.0)]
        threshold: f32,
    },
    /// Evaluate retrieval quality against a labelled suite
    Bench {
        /// Path to the suite JSON
        suite: PathBuf,
        /// Evaluation cut
        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },
    /// Serve the MCP tool/resource surface on stdio
    Serve,
    /// Print a health snapshot of stores, models and collections
    Status,
}

fn parse_mode(mode: &str) -> Option<RetrievalMode> {
    Some(match mode {
        "bm25_only" => RetrievalMode::Bm25Only,
        "symbol_bm25_only" => RetrievalMode::SymbolBm25Only,
        "vector_only" => RetrievalMode::VectorOnly,
        "hybrid" => RetrievalMode::Hybrid,
        "reranked" => RetrievalMode::Reranked,
        _ => return None,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_root = cli
        .project
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    match run(cli, project_root).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, project_root: PathBuf) -> anyhow::Result<()> {
    let context = AppContext::build(&project_root)?;

    match cli.command {
        Commands::Init => {
            let base = context.layout.base_path(context.scope);
            println!("Initialised {} storage at {}", context.scope.as_str(), base.display());
        }
        Commands::Index { paths } => {
            let roots = if paths.is_empty() {
                vec![project_root]
            } else {
                paths
            };
            let stats = context.pipeline.index_paths(&roots).await?;
            println!(
                "Indexed {} files ({} symbols, {} embedded, {} failed, {} tombstoned)",
                stats.files_indexed,
                stats.symbols,
                stats.embedded,
                stats.files_failed,
                stats.files_tombstoned
            );
        }
        Commands::Search {
            query,
            k,
            mode,
            threshold,
        } => {
            let mode = parse_mode(&mode)
                .ok_or_else(|| anyhow::anyhow!("unknown retrieval mode '{mode}'"))?;
            let mut request = SearchRequest::new(query, k, mode);
            request.threshold = threshold;
            let response = context.retriever.search(request).await?;

            if response.results.is_empty() {
                println!("no results");
            }
            for doc in &response.results {
                println!("{:>3}. {:.6}  {}", doc.rank + 1, doc.score, doc.doc_id);
            }
            tracing::debug!(?response.provenance, "query provenance");
        }
        Commands::Bench { suite, k } => {
            let suite = BenchSuite::load_from_path(&suite)?;
            let harness = BenchmarkHarness::new(&context.retriever, k);
            let report = harness.run(&suite).await?;
            println!("{}", render_leaderboard(&report));
        }
        Commands::Serve => {
            use rmcp::{ServiceExt, transport::stdio};
            tracing::info!("Starting MCP server on stdio");
            let server = RetrievalServer::new(
                context.knowledge.clone(),
                context.pipeline.clone(),
                context.resources.clone(),
            );
            let service = server.serve(stdio()).await?;
            service.waiting().await?;
        }
        Commands::Status => {
            let status = context.knowledge.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
