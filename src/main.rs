//! Repolens CLI - semantic code and history search with pre-change advice.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use repolens::cli::{Commands, OutputFormat, SortOrder};
use repolens::{
    provider_from_name, resolve_repo_path, resolve_store_dir, AnalyzeUseCase, AssessUseCase,
    Config, DomainError, DuckdbStore, EmbeddingProvider, GitClient, GitQueryUseCase,
    GitSearchParams, IndexCodeUseCase, IndexHistoryUseCase, QueryCodeUseCase, StatsUseCase,
};

/// Repolens - semantic index over a repository and its history
#[derive(Parser)]
#[command(name = "repolens")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

struct Context {
    repo_root: PathBuf,
    store_dir: PathBuf,
    config: Config,
    store: DuckdbStore,
}

impl Context {
    fn open(repo: Option<&str>) -> Result<Self, DomainError> {
        let repo_root = resolve_repo_path(repo);
        if !repo_root.exists() {
            return Err(DomainError::RepoNotFound(repo_root.display().to_string()));
        }
        let repo_root = repo_root
            .canonicalize()
            .map_err(|e| DomainError::RepoNotFound(format!("{}: {}", repo_root.display(), e)))?;
        let config = Config::load(&repo_root);
        let store_dir = resolve_store_dir(&repo_root);
        std::fs::create_dir_all(&store_dir)?;
        let store = DuckdbStore::open(&store_dir.join("repolens.duckdb"))?;
        Ok(Self {
            repo_root,
            store_dir,
            config,
            store,
        })
    }

    fn provider(
        &self,
        provider_flag: Option<&str>,
        model_flag: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
        let provider = provider_flag.unwrap_or(&self.config.embedding_provider);
        let model = model_flag.unwrap_or(&self.config.embedding_model);
        provider_from_name(provider, model)
    }

    fn code_state_path(&self) -> PathBuf {
        self.store_dir.join(".repolens-state.json")
    }

    fn git_state_path(&self) -> PathBuf {
        self.store_dir.join(".git-search-state.json")
    }

    fn analyze_state_path(&self) -> PathBuf {
        self.store_dir.join(".analyze-state.json")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: failed to initialize logging");
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.downcast_ref::<DomainError>().and_then(|d| d.hint()) {
                eprintln!("Tip: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Index {
            full,
            recent,
            repo,
            provider,
            model,
        } => {
            let ctx = Context::open(repo.as_deref())?;
            let embedder = ctx.provider(provider.as_deref(), model.as_deref())?;
            let use_case = IndexCodeUseCase::new(
                Arc::new(ctx.store.code()),
                embedder,
                ctx.config.clone(),
                ctx.repo_root.clone(),
                ctx.code_state_path(),
            );
            let report = use_case.execute(full, recent).await?;
            println!(
                "Indexed {} files ({} chunks, {} skipped, {} stale chunks removed) in {} mode",
                report.files_indexed,
                report.chunks_indexed,
                report.files_skipped,
                report.chunks_deleted,
                report.mode.as_str()
            );
        }

        Commands::Query {
            text,
            repo,
            limit,
            filter,
            format,
        } => {
            let ctx = Context::open(repo.as_deref())?;
            let embedder = ctx.provider(None, None)?;
            let use_case =
                QueryCodeUseCase::new(Arc::new(ctx.store.code()), embedder, ctx.config.clone());
            let results = use_case.execute(&text, limit, filter.as_deref()).await?;

            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&results)
                            .map_err(|e| DomainError::internal(e.to_string()))?
                    );
                }
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("No results found.");
                    } else {
                        println!("Found {} results:\n", results.len());
                        for (i, result) in results.iter().enumerate() {
                            let chunk = result.chunk();
                            println!(
                                "{}. {} (score: {:.3})",
                                i + 1,
                                chunk.location(),
                                result.score()
                            );
                            println!("   {} [{}]", chunk.name(), chunk.chunk_type());
                            let preview: String = chunk
                                .content()
                                .lines()
                                .take(3)
                                .map(|l| format!("   | {}", l))
                                .collect::<Vec<_>>()
                                .join("\n");
                            println!("{}\n", preview);
                        }
                    }
                }
            }
        }

        Commands::Stats { repo, format } => {
            let ctx = Context::open(repo.as_deref())?;
            let use_case = StatsUseCase::new(
                Arc::new(ctx.store.code()),
                Arc::new(ctx.store.history()),
                Arc::new(ctx.store.signals()),
                Arc::new(ctx.store.profiles()),
            );
            let stats = use_case.code_stats(&ctx.code_state_path()).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&stats)
                        .map_err(|e| DomainError::internal(e.to_string()))?
                ),
                OutputFormat::Text => {
                    println!("Repolens Statistics");
                    println!("===================");
                    println!("Code chunks: {}", stats.chunk_count);
                    match stats.state {
                        Some(state) => {
                            println!("Last commit: {}", state.last_commit);
                            println!("Last indexed: {}", state.last_indexed_at);
                            println!("Dimension: {}", state.embedding_dimension);
                        }
                        None => println!("No index state (run `repolens index`)"),
                    }
                }
            }
        }

        Commands::Init { repo } => {
            let repo_root = resolve_repo_path(repo.as_deref());
            let path = repo_root.join(".repolensrc.json");
            if path.exists() {
                println!("{} already exists.", path.display());
            } else {
                let defaults = serde_json::to_string_pretty(&Config::default())
                    .map_err(|e| DomainError::internal(e.to_string()))?;
                std::fs::write(&path, defaults)?;
                println!("Wrote {}.", path.display());
            }
        }

        Commands::GitIndex {
            full,
            repo,
            max_commits,
            provider,
            model,
        } => {
            let ctx = Context::open(repo.as_deref())?;
            let embedder = ctx.provider(provider.as_deref(), model.as_deref())?;
            let use_case = IndexHistoryUseCase::new(
                Arc::new(ctx.store.history()),
                embedder,
                ctx.config.clone(),
                ctx.repo_root.clone(),
                ctx.git_state_path(),
            );
            let report = use_case.execute(full, max_commits).await?;
            println!(
                "Indexed {} commits ({} skipped) into {} chunks ({})",
                report.commits_indexed,
                report.commits_skipped,
                report.chunks_indexed,
                if report.full { "full" } else { "incremental" }
            );
        }

        Commands::GitSearch {
            query,
            after,
            before,
            author,
            file,
            commit_type,
            sort,
            unique_commits,
            limit,
            repo,
            format,
        } => {
            let ctx = Context::open(repo.as_deref())?;
            let embedder = ctx.provider(None, None)?;
            let git = GitClient::new(&ctx.repo_root)?;
            let use_case = GitQueryUseCase::new(
                Arc::new(ctx.store.history()),
                embedder,
                git,
                ctx.config.clone(),
            );
            let params = GitSearchParams {
                limit,
                after,
                before,
                author,
                file,
                commit_type,
                sort_by_date: sort == SortOrder::Date,
                unique_commits,
            };
            let results = use_case.execute(&query, &params).await?;

            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&results)
                        .map_err(|e| DomainError::internal(e.to_string()))?
                ),
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("No results found.");
                    } else {
                        println!("Found {} results:\n", results.len());
                        for (i, result) in results.iter().enumerate() {
                            let chunk = result.chunk();
                            println!(
                                "{}. [{}] {} {} (score: {:.3}, via {})",
                                i + 1,
                                chunk.chunk_type(),
                                chunk.short_sha(),
                                chunk.subject(),
                                result.score(),
                                result.retrieval_method()
                            );
                            if !chunk.file_path().is_empty() {
                                println!("   file: {}", chunk.file_path());
                            }
                            if !chunk.author().is_empty() {
                                println!("   {} on {}", chunk.author(), chunk.date());
                            }
                            println!();
                        }
                    }
                }
            }
        }

        Commands::GitStats { repo, format } => {
            let ctx = Context::open(repo.as_deref())?;
            let use_case = StatsUseCase::new(
                Arc::new(ctx.store.code()),
                Arc::new(ctx.store.history()),
                Arc::new(ctx.store.signals()),
                Arc::new(ctx.store.profiles()),
            );
            let stats = use_case.git_stats(&ctx.git_state_path()).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&stats)
                        .map_err(|e| DomainError::internal(e.to_string()))?
                ),
                OutputFormat::Text => {
                    println!("Repolens Git Statistics");
                    println!("=======================");
                    println!("History chunks: {}", stats.chunk_count);
                    println!("Signals:        {}", stats.signal_count);
                    println!("File profiles:  {}", stats.profile_count);
                    match stats.state {
                        Some(state) => {
                            println!("Last commit:    {}", state.last_commit);
                            println!("Last indexed:   {}", state.last_indexed_at);
                        }
                        None => println!("No git index state (run `repolens git-index`)"),
                    }
                }
            }
        }

        Commands::Explain { query, repo } => {
            let ctx = Context::open(repo.as_deref())?;
            let embedder = ctx.provider(None, None)?;
            let git = GitClient::new(&ctx.repo_root)?;
            let use_case = GitQueryUseCase::new(
                Arc::new(ctx.store.history()),
                embedder,
                git,
                ctx.config.clone(),
            );
            let plan = use_case.classify(&query);
            println!("Query: {}", query);
            println!("Strategy: {}", plan.strategy().as_str());
            if let Some(s) = &plan.search_string {
                println!("Search string: {}", s);
            }
            if let Some(f) = &plan.file {
                println!("File: {}", f);
            }
            if let Some(l) = plan.line {
                println!("Line: {}", l);
            }
            if let Some(a) = &plan.author {
                println!("Author: {}", a);
            }
            if let Some(c) = &plan.date_cutoff {
                println!("Date cutoff: {}", c);
            }
        }

        Commands::Analyze { full, repo } => {
            let ctx = Context::open(repo.as_deref())?;
            let embedder = ctx.provider(None, None)?;
            let use_case = AnalyzeUseCase::new(
                Arc::new(ctx.store.history()),
                Arc::new(ctx.store.signals()),
                Arc::new(ctx.store.profiles()),
                embedder,
                ctx.repo_root.clone(),
                ctx.analyze_state_path(),
            );
            let report = use_case.execute(full).await?;
            println!(
                "Detected {} signals across {} file profiles",
                report.signal_count, report.profile_count
            );
            for (signal_type, count) in &report.by_type {
                println!("  {:<16} {}", signal_type, count);
            }
        }

        Commands::Assess {
            files,
            change_type,
            query,
            repo,
            format,
        } => {
            if files.is_empty() {
                return Err(DomainError::invalid_input(
                    "assess needs at least one file (--files a.ts,b.ts)",
                )
                .into());
            }
            let ctx = Context::open(repo.as_deref())?;
            let embedder = ctx.provider(None, None)?;
            let use_case = AssessUseCase::new(
                Arc::new(ctx.store.profiles()),
                Arc::new(ctx.store.signals()),
                embedder,
            );
            let assessment = use_case
                .execute(&files, change_type.as_deref(), query.as_deref())
                .await?;

            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&assessment)
                        .map_err(|e| DomainError::internal(e.to_string()))?
                ),
                OutputFormat::Text => {
                    if assessment.warnings.is_empty() {
                        println!("Nothing notable about these files.");
                    }
                    for warning in &assessment.warnings {
                        println!(
                            "[{}] {}: {}",
                            warning.severity,
                            warning.category.as_str(),
                            warning.message
                        );
                    }
                    if !assessment.ownership.is_empty() {
                        println!("\nOwnership:");
                        for note in &assessment.ownership {
                            match &note.owner {
                                Some(owner) => println!(
                                    "  {} — {} ({:.0}%), {} contributors",
                                    note.path,
                                    owner,
                                    note.percentage.unwrap_or(0.0),
                                    note.contributor_count
                                ),
                                None => println!(
                                    "  {} — no clear owner, {} contributors",
                                    note.path, note.contributor_count
                                ),
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
