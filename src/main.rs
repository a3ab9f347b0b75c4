//! # LeaseKB CLI
//!
//! Lease and contract knowledge-base lookup from the terminal.
//!
//! Usage:
//!   leasekb classify "what is the rent on floor 3"
//!   leasekb search "monthly rent" --corpus property -k 5
//!   leasekb ask "who is the broker for 1 Main St" [--no-llm]
//!   leasekb build [--corpus property] [--force]
//!   leasekb stats
//!   leasekb dedup --corpus qa --threshold 0.98 [--apply]
//!   leasekb init [--force]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leasekb_core::KbConfig;
use leasekb_knowledge::{Answerer, Classifier, CorpusKind, KnowledgeRegistry, Router};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "leasekb",
    version,
    about = "🏢 LeaseKB: retrieval over property listings, contract clauses, and internal Q&A"
)]
struct Cli {
    /// Config file (default: ~/.leasekb/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which corpus a query routes to
    Classify {
        query: String,
    },

    /// Retrieve the closest records for a query
    Search {
        query: String,

        /// Search this corpus instead of classifying
        #[arg(long)]
        corpus: Option<String>,

        /// Number of results (default: knowledge.top_k)
        #[arg(short)]
        k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the knowledge base
    Ask {
        question: String,

        /// Reply with the top hit instead of calling the completion model
        #[arg(long)]
        no_llm: bool,
    },

    /// Build corpus stores (loads existing blobs unless --force)
    Build {
        /// Only this corpus
        #[arg(long)]
        corpus: Option<String>,

        /// Re-embed from source even if a store exists
        #[arg(long)]
        force: bool,
    },

    /// Show corpus status
    Stats,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Find near-duplicate records in a corpus
    Dedup {
        #[arg(long)]
        corpus: String,

        /// Cosine similarity at or above which records are duplicates
        #[arg(long, default_value_t = 0.98)]
        threshold: f32,

        /// Remove duplicates (keeps the first of each cluster) and save
        #[arg(long)]
        apply: bool,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&str>) -> Result<KbConfig> {
    let mut config = match path {
        Some(p) => KbConfig::load_from(&PathBuf::from(expand_path(p)))?,
        None => KbConfig::load()?,
    };
    let knowledge = &mut config.knowledge;
    knowledge.data_dir = expand_path(&knowledge.data_dir);
    knowledge.store_dir = expand_path(&knowledge.store_dir);
    for corpus in knowledge.corpora.values_mut() {
        corpus.source = expand_path(&corpus.source);
    }
    Ok(config)
}

fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let target = match path {
        Some(p) => PathBuf::from(expand_path(p)),
        None => KbConfig::default_path(),
    };
    if target.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", target.display());
    }
    let config = KbConfig::default();
    match path {
        Some(_) => config.save_to(&target)?,
        None => config.save()?,
    }
    println!("📝 Wrote default config to {}", target.display());
    Ok(())
}

fn parse_corpus(name: &str) -> Result<CorpusKind> {
    CorpusKind::from_name(name).with_context(|| {
        format!("unknown corpus '{name}' (expected qa, property, or master_clauses)")
    })
}

fn build_router(config: &KbConfig) -> Result<Router> {
    let embedder = leasekb_providers::create_embedder(&config.embedding)?;
    let registry = KnowledgeRegistry::from_config(&config.knowledge, Arc::from(embedder))?;
    let classifier = Classifier::from_config(&config.knowledge)?;
    Ok(Router::new(classifier, Arc::new(registry)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "leasekb=debug,leasekb_knowledge=debug,leasekb_vector=debug,leasekb_providers=debug"
    } else {
        "leasekb=info,leasekb_knowledge=info,leasekb_vector=info,leasekb_providers=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    if let Commands::Init { force } = cli.command {
        return init_config(cli.config.as_deref(), force);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { query } => {
            let classifier = Classifier::from_config(&config.knowledge)?;
            for (kind, hits) in classifier.scores(&query) {
                println!("  {kind:<16} {hits} keyword hits");
            }
            println!("→ {}", classifier.classify(&query));
        }

        Commands::Search {
            query,
            corpus,
            k,
            json,
        } => {
            let router = build_router(&config)?;
            let k = k.unwrap_or(config.knowledge.top_k);
            let routed = match corpus {
                Some(name) => router.search_in(parse_corpus(&name)?, &query, k).await?,
                None => router.search(&query, k).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&routed)?);
            } else {
                println!("🔎 {} results from {}", routed.results.len(), routed.corpus);
                for (rank, hit) in routed.results.iter().enumerate() {
                    println!("{:>2}. [{:.4}] {}", rank + 1, hit.score, hit.text);
                }
            }
        }

        Commands::Ask { question, no_llm } => {
            let router = Arc::new(build_router(&config)?);
            let mut answerer = Answerer::new(
                router,
                config.knowledge.top_k,
                config.knowledge.context_char_budget,
            );
            if config.completion.enabled && !no_llm {
                let completer = leasekb_providers::create_completer(&config.completion)?;
                answerer = answerer.with_completer(Arc::from(completer));
            }
            let answer = answerer.answer(&question).await;
            if let Some(corpus) = answer.corpus {
                tracing::info!("Answered from {corpus} ({} sources)", answer.sources.len());
            }
            println!("{}", answer.text);
        }

        Commands::Build { corpus, force } => {
            let router = build_router(&config)?;
            let registry = router.registry();
            let outcomes = match (corpus, force) {
                (Some(name), true) => {
                    let kind = parse_corpus(&name)?;
                    vec![(kind, registry.rebuild(kind).await)]
                }
                (None, true) => registry.rebuild_all().await,
                (Some(name), false) => {
                    let kind = parse_corpus(&name)?;
                    vec![(kind, registry.stats(kind).await.map(|s| s.count))]
                }
                (None, false) => {
                    let mut outcomes = Vec::new();
                    for kind in registry.corpora() {
                        outcomes.push((kind, registry.stats(kind).await.map(|s| s.count)));
                    }
                    outcomes
                }
            };
            let mut failed = 0;
            for (kind, outcome) in outcomes {
                match outcome {
                    Ok(count) => println!("✅ {kind}: {count} records"),
                    Err(e) => {
                        failed += 1;
                        println!("❌ {kind}: {e}");
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} corpus build(s) failed");
            }
        }

        // Handled before the config is loaded
        Commands::Init { .. } => {}

        Commands::Stats => {
            let router = build_router(&config)?;
            for status in router.registry().status() {
                let built = status
                    .blob_modified
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "not built".into());
                println!("📚 {}", status.corpus);
                println!("   source: {}", status.source);
                println!("   store:  {} ({built})", status.blob_path.display());
                if status.blob_exists {
                    match router.registry().stats(status.corpus).await {
                        Ok(stats) => println!(
                            "   records: {}  dimension: {}  metadata: {:.0}%",
                            stats.count,
                            stats.dimension,
                            stats.metadata_coverage * 100.0
                        ),
                        Err(e) => println!("   ⚠️ {e}"),
                    }
                }
            }
        }

        Commands::Dedup {
            corpus,
            threshold,
            apply,
        } => {
            let kind = parse_corpus(&corpus)?;
            let router = build_router(&config)?;
            let registry = router.registry();
            let clusters = registry.find_duplicates(kind, threshold).await?;
            for cluster in &clusters {
                let texts = registry
                    .with_store(kind, |store| {
                        cluster
                            .iter()
                            .map(|&i| format!("    #{i}: {}", store.text(i).unwrap_or_default()))
                            .collect::<Vec<_>>()
                    })
                    .await?;
                println!("🔁 cluster of {}", cluster.len());
                for line in texts {
                    println!("{line}");
                }
            }
            if clusters.is_empty() {
                println!("No duplicates at threshold {threshold}");
            } else if apply {
                let removed = registry.remove_duplicates(kind, threshold).await?;
                println!("🧹 Removed {removed} records from {kind}");
            } else {
                println!("Run with --apply to remove all but the first of each cluster");
            }
        }
    }

    Ok(())
}
