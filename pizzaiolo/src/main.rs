use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pizzaiolo::api::{ApiServer, ApiServerConfig};
use pizzaiolo::pipeline::{
    build_pipeline, PipelineAnswer, CACHE_DB_FILE, CORPUS_FILE, REVIEW_INDEX_DIR,
};
use pizzaiolo::reviews::{build_index, load_corpus, ReviewIndex};
use pizzaiolo::EmbeddingGenerator;
use pizzaiolo_cache::{CacheConfig, CacheReport, CacheStore, MetricsTracker};

#[derive(Parser)]
#[command(name = "pizzaiolo")]
#[command(about = "Pizza review QA service with a semantic response cache", long_about = None)]
struct Cli {
    /// Data directory (cache database, review index, corpus)
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Base URL of the local Ollama server
    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// JWT secret key (can also use JWT_SECRET env var)
        #[arg(long)]
        jwt_secret: Option<String>,
    },

    /// Ask a single pizza question
    Ask {
        /// The question to answer
        question: String,

        /// Use the Together AI cloud model instead of local Ollama
        #[arg(long)]
        cloud: bool,
    },

    /// Ask questions interactively
    Chat {
        /// Use the Together AI cloud model instead of local Ollama
        #[arg(long)]
        cloud: bool,
    },

    /// Build the review index from the corpus file
    Index {
        /// Corpus file (defaults to pizza_reviews.json in the data directory)
        #[arg(short, long)]
        corpus: Option<PathBuf>,
    },

    /// Show cache performance metrics
    Stats {
        /// Reporting window in hours
        #[arg(long, default_value = "24")]
        window_hours: i64,
    },

    /// List cached entries, newest first
    Entries,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pizzaiolo=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            ref host,
            port,
            ref jwt_secret,
        } => {
            let secret = jwt_secret
                .clone()
                .or_else(|| std::env::var("JWT_SECRET").ok())
                .unwrap_or_else(|| {
                    println!("Warning: Using default JWT secret. Set JWT_SECRET env var or --jwt-secret for production.");
                    "default_secret_change_in_production".to_string()
                });

            let config = ApiServerConfig {
                host: host.clone(),
                port,
                jwt_secret: secret,
                data_dir: cli.data_dir.clone(),
                ollama_url: cli.ollama_url.clone(),
            };

            let server = ApiServer::new(config);
            println!("Starting API server on {}:{}", host, port);
            server.start().await?;
        }

        Commands::Ask { ref question, cloud } => {
            let pipeline = build_pipeline(&cli.data_dir, &cli.ollama_url).await?;
            let result = pipeline.answer(question, cloud).await?;
            print_answer(&result);
        }

        Commands::Chat { cloud } => {
            let pipeline = build_pipeline(&cli.data_dir, &cli.ollama_url).await?;

            loop {
                print!("\nPlease enter your pizza-related question (or 'q' to quit): ");
                io::stdout().flush()?;

                let mut line = String::new();
                if io::stdin().read_line(&mut line)? == 0 {
                    break;
                }

                let question = line.trim();
                if question.eq_ignore_ascii_case("q") {
                    println!("Goodbye! 🍕");
                    break;
                }
                if question.is_empty() {
                    continue;
                }

                match pipeline.answer(question, cloud).await {
                    Ok(result) => print_answer(&result),
                    Err(err) => println!("Error: {}", err),
                }
            }
        }

        Commands::Index { ref corpus } => {
            let corpus_path = corpus
                .clone()
                .unwrap_or_else(|| cli.data_dir.join(CORPUS_FILE));
            let index_path = cli.data_dir.join(REVIEW_INDEX_DIR);

            std::fs::create_dir_all(&cli.data_dir)?;
            let index = ReviewIndex::new(&index_path).await?;

            if index.is_populated().await? {
                println!(
                    "Review index already contains {} reviews.",
                    index.count().await?
                );
                println!("Delete {:?} to rebuild it.", index_path);
                return Ok(());
            }

            let reviews = load_corpus(&corpus_path)?;
            let embedder = EmbeddingGenerator::new()?;
            let count = build_index(&index, &embedder, &reviews).await?;
            println!("Indexed {} reviews from {:?}", count, corpus_path);
        }

        Commands::Stats { window_hours } => {
            let store = open_store(&cli.data_dir).await?;
            let metrics = MetricsTracker::new(store.pool().clone());
            let report = metrics.report(window_hours).await?;
            print_report(&report);
        }

        Commands::Entries => {
            let store = open_store(&cli.data_dir).await?;
            let entries = store.list_entries().await?;

            if entries.is_empty() {
                println!("Cache is empty.");
            } else {
                println!("Cached entries ({}):", entries.len());
                println!("{}", "=".repeat(70));
                for entry in entries {
                    let question_short = if entry.question.chars().count() > 50 {
                        format!("{}...", entry.question.chars().take(47).collect::<String>())
                    } else {
                        entry.question.clone()
                    };
                    println!(
                        "{}  {:>4} hits  {}",
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.hit_count,
                        question_short
                    );
                }
            }
        }
    }

    Ok(())
}

/// Open the cache store without loading the embedding model
async fn open_store(data_dir: &Path) -> Result<CacheStore> {
    std::fs::create_dir_all(data_dir)?;
    let config = CacheConfig::new(data_dir.join(CACHE_DB_FILE).to_string_lossy());
    Ok(CacheStore::connect(&config).await?)
}

fn print_answer(result: &PipelineAnswer) {
    println!("\nAnswer:\n--------");
    println!("{}", result.answer);
    if let Some(similarity) = result.similarity {
        println!("\n(served from cache, similarity {:.3})", similarity);
    }
    if !result.sources.is_empty() {
        println!("\nBased on {} reviews:", result.sources.len());
        for source in &result.sources {
            println!(
                "  - {} ({}, rating {})",
                source.restaurant, source.city, source.rating
            );
        }
    }
    println!("--------------------------------");
}

fn print_report(report: &CacheReport) {
    println!("Cache Performance (last {}h)", report.window_hours);
    println!("{}", "=".repeat(40));
    println!("Total queries:    {}", report.total_queries);
    println!("Cache hits:       {}", report.cache_hits);
    println!("Cache misses:     {}", report.cache_misses);
    println!("Hit rate:         {:.1}%", report.hit_rate());
    println!("Avg similarity:   {:.3}", report.avg_similarity);
    println!("Avg time saved:   {:.0} ms", report.avg_time_saved_ms);
    println!("Cache size:       {} bytes", report.cache_size_bytes);

    if !report.top_queries.is_empty() {
        println!("\nTop queries:");
        for top in &report.top_queries {
            println!("  {:>3}x  {}", top.count, top.query);
        }
    }
}
