use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tracing_subscriber::EnvFilter;

use trial_harvest::config::{load_config, Config};
use trial_harvest::db::open_pool;
use trial_harvest::embedding::create_backend;
use trial_harvest::ingest::{Ingestor, RunSummary};
use trial_harvest::migrate::run_migrations;
use trial_harvest::search::{render_results, search};
use trial_harvest::store::{SqliteVectorStore, VectorStore};

#[derive(Parser)]
#[command(
    name = "trials",
    version,
    about = "Ingest clinical trial report pages into a similarity-searchable chunk store"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, global = true, default_value = "trials.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config and create the database schema.
    Init {
        /// Database file the starter config will point at.
        #[arg(long, default_value = "trials.db")]
        db: PathBuf,
    },
    /// Ingest trial report pages by trial identifier.
    Ingest {
        /// Trial identifiers (e.g. NCT04601051). May be combined with --from-file.
        ids: Vec<String>,
        /// Read additional identifiers from a file, one per line.
        #[arg(long)]
        from_file: Option<PathBuf>,
        /// Stop after this many identifiers.
        #[arg(long)]
        limit: Option<usize>,
        /// Run the pipeline but skip the store write.
        #[arg(long)]
        dry_run: bool,
    },
    /// Ingest arbitrary page URLs.
    IngestUrl {
        urls: Vec<String>,
        /// Run the pipeline but skip the store write.
        #[arg(long)]
        dry_run: bool,
    },
    /// Query the store for the most similar chunks.
    Search {
        query: String,
        /// Maximum number of results.
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        /// Minimum cosine similarity, in [-1, 1].
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Show chunk and source counts.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { db } => init(&cli.config, &db).await,
        Command::Ingest {
            ids,
            from_file,
            limit,
            dry_run,
        } => {
            let cfg = load_config(&cli.config)?;
            let ids = collect_ids(ids, from_file.as_deref())?;
            if ids.is_empty() {
                bail!("no trial identifiers given; pass them as arguments or via --from-file");
            }
            let ingestor = build_pipeline(&cfg).await?;
            watch_for_ctrl_c(&ingestor);
            let summary = ingestor.ingest_trial_ids(&ids, limit, dry_run).await;
            report(&summary)
        }
        Command::IngestUrl { urls, dry_run } => {
            let cfg = load_config(&cli.config)?;
            if urls.iter().all(|u| u.trim().is_empty()) {
                bail!("no URLs given");
            }
            let ingestor = build_pipeline(&cfg).await?;
            watch_for_ctrl_c(&ingestor);
            let summary = ingestor.ingest_urls(&urls, dry_run).await;
            report(&summary)
        }
        Command::Search {
            query,
            k,
            threshold,
        } => {
            let cfg = load_config(&cli.config)?;
            let store = build_store(&cfg).await?;
            let results = search(store.as_ref(), &query, k, threshold).await?;
            print!("{}", render_results(&query, &results));
            Ok(())
        }
        Command::Status => {
            let cfg = load_config(&cli.config)?;
            let pool = open_db(&cfg).await?;
            status(&pool).await
        }
    }
}

async fn init(config_path: &Path, db_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("config file {} already exists", config_path.display());
    }

    let starter = format!(
        r#"[db]
path = "{db}"

[fetch]
# base_url = "https://scge.mcw.edu/platform/data/report/clinicalTrials"
# timeout_secs = 30

[normalize]
# min_chars = 50

[chunking]
# chunk_size_tokens = 800
# min_chunk_chars = 200
# min_embed_chars = 50
# max_chunks = 10000
# keep_separators = true

[embedding]
# provider = "openai"
# model = "text-embedding-3-small"
# dims = 1536
# batch_size = 64
# max_retries = 5
# timeout_secs = 30
"#,
        db = db_path.display()
    );
    std::fs::write(config_path, starter)
        .with_context(|| format!("writing {}", config_path.display()))?;

    let pool = open_pool(db_path).await?;
    run_migrations(&pool).await?;

    println!("Wrote {} and created {}.", config_path.display(), db_path.display());
    println!("Set OPENAI_API_KEY before running ingest or search.");
    Ok(())
}

async fn open_db(cfg: &Config) -> Result<SqlitePool> {
    let pool = open_pool(&cfg.db.path).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn build_store(cfg: &Config) -> Result<Arc<dyn VectorStore>> {
    let pool = open_db(cfg).await?;
    let backend = create_backend(&cfg.embedding)?;
    Ok(Arc::new(SqliteVectorStore::new(
        pool,
        Arc::from(backend),
        cfg.embedding.batch_size,
    )))
}

async fn build_pipeline(cfg: &Config) -> Result<Ingestor> {
    let store = build_store(cfg).await?;
    Ok(Ingestor::new(cfg.clone(), store)?)
}

/// First ctrl-c stops the run between sources; the in-flight source is
/// allowed to finish so its upsert is never interrupted.
fn watch_for_ctrl_c(ingestor: &Ingestor) {
    let cancel = ingestor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received; finishing the current source then stopping.");
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });
}

fn collect_ids(mut ids: Vec<String>, from_file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = from_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading identifiers from {}", path.display()))?;
        ids.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }
    Ok(ids)
}

fn report(summary: &RunSummary) -> Result<()> {
    println!(
        "Attempted {} source(s) in {:.1}s: {} processed, {} overwritten, {} failed.",
        summary.attempted,
        summary.elapsed.as_secs_f64(),
        summary.processed.len(),
        summary.overwritten.len(),
        summary.failed.len(),
    );

    for key in &summary.processed {
        println!("  processed   {}", key);
    }
    for key in &summary.overwritten {
        println!("  overwritten {}", key);
    }
    for (source, reason) in &summary.failed {
        println!("  failed      {}: {}", source, reason);
    }

    if summary.attempted > 0 && summary.succeeded() == 0 {
        bail!("all {} attempted source(s) failed", summary.attempted);
    }
    Ok(())
}

async fn status(pool: &SqlitePool) -> Result<()> {
    // Read-only counters; never needs the embedding backend.
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    let sources: Vec<(String, String)> = sqlx::query_as(
        "SELECT c.source_key, COALESCE(s.title, '')
         FROM (SELECT DISTINCT source_key FROM chunks) c
         LEFT JOIN sources s ON s.source_key = c.source_key
         ORDER BY c.source_key",
    )
    .fetch_all(pool)
    .await?;

    println!("{} chunk(s) across {} source(s).", chunks, sources.len());
    for (key, title) in sources {
        if title.is_empty() {
            println!("  {}", key);
        } else {
            println!("  {}  ({})", key, title);
        }
    }
    Ok(())
}
