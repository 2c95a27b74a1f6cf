//! Embedding Backfill
//!
//! Fills the `"contentEmbedding"` columns of `messages` and `patientMemory`,
//! reports coverage, verifies the column width against the configured
//! backend and migrates the width when the backend changes.

use clap::{Parser, Subcommand, ValueEnum};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_embeddings::{
    BackfillOptions, BackfillReport, BackfillScope, EmbeddingGenerator, EmbeddingRepository,
    EmbeddingService, EmbeddingTable, PgEmbeddingRepository, resize_embeddings,
};
use eyre::Result;
use std::time::Duration;
use tracing::{info, warn};

mod config;
mod progress;

use config::Config;

/// Oldest pgvector with iterative index scans.
const MIN_PGVECTOR: (u32, u32) = (0, 8);

#[derive(Parser)]
#[command(name = "embedding-backfill")]
#[command(about = "Generate, inspect and migrate pgvector embeddings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed rows that have no vector yet
    Backfill {
        /// Table to backfill
        #[arg(short, long, value_enum, default_value_t = TableArg::All)]
        table: TableArg,

        /// Rows embedded per batch
        #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=500))]
        batch_size: u64,

        /// Only messages of this conversation
        #[arg(long)]
        conversation_id: Option<String>,

        /// Only rows owned by this user
        #[arg(long)]
        user_id: Option<String>,

        /// Pause between batches in milliseconds (default: BACKFILL_DELAY_MS)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Stop after this many batches per table
        #[arg(long)]
        max_batches: Option<u64>,
    },

    /// Print embedding coverage as JSON
    Stats,

    /// Verify the vector columns match the configured embedding width
    CheckSchema,

    /// Recreate the vector columns at a new width, clearing every stored vector
    Resize {
        /// New embedding width (384 for LOCAL, 1536 for OPENAI)
        #[arg(short, long)]
        dimension: usize,

        /// Confirm that all stored embeddings will be deleted
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TableArg {
    Messages,
    Memories,
    All,
}

impl TableArg {
    fn tables(self) -> Vec<EmbeddingTable> {
        match self {
            TableArg::Messages => vec![EmbeddingTable::Messages],
            TableArg::Memories => vec![EmbeddingTable::PatientMemory],
            TableArg::All => EmbeddingTable::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let cli = Cli::parse();

    info!("Connecting to database...");
    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("Database connection failed: {}", e))?;
    database::postgres::require_extension(&db, "vector", MIN_PGVECTOR)
        .await
        .map_err(|e| eyre::eyre!("pgvector check failed: {}", e))?;

    let repository = PgEmbeddingRepository::new(db.clone());

    let outcome = match cli.command {
        Commands::Stats => {
            let stats = repository.embedding_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Commands::Resize { dimension, yes } => resize(&repository, dimension, yes).await,

        Commands::CheckSchema => {
            let service = build_service(&config, repository)?;
            service.verify_schema().await?;
            println!(
                "Schema OK: vector({}) matches {} ({})",
                service.generator().dimension(),
                service.generator().model_name(),
                config.embedding.backend
            );
            Ok(())
        }

        Commands::Backfill {
            table,
            batch_size,
            conversation_id,
            user_id,
            delay_ms,
            max_batches,
        } => {
            let service = build_service(&config, repository)?;
            service.prepare_schema().await?;

            let options = BackfillOptions {
                batch_size,
                delay: delay_ms.map(Duration::from_millis).unwrap_or(config.delay),
                max_batches,
            };
            let scope = BackfillScope {
                conversation_id,
                user_id,
            };

            tokio::select! {
                result = backfill(&service, table.tables(), &scope, &options) => result,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted; completed batches are committed, rerun to continue");
                    println!("\nInterrupted. Progress has been saved; rerun the same command to continue.");
                    Ok(())
                }
            }
        }
    };

    db.close().await.ok();
    outcome
}

fn build_service(
    config: &Config,
    repository: PgEmbeddingRepository,
) -> Result<EmbeddingService<PgEmbeddingRepository>> {
    let generator = EmbeddingGenerator::from_config(&config.embedding)
        .map_err(|e| eyre::eyre!("Embedding backend unavailable: {}", e))?;
    info!(
        backend = %config.embedding.backend,
        model = generator.model_name(),
        dimension = generator.dimension(),
        "Embedding generator ready"
    );
    Ok(EmbeddingService::new(repository, generator))
}

async fn backfill(
    service: &EmbeddingService<PgEmbeddingRepository>,
    tables: Vec<EmbeddingTable>,
    scope: &BackfillScope,
    options: &BackfillOptions,
) -> Result<()> {
    println!("Coverage before:\n{}\n", progress::render_coverage(&service.stats().await?));

    let mut reports: Vec<BackfillReport> = Vec::with_capacity(tables.len());
    for table in tables {
        // Memories have no conversation; only the user filter applies
        let scope = match table {
            EmbeddingTable::Messages => scope.clone(),
            EmbeddingTable::PatientMemory => BackfillScope {
                conversation_id: None,
                user_id: scope.user_id.clone(),
            },
        };

        println!("Backfilling {}...", table);
        let report = service
            .run_backfill_with_progress(table, &scope, options, |p| {
                println!("  {}", progress::render_progress(p))
            })
            .await?;
        println!(
            "  {}: {} updated, {} failed in {} batches ({:.1}s)",
            table,
            report.updated,
            report.failed,
            report.batches,
            report.elapsed.as_secs_f64()
        );
        reports.push(report);
    }

    println!("\nCoverage after:\n{}", progress::render_coverage(&service.stats().await?));

    let failed: u64 = reports.iter().map(|r| r.failed).sum();
    if failed > 0 {
        warn!(failed, "Some rows could not be embedded; they stay pending for the next run");
    }
    Ok(())
}

async fn resize(repository: &PgEmbeddingRepository, dimension: usize, yes: bool) -> Result<()> {
    if !yes {
        return Err(eyre::eyre!(
            "resize drops every stored embedding in messages and patientMemory; rerun with --yes to confirm"
        ));
    }

    let before = repository.embedding_dimension(EmbeddingTable::Messages).await?;
    let lists = resize_embeddings(repository, dimension).await?;

    println!(
        "Resized embedding columns from {} to vector({}) with {} IVFFlat lists.",
        before.map_or_else(|| "missing".to_string(), |d| format!("vector({})", d)),
        dimension,
        lists
    );
    println!("All vectors were cleared; run `embedding-backfill backfill` to regenerate them.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_backfill_defaults() {
        let cli = Cli::try_parse_from(["embedding-backfill", "backfill"]).unwrap();
        match cli.command {
            Commands::Backfill {
                table,
                batch_size,
                delay_ms,
                max_batches,
                ..
            } => {
                assert_eq!(table, TableArg::All);
                assert_eq!(batch_size, 100);
                assert!(delay_ms.is_none());
                assert!(max_batches.is_none());
            }
            _ => panic!("expected backfill"),
        }
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(Cli::try_parse_from(["embedding-backfill", "backfill", "--batch-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["embedding-backfill", "backfill", "--batch-size", "501"]).is_err());
        assert!(Cli::try_parse_from(["embedding-backfill", "backfill", "-t", "memories", "-b", "500"]).is_ok());
    }

    #[test]
    fn test_resize_requires_dimension() {
        assert!(Cli::try_parse_from(["embedding-backfill", "resize"]).is_err());
        let cli = Cli::try_parse_from(["embedding-backfill", "resize", "--dimension", "1536", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Resize { dimension: 1536, yes: true }));
    }

    #[test]
    fn test_table_selection() {
        assert_eq!(TableArg::Memories.tables(), vec![EmbeddingTable::PatientMemory]);
        assert_eq!(TableArg::All.tables().len(), 2);
    }
}
