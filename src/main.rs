use clap::{Parser, Subcommand};
use scipaper_hub::Result;
use scipaper_hub::config::Settings;
use scipaper_hub::embedding::{EmbeddingCache, RemoteEmbedder};
use scipaper_hub::feed::FeedClient;
use scipaper_hub::harvest::{self, HarvestOptions};
use scipaper_hub::index::RemoteVectorIndex;
use scipaper_hub::indexer::SnapshotIndexer;
use scipaper_hub::normalize::{self, records, records_blob};
use scipaper_hub::storage::{BlobStore, LocalBlobStore};
use scipaper_hub::{drift, evaluate, service};

#[derive(Parser)]
#[command(name = "scipaper-hub")]
#[command(about = "Similar-paper recommendations over arXiv metadata")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest one day window of feed metadata into a raw snapshot
    Harvest {
        /// Comma-separated category filter, e.g. "cs.AI,cs.LG"
        #[arg(long)]
        categories: Option<String>,
        /// Days back from today for the start of the harvest window
        #[arg(long, default_value_t = 1)]
        start_offset_days: u64,
        /// Snapshot label override; defaults to the current UTC timestamp
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Normalize a raw snapshot into the canonical parquet table
    Normalize {
        /// Snapshot label produced by harvest
        snapshot: String,
        /// Output blob override
        #[arg(long)]
        output: Option<String>,
    },
    /// Embed a normalized snapshot and upsert it into the vector index
    Index {
        /// Snapshot label produced by normalize
        snapshot: String,
        /// Input blob override
        #[arg(long)]
        blob: Option<String>,
    },
    /// Compare the category distributions of two normalized snapshots
    Drift {
        /// Reference snapshot label
        reference: String,
        /// New snapshot label
        new: String,
        /// Absolute share difference above which a category is flagged
        #[arg(long, default_value_t = drift::DEFAULT_THRESHOLD)]
        threshold: f64,
    },
    /// Evaluate retrieval quality over a normalized snapshot
    Evaluate {
        /// Snapshot label produced by normalize
        snapshot: String,
        /// Input blob override
        #[arg(long)]
        blob: Option<String>,
        /// Neighbors retrieved per query
        #[arg(long, default_value_t = evaluate::DEFAULT_K)]
        k: usize,
        /// Fraction of records used for the training side of the split
        #[arg(long, default_value_t = evaluate::DEFAULT_TRAIN_FRACTION)]
        train_fraction: f64,
    },
    /// Run the online query service
    Serve {
        /// Address to bind the HTTP server to (host:port)
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let store = LocalBlobStore::new(&settings.data_bucket);

    match cli.command {
        Commands::Harvest {
            categories,
            start_offset_days,
            snapshot,
        } => {
            let mut options = HarvestOptions {
                start_offset_days,
                snapshot,
                ..HarvestOptions::default()
            };
            if let Some(list) = categories {
                options.categories = list
                    .split(',')
                    .map(str::trim)
                    .filter(|category| !category.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }
            let feed = FeedClient::new()?;
            let manifest = harvest::harvest(&feed, &store, &settings.data_bucket, &options)?;
            println!(
                "Harvested snapshot {}: {} entries across {} pages",
                manifest.snapshot, manifest.count, manifest.pages
            );
        }
        Commands::Normalize { snapshot, output } => {
            let written = normalize::normalize(&store, &snapshot, output.as_deref())?;
            println!("Wrote {written}");
        }
        Commands::Index { snapshot, blob } => {
            let embedder = EmbeddingCache::new(RemoteEmbedder::new(
                &settings.embedding_endpoint,
                &settings.embedding_model,
            )?);
            let index = RemoteVectorIndex::new(
                &settings.index_endpoint,
                &settings.vector_collection_id,
                &settings.deployed_index_id,
            )?;
            SnapshotIndexer::new(&embedder, &index).index_snapshot(
                &store,
                &snapshot,
                blob.as_deref(),
            )?;
            println!("Indexed snapshot {snapshot}");
        }
        Commands::Drift {
            reference,
            new,
            threshold,
        } => {
            let report = drift::check_snapshots(&store, &reference, &new, threshold)?;
            if report.flagged.is_empty() {
                println!("No drift above threshold {threshold}");
            } else {
                println!("Drifted categories: {}", report.flagged.join(", "));
            }
        }
        Commands::Evaluate {
            snapshot,
            blob,
            k,
            train_fraction,
        } => {
            let blob_name = blob.unwrap_or_else(|| records_blob(&snapshot));
            let rows = records::from_parquet_bytes(&store.get_bytes(&blob_name)?)?;
            let outcome = evaluate::evaluate(&rows, k, train_fraction)?;
            println!(
                "hit_rate@{k}={:.4} ndcg@{k}={:.4} (train={} test={})",
                outcome.overall.hit_rate, outcome.overall.ndcg, outcome.train_size,
                outcome.test_size
            );
            for (category, metrics) in &outcome.by_category {
                println!(
                    "  {category}: hit_rate={:.4} ndcg={:.4}",
                    metrics.hit_rate, metrics.ndcg
                );
            }
        }
        Commands::Serve { bind } => {
            let state = service::build_state(settings)?;
            service::serve(state, &bind).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["scipaper-hub", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Serve { .. });
        }
    }

    #[test]
    fn harvest_command_with_categories() {
        let cli = Cli::try_parse_from([
            "scipaper-hub",
            "harvest",
            "--categories",
            "cs.AI,cs.LG",
            "--start-offset-days",
            "3",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Harvest {
                categories,
                start_offset_days,
                ..
            } = parsed.command
            {
                assert_eq!(categories, Some("cs.AI,cs.LG".to_string()));
                assert_eq!(start_offset_days, 3);
            }
        }
    }

    #[test]
    fn normalize_command_requires_a_snapshot() {
        let cli = Cli::try_parse_from(["scipaper-hub", "normalize"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from(["scipaper-hub", "normalize", "20240101T000000Z"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Normalize { snapshot, output } = parsed.command {
                assert_eq!(snapshot, "20240101T000000Z");
                assert_eq!(output, None);
            }
        }
    }

    #[test]
    fn drift_command_takes_two_snapshots() {
        let cli = Cli::try_parse_from([
            "scipaper-hub",
            "drift",
            "20240101T000000Z",
            "20240102T000000Z",
            "--threshold",
            "0.1",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Drift {
                reference,
                new,
                threshold,
            } = parsed.command
            {
                assert_eq!(reference, "20240101T000000Z");
                assert_eq!(new, "20240102T000000Z");
                assert!((threshold - 0.1).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn evaluate_command_defaults() {
        let cli = Cli::try_parse_from(["scipaper-hub", "evaluate", "20240101T000000Z"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Evaluate {
                k, train_fraction, ..
            } = parsed.command
            {
                assert_eq!(k, evaluate::DEFAULT_K);
                assert!((train_fraction - evaluate::DEFAULT_TRAIN_FRACTION).abs() < 1e-9);
            }
        }
    }
}
