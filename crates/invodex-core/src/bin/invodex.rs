//! Invodex command-line interface.
//!
//! Ingests invoice documents and answers similarity queries against the
//! local store. Providers are assembled from the layered configuration
//! (config file + INVODEX_* env vars).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use invodex_core::{Invodex, MaintenanceConfig, MaintenanceJob};
use invodex_embeddings::{
    release_process_model, ApiProvider, ApiProviderConfig, EmbeddingProvider, LocalProvider,
    ModelCache, ProviderChain,
};
use invodex_extract::{ApiExtractor, ApiExtractorConfig, FieldExtractor};
use invodex_types::Settings;

#[derive(Parser)]
#[command(name = "invodex", about = "Invoice ingestion and semantic search")]
struct Cli {
    /// Path to a config file (overrides ~/.config/invodex/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a document file
    Ingest {
        /// Path to the document
        file: PathBuf,
    },
    /// Natural-language similarity search
    Search {
        /// Query text
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Records similar to an existing record
    Similar {
        /// Record id
        id: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List known vendors with aggregates
    Vendors,
    /// Retry pending embeddings and rebuild indexes once
    Maintain,
}

/// Build the embedding provider named in the settings.
fn build_provider(settings: &Settings, name: &str) -> Result<Arc<dyn EmbeddingProvider>> {
    match name {
        "local" => {
            let cache = ModelCache {
                repo_id: settings.embedding.model.clone(),
                ..ModelCache::default()
            };
            Ok(Arc::new(LocalProvider::new(&cache)?))
        }
        "api" => {
            let api_key = settings
                .embedding
                .api_key
                .clone()
                .context("embedding.api_key required for the api provider")?;
            let mut config = ApiProviderConfig::openai(
                api_key,
                settings.embedding.api_model.clone(),
                settings.embedding.dimension,
            );
            config.base_url = settings.embedding.api_base_url.clone();
            config.timeout = Duration::from_secs(settings.embedding.timeout_secs);
            config.max_retries = settings.embedding.max_retries;
            Ok(Arc::new(ApiProvider::new(config)?))
        }
        other => bail!("unknown embedding provider {:?} (expected local or api)", other),
    }
}

/// Assemble the service from settings.
fn build_service(settings: Settings) -> Result<Invodex> {
    let mut chain = ProviderChain::new(build_provider(&settings, &settings.embedding.provider)?);
    if let Some(fallback) = &settings.embedding.fallback_provider {
        chain = chain.with_fallback(build_provider(&settings, fallback)?);
    }

    let extractor: Option<Arc<dyn FieldExtractor>> = match &settings.extraction.api_key {
        Some(api_key) => {
            let mut config = ApiExtractorConfig::new(
                settings.extraction.api_base_url.clone(),
                settings.extraction.model.clone(),
                api_key.clone(),
            );
            config.timeout = Duration::from_secs(settings.extraction.timeout_secs);
            config.max_retries = settings.extraction.max_retries;
            Some(Arc::new(ApiExtractor::new(config)?))
        }
        None => {
            info!("No extraction API key configured; running template-only");
            None
        }
    };

    Ok(Invodex::new(settings, chain, extractor)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let service = Arc::new(build_service(settings)?);

    let result = run(&cli.command, service).await;
    release_process_model();
    result
}

async fn run(command: &Command, service: Arc<Invodex>) -> Result<()> {
    match command {
        Command::Ingest { file } => {
            let bytes = std::fs::read(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let receipt = service.submit(&bytes).await?;
            println!(
                "{} method={} confidence={:.2} vendor={} cache_hit={} embedded={}",
                receipt.record_id,
                receipt.method.as_str(),
                receipt.confidence,
                receipt.vendor_id,
                receipt.cache_hit,
                receipt.embedded
            );
        }
        Command::Search { query, limit } => {
            let hits = service.semantic_search(query, *limit).await?;
            print_hits(&service, &hits)?;
        }
        Command::Similar { id, limit } => {
            let hits = service.find_similar(id, *limit).await?;
            print_hits(&service, &hits)?;
        }
        Command::Vendors => {
            for vendor in service.vendors()? {
                println!(
                    "{:<40} records={:<5} total=${:<12.2} first={} last={}",
                    vendor.canonical_name,
                    vendor.record_count,
                    vendor.total_spent,
                    vendor.first_seen,
                    vendor.last_seen
                );
            }
        }
        Command::Maintain => {
            let config = MaintenanceConfig::from_settings(&service.settings().index);
            let job = MaintenanceJob::new(service.clone(), config);
            let stats = job.run_once().await?;
            println!("embedded={} rebuilt={:?}", stats.embedded, stats.rebuilt);
        }
    }
    Ok(())
}

fn print_hits(service: &Invodex, hits: &[invodex_vector::SearchHit]) -> Result<()> {
    for hit in hits {
        match service.record(&hit.record_id)? {
            Some(record) => println!(
                "{:.4}  {}  {}  {}  ${:.2}",
                hit.distance, hit.record_id, record.vendor_id, record.category, record.total_amount
            ),
            None => println!("{:.4}  {}", hit.distance, hit.record_id),
        }
    }
    Ok(())
}
