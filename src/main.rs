use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use fullfeed::config::{Config, ExtractorKind};
use fullfeed::content::{ArticleResolver, Extractor, JinaExtractor, ReadabilityExtractor};
use fullfeed::feed::Fetcher;
use fullfeed::pipeline::{Pipeline, PipelineOptions, DEFAULT_CONCURRENCY};
use fullfeed::storage::{self, ArticleCache};
use fullfeed::tracking::Tracker;
use fullfeed::util::NetworkGuard;

#[derive(Parser, Debug)]
#[command(
    name = "fullfeed",
    version,
    about = "Feed-rewriting proxy that inlines full article text"
)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "fullfeed.toml")]
    config: PathBuf,

    /// Address to listen on (overrides `listen`)
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Article cache: `memory` or a redis:// URL (overrides `cache_url`)
    #[arg(long, value_name = "URL")]
    cache_url: Option<String>,

    /// Allow fetching loopback and private addresses
    #[arg(long)]
    allow_local: bool,
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The configured log level is unknown until the file is read, so loading
    // logs through a temporary subscriber.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || Config::load(&args.config))
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(cache_url) = args.cache_url {
        config.cache_url = Some(cache_url);
    }
    if args.allow_local {
        config.allow_local_fetch = true;
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.log_level))
        .init();

    let guard = if config.allow_local_fetch {
        tracing::warn!("Network guard disabled: loopback and private hosts are reachable");
        NetworkGuard::disabled()
    } else {
        NetworkGuard::new()
    };
    let fetcher = Fetcher::new(guard).context("Failed to build HTTP client")?;
    // Operator-configured endpoints (Jina, analytics) bypass the guard
    let service_client = reqwest::Client::builder()
        .user_agent(concat!("fullfeed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let cache = match config.cache_url.as_deref() {
        Some(cache_url) => {
            let backend = storage::connect(cache_url)
                .await
                .context("Failed to open article cache")?;
            ArticleCache::new(backend)
        }
        None => {
            tracing::info!("No cache_url configured, article cache disabled");
            ArticleCache::disabled()
        }
    };

    let extractor: Arc<dyn Extractor> = match config.extractor.kind {
        ExtractorKind::Readability => Arc::new(ReadabilityExtractor::new(fetcher.clone())),
        ExtractorKind::Jina => Arc::new(
            JinaExtractor::new(
                service_client.clone(),
                config.extractor.jina_base_url.as_deref(),
                config.extractor.api_key(),
            )
            .context("Invalid Jina extractor configuration")?,
        ),
    };
    tracing::info!(extractor = ?config.extractor.kind, "Article extractor ready");

    let tracker = Tracker::new(service_client, &config.tracking);
    if !tracker.is_enabled() {
        tracing::info!("Tracking beacons disabled");
    }

    let pipeline = Pipeline::new(
        fetcher,
        ArticleResolver::new(cache, extractor),
        tracker,
        PipelineOptions {
            propagate_title: config.propagate_title,
            concurrency: DEFAULT_CONCURRENCY,
        },
    );

    fullfeed::server::serve(config.listen, pipeline)
        .await
        .with_context(|| format!("HTTP server on {} failed", config.listen))
}
