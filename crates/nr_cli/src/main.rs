use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nr_core::logging::init_logging;
use nr_core::{ArticleStorage, QueryRequest};
use nr_query::EngineConfig;
use nr_trending::TRENDING_DEFAULT_LIMIT;
use nr_web::{create_app, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

mod config;
mod ingest;
mod services;

use config::{GlobalArgs, ServeArgs};
use services::Services;

const SIMULATION_DELAY: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(author, version, about = "News query router and geospatial trending engine", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API with the trending worker
    Serve(ServeArgs),
    /// Answer a single query and print the JSON response
    Query {
        text: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long)]
        radius: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Compute trending tiles once and print the tile for a location
    Trending {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value_t = TRENDING_DEFAULT_LIMIT)]
        limit: usize,
        /// Synthetic events to record before computing
        #[arg(long, default_value_t = 0)]
        simulate: usize,
    },
    /// Load articles from JSON files into the configured store
    Ingest {
        paths: Vec<PathBuf>,
        /// Also load the built-in sample articles
        #[arg(long)]
        sample: bool,
    },
    /// Record synthetic user events and run one trending cycle
    Simulate {
        #[arg(long, default_value_t = 50)]
        count: usize,
    },
}

async fn serve(global: &GlobalArgs, args: ServeArgs) -> Result<()> {
    let services = Services::build(global, args.engine_config(), args.trending_interval).await?;
    let janitor = services.spawn_janitor();
    let worker = services.trending.clone().start();

    if args.simulate > 0 {
        let trending = services.trending.clone();
        let count = args.simulate;
        tokio::spawn(async move {
            tokio::time::sleep(SIMULATION_DELAY).await;
            if let Err(e) = trending.simulate_events(count).await {
                warn!(error = %e, "Failed to simulate user events");
            }
        });
    }

    let state = AppState::new(
        services.engine.clone(),
        services.trending.clone(),
        services.stores.articles.clone(),
    )
    .with_rate_limit(args.rate_limit());
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🚀 Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutting down server...");
    })
    .await?;

    worker.stop().await;
    janitor.abort();
    info!("Server stopped");
    Ok(())
}

/// Services for commands that run once and exit. The worker is never started.
async fn one_shot(global: &GlobalArgs) -> Result<Services> {
    Services::build(global, EngineConfig::default(), Duration::from_secs(60)).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.global.log_level);

    match cli.command {
        Commands::Serve(args) => serve(&cli.global, args).await?,
        Commands::Query {
            text,
            lat,
            lon,
            radius,
            limit,
        } => {
            let services = one_shot(&cli.global).await?;
            let request = QueryRequest {
                query: text,
                lat,
                lon,
                radius_km: radius,
                limit,
            };
            let response = services.engine.query(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Trending {
            lat,
            lon,
            limit,
            simulate,
        } => {
            let services = one_shot(&cli.global).await?;
            if simulate > 0 {
                services.trending.simulate_events(simulate).await?;
            }
            let report = services.trending.run_cycle().await?;
            info!(events = report.events, tiles = report.tiles, "Trending cycle finished");
            let articles = services.trending.enrich_trending(lat, lon, limit).await?;
            println!("{}", serde_json::to_string_pretty(&articles)?);
        }
        Commands::Ingest { paths, sample } => {
            let services = one_shot(&cli.global).await?;
            let articles = services.stores.articles.as_ref();
            let mut loaded = 0;
            for path in &paths {
                loaded += ingest::load_path(articles, path).await?;
            }
            if sample {
                loaded += ingest::load_articles(articles, &ingest::sample_articles(chrono::Utc::now()))
                    .await?;
            }
            let total = articles.count().await?;
            info!(loaded, total, "✨ Ingestion finished");
        }
        Commands::Simulate { count } => {
            let services = one_shot(&cli.global).await?;
            let created = services.trending.simulate_events(count).await?;
            let report = services.trending.run_cycle().await?;
            println!(
                "{}",
                serde_json::json!({
                    "events_created": created,
                    "events_scored": report.events,
                    "tiles": report.tiles,
                    "failed_tiles": report.failed_tiles,
                })
            );
        }
    }

    Ok(())
}
