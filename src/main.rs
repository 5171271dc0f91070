//! Gazette - projection engine for Nouns protocol events

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gazette::{
    artwork::{DescriptorRegistry, HttpRenderer},
    config::Args,
    db::{MemoryStore, MongoStore, Store},
    feed,
    identity::{IdentityConfig, IdentityResolver},
    ingest::{Pipeline, PipelineConfig, Reconciler},
    rewards::{self, RevenuePool, RewardParams},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gazette={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Gazette - Nouns projection engine");
    info!("======================================");
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Workers: {}", args.worker_count);
    info!(
        "Identity service: {}",
        args.identity_url.as_deref().unwrap_or("(disabled)")
    );
    info!(
        "Artwork renderer: {}",
        args.renderer_url.as_deref().unwrap_or("(disabled)")
    );
    let descriptor_sources = args
        .descriptor_source_list()
        .expect("validated descriptor sources");
    for (id, start_block) in &descriptor_sources {
        info!("  descriptor source {} from block {}", id, start_block);
    }
    info!("======================================");

    // Connect to MongoDB (falls back to the in-memory store in dev mode)
    let store: Arc<dyn Store> = match MongoStore::connect(&args.mongodb_uri, &args.mongodb_db).await
    {
        Ok(store) => {
            info!("MongoDB connected successfully");
            Arc::new(store)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Arc::new(MemoryStore::new())
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let identity = Arc::new(IdentityResolver::with_config(IdentityConfig {
        base_url: args.identity_url.clone(),
        cache_ttl: match args.identity_cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        request_timeout: Duration::from_millis(args.identity_timeout_ms),
        max_cache_entries: args.identity_max_cache_entries,
    }));

    let mut reconciler = Reconciler::new(
        store.clone(),
        identity.clone(),
        DescriptorRegistry::from_pairs(descriptor_sources),
    );
    if let Some(renderer_url) = &args.renderer_url {
        reconciler = reconciler.with_renderer(Arc::new(HttpRenderer::new(
            renderer_url.clone(),
            Duration::from_millis(args.renderer_timeout_ms),
        )));
    }

    // Drain the event feed from stdin through the pipeline
    let pipeline = Pipeline::new(
        Arc::new(reconciler),
        PipelineConfig {
            worker_count: args.worker_count,
            ..Default::default()
        },
    );

    let (tx, rx) = mpsc::channel(1024);
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    let pump = tokio::spawn(async move { feed::pump(reader, tx).await });

    let stats = pipeline.run(rx).await;
    match pump.await? {
        Ok(decoded) => info!(
            decoded,
            processed = stats.processed,
            failed = stats.failed,
            "ingestion complete"
        ),
        Err(e) => error!("feed terminated with an error: {}", e),
    }

    let identity_stats = identity.cache_stats().await;
    info!(
        entries = identity_stats.total_entries,
        live = identity_stats.live_entries,
        "identity cache"
    );

    // Evaluate the reward cycle over the freshly materialized state
    let params = RewardParams {
        minimum_reward_period_secs: args.minimum_reward_period_secs,
        proposals_enough_for_reward: args.proposals_enough_for_reward,
        eligibility_quorum_bps: args.eligibility_quorum_bps,
    };
    let pool = RevenuePool {
        revenue_wei: args
            .reward_revenue_wei
            .parse()
            .expect("validated revenue amount"),
        proposal_reward_bps: args.proposal_reward_bps,
        voting_reward_bps: args.voting_reward_bps,
    };
    match rewards::evaluate(store.as_ref(), &params, &pool).await {
        Ok(report) => {
            info!(
                cutoff = report.cutoff_id,
                eligible = report.eligible.len(),
                pending = report.pending.len(),
                ineligible = report.ineligible.len(),
                permitted = report.distribution_permitted,
                "reward cycle"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Err(e) => error!("reward cycle evaluation failed: {}", e),
    }

    Ok(())
}
