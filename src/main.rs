use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{info, warn};

use tg_groceries::ai::{AiParser, OpenAiClient};
use tg_groceries::cache::ProductCache;
use tg_groceries::{config, db, handlers};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/groceries.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let cache_path = format!("{}/product_cache.json", cfg.app.data_dir);
    let cache = Arc::new(ProductCache::load(&cache_path).await?);
    info!(known_products = cache.len().await, "loaded product cache");

    let ai: Arc<dyn AiParser> = Arc::new(OpenAiClient::from_config(&cfg)?);
    let cfg = Arc::new(cfg);

    // Sweep expired callback sessions in the background.
    let purge_pool = pool.clone();
    let purge_sleep = Duration::from_secs(cfg.app.purge_interval_secs);
    tokio::spawn(async move {
        loop {
            match db::purge_expired_sessions(&purge_pool).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged expired sessions"),
                Err(err) => warn!(?err, "session purge failed"),
            }
            tokio::time::sleep(purge_sleep).await;
        }
    });

    let bot = Bot::new(cfg.telegram.bot_token.clone());

    info!("starting telegram bot");
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![pool, cache, ai, cfg])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
