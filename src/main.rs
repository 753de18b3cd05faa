use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trader_tony_intake::bot;
use trader_tony_intake::config::Config;
use trader_tony_intake::crypto::SecretCodec;
use trader_tony_intake::models::TradeOrder;
use trader_tony_intake::storage::UserRepository;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::load()?);
    info!("Configuration loaded: {:?}", config);

    // Any wallet read or write needs the key, so refuse to start without it
    let codec = Arc::new(SecretCodec::new(config.private_key_encryption_key.clone()));
    codec
        .ensure_configured()
        .context("Cannot start without PRIVATE_KEY_ENCRYPTION_KEY")?;

    let users = Arc::new(
        UserRepository::open(&config.database_path, codec)
            .context("Failed to open user database")?,
    );

    let (order_tx, mut order_rx) = mpsc::channel::<TradeOrder>(config.order_queue_capacity);
    // Execution lives outside this service; orders are logged as they are handed over.
    tokio::spawn(async move {
        while let Some(order) = order_rx.recv().await {
            info!(
                "Trade order from chat {} at {}: {} {} of {} for user {} (wallet {})",
                order.chat_id,
                order.requested_at,
                order.action,
                order.amount,
                order.mint,
                order.user_id,
                order.wallet_address
            );
        }
    });

    let state = Arc::new(bot::BotState::new(users, order_tx));
    let bot = Bot::new(&config.telegram_bot_token);

    info!("Starting trade intake bot...");
    bot::commands::start_bot(bot, state).await?;

    Ok(())
}
