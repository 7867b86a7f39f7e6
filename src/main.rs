use openbookbot::config::BotConfig;
use openbookbot::execution::TradingCycle;
use openbookbot::feed::{candle_handler, tick_handler, CandleBuffer, FeedClient, PriceState};
use openbookbot::feed::{StreamSupervisor, WsFeedFactory};
use openbookbot::indicators::IndicatorEngine;
use openbookbot::models::{Trader, WalletBalances};
use openbookbot::venue::{ExecutionVenue, PaperVenue, PaperVenueConfig};
use openbookbot::Result;
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};

// Dry-run bankroll each trader starts with on the paper venue
const PAPER_NATIVE_GAS: f64 = 10.0;
const PAPER_BASE: f64 = 50.0;
const PAPER_QUOTE: f64 = 5000.0;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let config = BotConfig::from_env()?;
    tracing::info!(
        symbol = %config.symbol,
        interval = %config.interval,
        traders = config.traders.len(),
        trade_volume = config.trade_volume,
        range_bound_mode = config.range_bound_mode,
        "openbookbot starting"
    );

    let paper = Arc::new(PaperVenue::new(PaperVenueConfig::default()));
    for trader in &config.traders {
        paper.set_balances(
            trader,
            WalletBalances {
                native_gas: PAPER_NATIVE_GAS,
                base_wallet: PAPER_BASE,
                quote_wallet: PAPER_QUOTE,
                base_locked: 0.0,
                quote_locked: 0.0,
            },
        );
    }
    let venue: Arc<dyn ExecutionVenue> = paper.clone();

    let mut trader_tasks = Vec::new();
    for trader in config.traders.clone() {
        let config = config.clone();
        let venue = venue.clone();
        let paper = paper.clone();
        let label = trader.label.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = run_trader(trader, config, venue, paper).await {
                tracing::error!(trader = %label, error = %e, "trader task ended");
            }
        });
        trader_tasks.push(task);
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
        _ = futures_util::future::join_all(&mut trader_tasks) => {
            tracing::error!("all trader tasks exited");
        }
    }

    for task in trader_tasks {
        task.abort();
    }
    tracing::info!("openbookbot stopped");
    Ok(())
}

/// One trader's full stack: seeded candle buffer, two supervised push
/// streams, a mid-price sync loop, and the trading cycle itself. Returns
/// only when the cycle hits a fatal configuration fault.
async fn run_trader(
    trader: Trader,
    config: BotConfig,
    venue: Arc<dyn ExecutionVenue>,
    paper: Arc<PaperVenue>,
) -> Result<()> {
    let buffer = CandleBuffer::new(config.buffer_capacity);
    let price = PriceState::new();

    // Seed history before any stream delivery so indicators have a warm window
    let feed = FeedClient::new(config.rest_url.clone());
    let history = feed
        .fetch_history(&config.symbol, &config.interval, config.history_limit as usize)
        .await?;
    buffer.seed(history);
    tracing::info!(
        trader = %trader.label,
        candles = buffer.len(),
        "candle history seeded"
    );

    let candle_stream = StreamSupervisor::spawn(
        &format!("{}-candles", trader.label),
        WsFeedFactory::klines(config.ws_url.clone(), &config.symbol, &config.interval),
        candle_handler(buffer.clone()),
    );
    let tick_stream = StreamSupervisor::spawn(
        &format!("{}-ticks", trader.label),
        WsFeedFactory::ticker(config.ws_url.clone(), &config.symbol),
        tick_handler(price.clone()),
    );

    let mid_sync = tokio::spawn(mid_sync_loop(price.clone(), paper));
    let resync = tokio::spawn(gap_resync_loop(
        feed,
        buffer.clone(),
        config.symbol.clone(),
        config.interval.clone(),
        config.history_limit as usize,
    ));

    let engine = IndicatorEngine::new(buffer, price, config.indicator_config());
    let cycle = TradingCycle::new(venue, engine, trader, config.cycle_config());
    let result = cycle.run().await;

    candle_stream.close();
    tick_stream.close();
    mid_sync.abort();
    resync.abort();
    result
}

/// Mirror the live ticker price into the paper venue's order book mid.
/// A real venue adapter reads its mid from the book instead.
async fn mid_sync_loop(price: PriceState, paper: Arc<PaperVenue>) {
    let mut tick = interval(Duration::from_secs(1));
    loop {
        tick.tick().await;
        if let Some(last) = price.get() {
            paper.set_mid_price(last);
        }
    }
}

/// Backfill missed bars after stream outages. When the buffer tail falls
/// more than two intervals behind the clock, re-fetch history and append
/// everything newer than the tail.
async fn gap_resync_loop(
    feed: FeedClient,
    buffer: CandleBuffer,
    symbol: String,
    interval_label: String,
    limit: usize,
) {
    let interval_ms = interval_millis(&interval_label);
    let mut tick = interval(Duration::from_millis(interval_ms.max(1000)));
    tick.tick().await;

    loop {
        tick.tick().await;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let stale = buffer
            .latest_open_time()
            .map(|tail| now_ms - tail > 2 * interval_ms as i64)
            .unwrap_or(true);
        if !stale {
            continue;
        }

        tracing::warn!(symbol = %symbol, "candle stream gap detected, backfilling");
        match feed.fetch_history(&symbol, &interval_label, limit).await {
            Ok(candles) => {
                let appended = buffer.backfill(candles);
                tracing::info!(symbol = %symbol, appended, "gap backfill complete");
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "gap backfill failed");
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

fn interval_millis(label: &str) -> u64 {
    let (digits, unit) = label.split_at(label.len().saturating_sub(1));
    let n: u64 = digits.parse().unwrap_or(1);
    match unit {
        "s" => n * 1000,
        "m" => n * 60_000,
        "h" => n * 3_600_000,
        "d" => n * 86_400_000,
        _ => 60_000,
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openbookbot=info".into()),
        )
        .init();
}
