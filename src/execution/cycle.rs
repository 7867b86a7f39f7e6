use std::sync::Arc;

use tokio::time::{sleep, Duration};

use super::{BalanceAccountant, OrderSize, OrderSizer};
use crate::indicators::IndicatorEngine;
use crate::models::{IndicatorSnapshot, OrderIntent, OrderSide, Trader};
use crate::venue::{ExecutionVenue, VenueError};

/// Signal thresholds and cycle timing, loaded once at startup.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Target order notional in quote-currency units.
    pub trade_volume: f64,
    /// Limit-price offset from mid, as a fraction (0.001 = 10 bps).
    pub price_offset_pct: f64,
    /// Inter-cycle sleep.
    pub cooldown: Duration,
    /// Short sleep when indicators are not ready yet.
    pub retry_interval: Duration,
    pub overbought: f64,
    pub oversold: f64,
    pub wma_buy_limit: f64,
    pub wma_sell_limit: f64,
    /// Selects the neutral-zone policy branch: range-bound fading versus
    /// trend following.
    pub range_bound_mode: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            trade_volume: 100.0,
            price_offset_pct: 0.001,
            cooldown: Duration::from_secs(60),
            retry_interval: Duration::from_secs(5),
            overbought: 75.0,
            oversold: 25.0,
            wma_buy_limit: 40.0,
            wma_sell_limit: 60.0,
            range_bound_mode: false,
        }
    }
}

/// What one Reconcile→Cooldown pass did. Every branch of the state
/// machine is observable here.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Indicators carried a sentinel; no decision this cycle.
    SkippedIndicators,
    /// Signal policy chose no side.
    NoSignal,
    /// Below minimum notional or zero lots.
    SkippedSizing,
    /// Funds short after the wrap fallback.
    SkippedFunds,
    /// Order is resting on the book.
    Placed { side: OrderSide },
    /// Submission failed; the next cycle is the retry.
    SubmitFailed,
    /// Non-fatal venue fault outside submission.
    VenueFault,
}

/// Per-trader trading loop: Reconcile → Evaluate → Size → Fund-Check →
/// Submit → Cooldown, forever. Terminal only on a configuration fault.
pub struct TradingCycle {
    venue: Arc<dyn ExecutionVenue>,
    accountant: BalanceAccountant,
    sizer: OrderSizer,
    engine: IndicatorEngine,
    trader: Trader,
    config: CycleConfig,
    /// Only state carried between iterations; avoids redundant cancels.
    previous_open_orders: usize,
}

impl TradingCycle {
    pub fn new(
        venue: Arc<dyn ExecutionVenue>,
        engine: IndicatorEngine,
        trader: Trader,
        config: CycleConfig,
    ) -> Self {
        Self {
            accountant: BalanceAccountant::new(venue.clone()),
            sizer: OrderSizer::new(venue.clone()),
            venue,
            engine,
            trader,
            config,
            previous_open_orders: 0,
        }
    }

    /// Run until process shutdown or a fatal configuration fault.
    pub async fn run(mut self) -> crate::Result<()> {
        tracing::info!(trader = %self.trader.label, "trading cycle starting");

        loop {
            let outcome = match self.run_once().await {
                Ok(outcome) => outcome,
                Err(err) if err.is_fatal() => {
                    tracing::error!(
                        trader = %self.trader.label,
                        error = %err,
                        "fatal configuration fault, stopping trader"
                    );
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!(
                        trader = %self.trader.label,
                        error = %err,
                        "venue fault, retrying next cycle"
                    );
                    CycleOutcome::VenueFault
                }
            };

            let delay = match outcome {
                CycleOutcome::SkippedIndicators => self.config.retry_interval,
                _ => self.config.cooldown,
            };
            sleep(delay).await;
        }
    }

    /// One full pass of the state machine.
    pub async fn run_once(&mut self) -> Result<CycleOutcome, VenueError> {
        self.reconcile().await?;

        // Evaluate
        let snapshot = self.engine.compute_snapshot();
        if !snapshot.is_complete() {
            tracing::info!(
                trader = %self.trader.label,
                rsi = snapshot.rsi,
                wma = snapshot.wma,
                ema = snapshot.ema,
                "indicators incomplete, skipping cycle"
            );
            return Ok(CycleOutcome::SkippedIndicators);
        }

        let mid = self.venue.mid_price().await?;
        tracing::info!(
            trader = %self.trader.label,
            rsi = snapshot.rsi,
            wma = snapshot.wma,
            ema = snapshot.ema,
            mid,
            "evaluating signal"
        );

        let Some(side) = evaluate_signal(&snapshot, &self.config) else {
            tracing::info!(trader = %self.trader.label, "no signal this cycle");
            return Ok(CycleOutcome::NoSignal);
        };

        // Size
        let size = match self.sizer.size_order(self.config.trade_volume, mid) {
            Ok(size) => size,
            Err(err) => {
                tracing::warn!(trader = %self.trader.label, error = %err, "sizing fault");
                return Ok(CycleOutcome::SkippedSizing);
            }
        };

        // Fund-Check
        if !self.ensure_funds(side, &size).await? {
            return Ok(CycleOutcome::SkippedFunds);
        }

        // Submit
        let intent = OrderIntent {
            side,
            price: limit_price(side, mid, self.config.price_offset_pct),
            size: size.base_size,
        };
        self.submit(&intent).await
    }

    /// Reconcile resting orders: cancel-all when open orders exist and
    /// the count moved since the previous iteration.
    async fn reconcile(&mut self) -> Result<(), VenueError> {
        let open = self.venue.open_orders(&self.trader).await?;

        if !open.is_empty() && open.len() != self.previous_open_orders {
            tracing::info!(
                trader = %self.trader.label,
                open_orders = open.len(),
                "cancelling resting orders"
            );
            self.venue.cancel_all_orders(&self.trader).await?;

            let remaining = self.venue.open_orders(&self.trader).await?;
            if !remaining.is_empty() {
                // Not fatal; the next reconcile pass sees them again
                tracing::warn!(
                    trader = %self.trader.label,
                    remaining = remaining.len(),
                    "orders still resting after cancel-all"
                );
            }
            self.previous_open_orders = remaining.len();
        } else {
            self.previous_open_orders = open.len();
        }
        Ok(())
    }

    /// Check funds for the chosen side. A base-asset shortfall gets one
    /// wrap attempt covering exactly the missing amount, then a re-check.
    async fn ensure_funds(&self, side: OrderSide, size: &OrderSize) -> Result<bool, VenueError> {
        let balances = self.accountant.snapshot(&self.trader).await?;

        match side {
            OrderSide::Bid => {
                if balances.free_quote() >= size.quote_size {
                    return Ok(true);
                }
                tracing::warn!(
                    trader = %self.trader.label,
                    required = size.quote_size,
                    available = balances.free_quote(),
                    "insufficient quote balance, skipping cycle"
                );
                Ok(false)
            }
            OrderSide::Ask => {
                if balances.free_base() >= size.base_size {
                    return Ok(true);
                }

                let shortfall = size.base_size - balances.free_base();
                if balances.native_gas < shortfall {
                    tracing::warn!(
                        trader = %self.trader.label,
                        shortfall,
                        native_gas = balances.native_gas,
                        "base shortfall exceeds wrappable gas, skipping cycle"
                    );
                    return Ok(false);
                }

                tracing::info!(
                    trader = %self.trader.label,
                    shortfall,
                    "wrapping native balance to cover base shortfall"
                );
                if let Err(err) = self.venue.wrap_native(&self.trader, shortfall).await {
                    tracing::warn!(trader = %self.trader.label, error = %err, "wrap failed");
                    return Ok(false);
                }

                let after = self.accountant.snapshot(&self.trader).await?;
                if after.free_base() >= size.base_size {
                    Ok(true)
                } else {
                    tracing::warn!(
                        trader = %self.trader.label,
                        required = size.base_size,
                        available = after.free_base(),
                        "still short after wrap, skipping cycle"
                    );
                    Ok(false)
                }
            }
        }
    }

    async fn submit(&self, intent: &OrderIntent) -> Result<CycleOutcome, VenueError> {
        match self.venue.place_order(&self.trader, intent).await {
            Ok(receipt) => {
                tracing::info!(
                    trader = %self.trader.label,
                    side = %intent.side,
                    price = intent.price,
                    size = intent.size,
                    signature = %receipt.signature,
                    "order placed"
                );
                Ok(CycleOutcome::Placed { side: intent.side })
            }
            Err(VenueError::Expired(msg)) => {
                // Transient validity expiry: the next cycle retries fresh
                tracing::warn!(trader = %self.trader.label, reason = %msg, "placement expired");
                Ok(CycleOutcome::SubmitFailed)
            }
            Err(VenueError::Rejected { logs }) => {
                tracing::error!(
                    trader = %self.trader.label,
                    ?logs,
                    "placement rejected by venue simulation"
                );
                Ok(CycleOutcome::SubmitFailed)
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::warn!(trader = %self.trader.label, error = %err, "placement failed");
                Ok(CycleOutcome::SubmitFailed)
            }
        }
    }
}

/// Limit price offset away from mid on the passive side.
fn limit_price(side: OrderSide, mid: f64, offset_pct: f64) -> f64 {
    match side {
        OrderSide::Bid => mid * (1.0 - offset_pct),
        OrderSide::Ask => mid * (1.0 + offset_pct),
    }
}

/// Signal policy: overbought/oversold extremes first, then the
/// mode-selected neutral-zone branch. Returns `None` when any snapshot
/// field is a sentinel or when no condition holds.
pub fn evaluate_signal(snapshot: &IndicatorSnapshot, config: &CycleConfig) -> Option<OrderSide> {
    if !snapshot.is_complete() {
        return None;
    }

    if snapshot.rsi > config.overbought {
        return Some(OrderSide::Ask);
    }
    if snapshot.rsi < config.oversold {
        return Some(OrderSide::Bid);
    }

    if config.range_bound_mode {
        let lo = snapshot.wma.min(snapshot.ema);
        let hi = snapshot.wma.max(snapshot.ema);
        if snapshot.rsi >= lo && snapshot.rsi <= hi {
            // Neutral zone: buy-candidate gated by the WMA buy limit
            if snapshot.wma < config.wma_buy_limit {
                return Some(OrderSide::Bid);
            }
            return None;
        }
        if snapshot.rsi > snapshot.wma
            && snapshot.rsi > snapshot.ema
            && snapshot.wma > config.wma_sell_limit
        {
            return Some(OrderSide::Ask);
        }
        return None;
    }

    // Trending mode
    if snapshot.wma < config.wma_buy_limit && snapshot.rsi < snapshot.wma {
        return Some(OrderSide::Bid);
    }
    if snapshot.wma > config.wma_sell_limit && snapshot.rsi > snapshot.wma {
        return Some(OrderSide::Ask);
    }
    None
}
