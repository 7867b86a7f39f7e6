use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ExecutionVenue, VenueError};
use crate::models::{OpenOrder, OrderIntent, OrderReceipt, OrderSide, Trader, WalletBalances};

/// Quantization and market parameters for the paper venue.
#[derive(Debug, Clone)]
pub struct PaperVenueConfig {
    pub base_lot_size: f64,
    pub quote_lot_size: f64,
    pub tick_size: f64,
}

impl Default for PaperVenueConfig {
    fn default() -> Self {
        Self {
            base_lot_size: 0.1,
            quote_lot_size: 0.01,
            tick_size: 0.001,
        }
    }
}

/// Scripted failure for the next placement attempt.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    Expired,
    Rejected(Vec<String>),
}

#[derive(Default)]
struct PaperState {
    balances: HashMap<String, WalletBalances>,
    orders: HashMap<String, Vec<OpenOrder>>,
    provisioned: HashSet<String>,
    mid_price: f64,
    next_order_id: u128,
    next_failure: Option<ScriptedFailure>,
    place_calls: u32,
    cancel_calls: u32,
    wrap_calls: u32,
}

/// Deterministic in-memory venue.
///
/// Serves as the dry-run venue in main and as the test double for the
/// trading cycle. Placements lock funds into the open order; cancel-all
/// releases them. Failures can be scripted one placement ahead.
pub struct PaperVenue {
    config: PaperVenueConfig,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new(config: PaperVenueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PaperState {
                mid_price: 0.0,
                ..Default::default()
            }),
        }
    }

    pub fn set_mid_price(&self, mid: f64) {
        self.state.lock().unwrap().mid_price = mid;
    }

    pub fn set_balances(&self, trader: &Trader, balances: WalletBalances) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(trader.label.clone(), balances);
    }

    /// Fail the next `place_order` call with the given error.
    pub fn script_failure(&self, failure: ScriptedFailure) {
        self.state.lock().unwrap().next_failure = Some(failure);
    }

    pub fn place_calls(&self) -> u32 {
        self.state.lock().unwrap().place_calls
    }

    pub fn cancel_calls(&self) -> u32 {
        self.state.lock().unwrap().cancel_calls
    }

    pub fn wrap_calls(&self) -> u32 {
        self.state.lock().unwrap().wrap_calls
    }

    pub fn was_provisioned(&self, trader: &Trader) -> bool {
        self.state
            .lock()
            .unwrap()
            .provisioned
            .contains(&trader.label)
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    async fn ensure_accounts(&self, trader: &Trader) -> Result<(), VenueError> {
        let mut state = self.state.lock().unwrap();
        if state.provisioned.insert(trader.label.clone()) {
            tracing::info!(trader = %trader.label, "provisioned paper holding accounts");
        }
        state.balances.entry(trader.label.clone()).or_default();
        Ok(())
    }

    async fn place_order(
        &self,
        trader: &Trader,
        intent: &OrderIntent,
    ) -> Result<OrderReceipt, VenueError> {
        let mut state = self.state.lock().unwrap();
        state.place_calls += 1;

        if let Some(failure) = state.next_failure.take() {
            return Err(match failure {
                ScriptedFailure::Expired => {
                    VenueError::Expired("block height exceeded".to_string())
                }
                ScriptedFailure::Rejected(logs) => VenueError::Rejected { logs },
            });
        }

        let balances = state
            .balances
            .entry(trader.label.clone())
            .or_default();

        // Lock the funds the resting order consumes
        match intent.side {
            OrderSide::Bid => {
                let required = intent.size * intent.price;
                if balances.quote_wallet < required {
                    return Err(VenueError::InsufficientFunds {
                        asset: "quote".to_string(),
                        required,
                        available: balances.quote_wallet,
                    });
                }
                balances.quote_wallet -= required;
                balances.quote_locked += required;
            }
            OrderSide::Ask => {
                if balances.base_wallet < intent.size {
                    return Err(VenueError::InsufficientFunds {
                        asset: "base".to_string(),
                        required: intent.size,
                        available: balances.base_wallet,
                    });
                }
                balances.base_wallet -= intent.size;
                balances.base_locked += intent.size;
            }
        }

        state.next_order_id += 1;
        let order_id = state.next_order_id;
        state
            .orders
            .entry(trader.label.clone())
            .or_default()
            .push(OpenOrder {
                order_id,
                side: intent.side,
                price: intent.price,
                size: intent.size,
            });

        tracing::info!(
            trader = %trader.label,
            side = %intent.side,
            price = intent.price,
            size = intent.size,
            "paper order resting"
        );
        Ok(OrderReceipt::new(format!("paper-place-{}", order_id)))
    }

    async fn cancel_all_orders(&self, trader: &Trader) -> Result<OrderReceipt, VenueError> {
        let mut state = self.state.lock().unwrap();
        state.cancel_calls += 1;

        let cancelled = state.orders.remove(&trader.label).unwrap_or_default();
        let balances = state
            .balances
            .entry(trader.label.clone())
            .or_default();
        for order in &cancelled {
            match order.side {
                OrderSide::Bid => {
                    let locked = order.size * order.price;
                    balances.quote_locked -= locked;
                    balances.quote_wallet += locked;
                }
                OrderSide::Ask => {
                    balances.base_locked -= order.size;
                    balances.base_wallet += order.size;
                }
            }
        }

        tracing::info!(
            trader = %trader.label,
            cancelled = cancelled.len(),
            "paper cancel-all"
        );
        Ok(OrderReceipt::new("paper-cancel"))
    }

    async fn open_orders(&self, trader: &Trader) -> Result<Vec<OpenOrder>, VenueError> {
        let state = self.state.lock().unwrap();
        Ok(state.orders.get(&trader.label).cloned().unwrap_or_default())
    }

    async fn balances(&self, trader: &Trader) -> Result<WalletBalances, VenueError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .balances
            .get(&trader.label)
            .cloned()
            .unwrap_or_default())
    }

    async fn wrap_native(&self, trader: &Trader, amount: f64) -> Result<(), VenueError> {
        let mut state = self.state.lock().unwrap();
        state.wrap_calls += 1;

        let balances = state
            .balances
            .entry(trader.label.clone())
            .or_default();
        if balances.native_gas < amount {
            return Err(VenueError::InsufficientFunds {
                asset: "native gas".to_string(),
                required: amount,
                available: balances.native_gas,
            });
        }

        balances.native_gas -= amount;
        balances.base_wallet += amount;
        tracing::info!(trader = %trader.label, amount, "wrapped native balance");
        Ok(())
    }

    async fn mid_price(&self) -> Result<f64, VenueError> {
        let state = self.state.lock().unwrap();
        if state.mid_price <= 0.0 {
            return Err(anyhow::anyhow!("paper mid price not set").into());
        }
        Ok(state.mid_price)
    }

    fn base_lot_size(&self) -> f64 {
        self.config.base_lot_size
    }

    fn to_base_lots(&self, size: f64) -> u64 {
        quantize(size, self.config.base_lot_size)
    }

    fn to_quote_lots(&self, notional: f64) -> u64 {
        quantize(notional, self.config.quote_lot_size)
    }

    fn to_price_ticks(&self, price: f64) -> u64 {
        quantize(price, self.config.tick_size)
    }
}

// Floor division with a tolerance for binary rounding, so exact ratios
// like 2.5 / 0.1 do not land one lot short.
fn quantize(amount: f64, unit: f64) -> u64 {
    if amount <= 0.0 || unit <= 0.0 {
        return 0;
    }
    (amount / unit + 1e-9).floor() as u64
}
