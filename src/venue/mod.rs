// Execution venue boundary: order placement, balances, unit quantization.
// Real on-chain/off-chain adapters implement this trait; the core never
// looks behind it.

pub mod paper;

pub use paper::{PaperVenue, PaperVenueConfig, ScriptedFailure};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{OpenOrder, OrderIntent, OrderReceipt, Trader, WalletBalances};

/// Failure classes the trading cycle branches on.
#[derive(Debug, Error)]
pub enum VenueError {
    /// The action's validity window lapsed before it landed. Retrying is
    /// the next cycle's job, never this one's.
    #[error("transaction validity expired: {0}")]
    Expired(String),

    /// The venue simulated and refused the action; diagnostics attached.
    #[error("order rejected by venue ({} log lines)", logs.len())]
    Rejected { logs: Vec<String> },

    /// A leg lacked the funds the action needed.
    #[error("insufficient {asset}: need {required}, have {available}")]
    InsufficientFunds {
        asset: String,
        required: f64,
        available: f64,
    },

    /// The configured market does not exist. Bootstrap fault, fatal for
    /// the affected trader.
    #[error("market not found: {0}")]
    MissingMarket(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VenueError {
    /// True for configuration faults that should end the trader's loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VenueError::MissingMarket(_))
    }
}

/// Order-book venue adapter.
///
/// All operations act on the single trading pair the process was
/// configured with. Quantization helpers convert human-readable amounts
/// into venue-native lots and price ticks.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Provision the holding accounts the trader needs on this venue.
    /// Idempotent; invoked before balance reads.
    async fn ensure_accounts(&self, trader: &Trader) -> Result<(), VenueError>;

    async fn place_order(
        &self,
        trader: &Trader,
        intent: &OrderIntent,
    ) -> Result<OrderReceipt, VenueError>;

    async fn cancel_all_orders(&self, trader: &Trader) -> Result<OrderReceipt, VenueError>;

    async fn open_orders(&self, trader: &Trader) -> Result<Vec<OpenOrder>, VenueError>;

    async fn balances(&self, trader: &Trader) -> Result<WalletBalances, VenueError>;

    /// Convert native gas balance into the tradable wrapped base asset.
    async fn wrap_native(&self, trader: &Trader, amount: f64) -> Result<(), VenueError>;

    /// Midpoint of best bid and best ask.
    async fn mid_price(&self) -> Result<f64, VenueError>;

    /// Base units represented by one lot.
    fn base_lot_size(&self) -> f64;

    fn to_base_lots(&self, size: f64) -> u64;

    fn to_quote_lots(&self, notional: f64) -> u64;

    fn to_price_ticks(&self, price: f64) -> u64;
}
