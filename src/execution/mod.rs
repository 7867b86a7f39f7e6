// Trading-side components: balance view, order sizing, cycle state machine

pub mod balances;
pub mod cycle;
pub mod sizer;

pub use balances::BalanceAccountant;
pub use cycle::{evaluate_signal, CycleConfig, CycleOutcome, TradingCycle};
pub use sizer::{OrderSize, OrderSizer, SizingError};
