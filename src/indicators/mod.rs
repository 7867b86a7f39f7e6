// Technical indicators module
// RSI over closing prices, WMA/EMA smoothing over the RSI series

pub mod engine;
pub mod moving_average;
pub mod rsi;

pub use engine::{IndicatorConfig, IndicatorEngine};
pub use moving_average::{calculate_ema, calculate_wma};
pub use rsi::{calculate_rsi, calculate_rsi_series};
