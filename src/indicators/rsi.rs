/// Calculate Relative Strength Index (RSI)
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Needs `period + 1` prices so that `period` deltas exist. Uses the
/// Wilder-style simple average of gains and losses over the trailing
/// window; saturates at 100 when the average loss is zero.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;

    // Only the last `period` deltas enter the averages
    for i in prices.len() - period..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Rolling RSI: one value per window position, oldest first.
///
/// The result feeds the WMA/EMA smoothers, which operate on the RSI
/// series rather than on raw price.
pub fn calculate_rsi_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period + 1 {
        return Vec::new();
    }

    (period..prices.len())
        .filter_map(|end| calculate_rsi(&prices[..=end], period))
        .collect()
}
