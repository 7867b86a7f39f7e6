/// Calculate Weighted Moving Average (WMA)
///
/// Linear weights over the trailing `period` values, most recent weighted
/// heaviest.
pub fn calculate_wma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let window = &values[values.len() - period..];
    let denominator = (period * (period + 1)) as f64 / 2.0;
    let weighted: f64 = window
        .iter()
        .enumerate()
        .map(|(i, v)| v * (i + 1) as f64)
        .sum();

    Some(weighted / denominator)
}

/// Calculate Exponential Moving Average (EMA)
///
/// Seeded with the simple average of the first `period` values, then
/// smoothed across the remainder.
pub fn calculate_ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let initial: f64 = values[..period].iter().sum::<f64>() / period as f64;

    let mut ema = initial;
    for value in &values[period..] {
        ema = (value - ema) * multiplier + ema;
    }

    Some(ema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wma_weights_recent_values() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        // (1*1 + 2*2 + 3*3 + 4*4 + 5*5) / 15 = 55/15
        let wma = calculate_wma(&values, 5).unwrap();
        assert!((wma - 55.0 / 15.0).abs() < 1e-10);
    }

    #[test]
    fn test_wma_uses_trailing_window() {
        let values = vec![100.0, 1.0, 2.0, 3.0];
        let wma = calculate_wma(&values, 3).unwrap();
        // Leading 100.0 falls outside the window
        assert!((wma - (1.0 + 4.0 + 9.0) / 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_wma_insufficient_data() {
        let values = vec![1.0, 2.0];
        assert!(calculate_wma(&values, 5).is_none());
    }

    #[test]
    fn test_ema() {
        let values = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = calculate_ema(&values, 5);
        assert!(ema.is_some());
        assert!(ema.unwrap() > 104.0); // EMA should be above initial SMA
    }

    #[test]
    fn test_ema_insufficient_data() {
        let values = vec![100.0, 102.0];
        assert!(calculate_ema(&values, 5).is_none());
    }

    #[test]
    fn test_ema_constant_series() {
        let values = vec![50.0; 12];
        let ema = calculate_ema(&values, 9).unwrap();
        assert!((ema - 50.0).abs() < 1e-10);
    }
}
