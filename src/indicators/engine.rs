use super::{calculate_ema, calculate_rsi, calculate_rsi_series, calculate_wma};
use crate::feed::{CandleBuffer, PriceState};
use crate::models::IndicatorSnapshot;

/// Window lengths for the momentum pipeline.
///
/// WMA and EMA run over the rolling RSI series, not raw price, so their
/// periods are counted in RSI values.
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub wma_period: usize,
    pub ema_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            wma_period: 45,
            ema_period: 9,
        }
    }
}

/// Derives the momentum snapshot from the candle buffer plus the live tick.
#[derive(Clone)]
pub struct IndicatorEngine {
    buffer: CandleBuffer,
    price: PriceState,
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(buffer: CandleBuffer, price: PriceState, config: IndicatorConfig) -> Self {
        Self {
            buffer,
            price,
            config,
        }
    }

    /// Compute the current snapshot.
    ///
    /// Always returns a well-formed snapshot: any field whose window is not
    /// yet filled carries the NaN sentinel, and any internal fault degrades
    /// to the all-sentinel snapshot rather than surfacing an error. Partial
    /// availability is normal while history is still accumulating (RSI can
    /// be live while the WMA window is short).
    pub fn compute_snapshot(&self) -> IndicatorSnapshot {
        let Some(live_price) = self.price.get() else {
            tracing::debug!("no live tick yet, indicators unavailable");
            return IndicatorSnapshot::empty();
        };

        let closes = self.buffer.closes();
        if closes.len() < self.config.rsi_period {
            tracing::debug!(
                candles = closes.len(),
                needed = self.config.rsi_period,
                "insufficient history for RSI"
            );
            return IndicatorSnapshot::empty();
        }

        // One synthetic point at the live price so the indicator reflects
        // intrabar movement, not just closed bars
        let mut series = closes;
        series.push(live_price);

        let rsi = calculate_rsi(&series, self.config.rsi_period);
        let rsi_series = calculate_rsi_series(&series, self.config.rsi_period);
        let wma = calculate_wma(&rsi_series, self.config.wma_period);
        let ema = calculate_ema(&rsi_series, self.config.ema_period);

        if let Some(value) = rsi {
            self.buffer.annotate_tail_rsi(value);
        }

        IndicatorSnapshot {
            rsi: rsi.unwrap_or(f64::NAN),
            wma: wma.unwrap_or(f64::NAN),
            ema: ema.unwrap_or(f64::NAN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;

    fn engine_with_closes(closes: &[f64], config: IndicatorConfig) -> (IndicatorEngine, PriceState) {
        let buffer = CandleBuffer::new(200);
        for (i, close) in closes.iter().enumerate() {
            let t = (i as i64 + 1) * 1000;
            assert!(buffer.append(Candle::new(t, t + 999, *close, *close, *close, *close)));
        }
        let price = PriceState::new();
        let engine = IndicatorEngine::new(buffer, price.clone(), config);
        (engine, price)
    }

    #[test]
    fn test_no_tick_yields_all_sentinel() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let (engine, _price) = engine_with_closes(&closes, IndicatorConfig::default());

        let snapshot = engine.compute_snapshot();
        assert!(snapshot.rsi.is_nan());
        assert!(snapshot.wma.is_nan());
        assert!(snapshot.ema.is_nan());
    }

    #[test]
    fn test_rsi_sentinel_below_period() {
        let closes: Vec<f64> = (0..13).map(|i| 100.0 + i as f64).collect();
        let (engine, price) = engine_with_closes(&closes, IndicatorConfig::default());
        price.set(113.5);

        let snapshot = engine.compute_snapshot();
        assert!(snapshot.rsi.is_nan());
    }

    #[test]
    fn test_rsi_live_at_exactly_period_closes() {
        // 14 closes plus the live tick gives exactly 14 deltas
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        let (engine, price) = engine_with_closes(&closes, IndicatorConfig::default());
        price.set(114.0);

        let snapshot = engine.compute_snapshot();
        assert!(snapshot.rsi.is_finite());
        assert!((0.0..=100.0).contains(&snapshot.rsi));
        // Monotone rise saturates the index
        assert_eq!(snapshot.rsi, 100.0);
        // Smoother windows are still short
        assert!(snapshot.wma.is_nan());
        assert!(snapshot.ema.is_nan());
    }

    #[test]
    fn test_partial_availability() {
        let config = IndicatorConfig {
            rsi_period: 14,
            wma_period: 45,
            ema_period: 9,
        };
        // Enough RSI values for EMA(9) but not WMA(45):
        // closes + tick = 26 points -> 12 RSI values
        let closes: Vec<f64> = (0..25)
            .map(|i| 100.0 + (i as f64 * 0.9).sin() * 5.0)
            .collect();
        let (engine, price) = engine_with_closes(&closes, config);
        price.set(101.0);

        let snapshot = engine.compute_snapshot();
        assert!(snapshot.rsi.is_finite());
        assert!(snapshot.ema.is_finite());
        assert!(snapshot.wma.is_nan());
        assert!(!snapshot.is_complete());
    }

    #[test]
    fn test_full_snapshot_with_small_windows() {
        let config = IndicatorConfig {
            rsi_period: 14,
            wma_period: 5,
            ema_period: 3,
        };
        let closes: Vec<f64> = (0..30)
            .map(|i| 100.0 + (i as f64 * 0.5).sin() * 8.0)
            .collect();
        let (engine, price) = engine_with_closes(&closes, config);
        price.set(99.0);

        let snapshot = engine.compute_snapshot();
        assert!(snapshot.is_complete());
        assert!((0.0..=100.0).contains(&snapshot.rsi));
        assert!((0.0..=100.0).contains(&snapshot.wma));
        assert!((0.0..=100.0).contains(&snapshot.ema));
    }

    #[test]
    fn test_tail_rsi_annotation() {
        let buffer = CandleBuffer::new(200);
        for i in 0..20 {
            let t = (i as i64 + 1) * 1000;
            let close = 100.0 + i as f64;
            buffer.append(Candle::new(t, t + 999, close, close, close, close));
        }
        let price = PriceState::new();
        price.set(120.0);
        let engine = IndicatorEngine::new(buffer.clone(), price, IndicatorConfig::default());

        let snapshot = engine.compute_snapshot();
        assert!(snapshot.rsi.is_finite());
        assert_eq!(buffer.candles().last().unwrap().rsi, Some(snapshot.rsi));
    }
}
