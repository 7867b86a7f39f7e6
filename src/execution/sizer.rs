use std::sync::Arc;

use thiserror::Error;

use crate::venue::ExecutionVenue;

/// Safety margin applied on top of one lot's notional value.
const MIN_NOTIONAL_MARGIN: f64 = 1.05;

#[derive(Debug, Error)]
pub enum SizingError {
    #[error("notional {notional:.4} below minimum viable order {minimum:.4}")]
    BelowMinimum { notional: f64, minimum: f64 },

    #[error("trade volume quantized to zero lots on both legs")]
    ZeroLots,
}

/// Venue-native order size for one intent.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSize {
    pub base_lots: u64,
    pub quote_lots: u64,
    /// Base quantity snapped down to whole lots, in human units.
    pub base_size: f64,
    /// Quote value of the snapped base quantity at the sizing price.
    pub quote_size: f64,
}

/// Converts a target quote-currency notional and the current price into
/// venue-native lot counts.
#[derive(Clone)]
pub struct OrderSizer {
    venue: Arc<dyn ExecutionVenue>,
}

impl OrderSizer {
    pub fn new(venue: Arc<dyn ExecutionVenue>) -> Self {
        Self { venue }
    }

    /// One base lot valued at `price`, inflated by the safety margin.
    /// Orders below this are rejected before any submission attempt.
    pub fn minimum_order_notional(&self, price: f64) -> f64 {
        self.venue.base_lot_size() * price * MIN_NOTIONAL_MARGIN
    }

    /// Size an order worth `volume_quote` (quote-currency notional) at
    /// `price`.
    pub fn size_order(&self, volume_quote: f64, price: f64) -> Result<OrderSize, SizingError> {
        let minimum = self.minimum_order_notional(price);
        if volume_quote < minimum {
            return Err(SizingError::BelowMinimum {
                notional: volume_quote,
                minimum,
            });
        }

        let base_lots = self.venue.to_base_lots(volume_quote / price);
        let quote_lots = self.venue.to_quote_lots(volume_quote);
        if base_lots == 0 && quote_lots == 0 {
            return Err(SizingError::ZeroLots);
        }

        let base_size = base_lots as f64 * self.venue.base_lot_size();
        Ok(OrderSize {
            base_lots,
            quote_lots,
            base_size,
            quote_size: base_size * price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::{PaperVenue, PaperVenueConfig};

    fn sizer() -> OrderSizer {
        let venue = Arc::new(PaperVenue::new(PaperVenueConfig {
            base_lot_size: 0.1,
            quote_lot_size: 0.01,
            tick_size: 0.001,
        }));
        OrderSizer::new(venue)
    }

    #[test]
    fn test_minimum_notional_includes_margin() {
        let sizer = sizer();
        // 0.1 base * 50.0 * 1.05
        assert!((sizer.minimum_order_notional(50.0) - 5.25).abs() < 1e-10);
    }

    #[test]
    fn test_below_minimum_rejected() {
        let sizer = sizer();
        let err = sizer.size_order(5.0, 50.0).unwrap_err();
        assert!(matches!(err, SizingError::BelowMinimum { .. }));
    }

    #[test]
    fn test_sizing_snaps_to_lots() {
        let sizer = sizer();
        // 100 quote at price 40 -> 2.5 base -> 25 lots of 0.1
        let size = sizer.size_order(100.0, 40.0).unwrap();
        assert_eq!(size.base_lots, 25);
        assert!((size.base_size - 2.5).abs() < 1e-10);
        assert!((size.quote_size - 100.0).abs() < 1e-9);
        assert!(size.quote_lots > 0);
    }
}
