use std::sync::{Arc, RwLock};

/// Latest live price from the tick stream.
///
/// Single writer (the tick consumer), many readers. A read that is stale
/// by one tick is an accepted approximation, so no coordination with the
/// candle buffer is attempted.
#[derive(Clone, Default)]
pub struct PriceState {
    last: Arc<RwLock<Option<f64>>>,
}

impl PriceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, price: f64) {
        *self.last.write().unwrap() = Some(price);
    }

    /// None until the first tick arrives.
    pub fn get(&self) -> Option<f64> {
        *self.last.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let state = PriceState::new();
        assert!(state.get().is_none());
    }

    #[test]
    fn test_latest_write_wins() {
        let state = PriceState::new();
        state.set(100.0);
        state.set(101.5);
        assert_eq!(state.get(), Some(101.5));
    }

    #[test]
    fn test_shared_between_clones() {
        let writer = PriceState::new();
        let reader = writer.clone();
        writer.set(42.0);
        assert_eq!(reader.get(), Some(42.0));
    }
}
