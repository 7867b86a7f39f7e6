use crate::models::Candle;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Bounded, time-ordered buffer of closed candles.
///
/// Single source of truth for historical price context. One writer (the
/// candle-stream consumer), many readers. The `open_time` sequence is
/// strictly increasing; stale or duplicate pushes are rejected, not merged.
#[derive(Clone)]
pub struct CandleBuffer {
    data: Arc<RwLock<VecDeque<Candle>>>,
    capacity: usize,
}

impl CandleBuffer {
    /// Create a new buffer holding at most `capacity` candles.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Seed the buffer from a historical fetch.
    ///
    /// On first seed the batch is adopted verbatim except the final bar,
    /// which may still be open and is dropped. On later seeds only candles
    /// strictly older than the earliest retained one are prepended
    /// (gap backfill); existing entries are never reordered or replaced.
    ///
    /// Returns the number of candles adopted.
    pub fn seed(&self, mut candles: Vec<Candle>) -> usize {
        let mut data = self.data.write().unwrap();

        if data.is_empty() {
            // The last fetched bar may not be closed yet
            candles.pop();
            let adopted = candles.len();
            for candle in candles {
                data.push_back(candle);
            }
            while data.len() > self.capacity {
                data.pop_front();
            }
            return adopted;
        }

        let earliest = data.front().map(|c| c.open_time).unwrap_or(i64::MIN);
        let mut older: Vec<Candle> = candles
            .into_iter()
            .filter(|c| c.open_time < earliest)
            .collect();
        let adopted = older.len();
        while let Some(candle) = older.pop() {
            data.push_front(candle);
        }
        while data.len() > self.capacity {
            data.pop_front();
        }
        adopted
    }

    /// Merge a historical re-fetch after a stream gap.
    ///
    /// The final fetched bar may still be open and is dropped, as in
    /// `seed`. Candles at or before the current tail are skipped without
    /// noise; the rest are appended in order. Returns the number adopted.
    pub fn backfill(&self, mut candles: Vec<Candle>) -> usize {
        candles.pop();
        let tail = self.latest_open_time().unwrap_or(i64::MIN);

        let mut adopted = 0;
        for candle in candles.into_iter().filter(|c| c.open_time > tail) {
            if self.append(candle) {
                adopted += 1;
            }
        }
        adopted
    }

    /// Append a freshly closed candle.
    ///
    /// Accepts only candles whose `open_time` is strictly greater than the
    /// current tail's. Returns `false` on an ordering violation, which the
    /// stream consumer treats as a delivery failure (stale or duplicate
    /// feed data) and converts into a reconnect.
    pub fn append(&self, candle: Candle) -> bool {
        let mut data = self.data.write().unwrap();

        if let Some(tail) = data.back() {
            if candle.open_time <= tail.open_time {
                tracing::warn!(
                    open_time = candle.open_time,
                    tail_open_time = tail.open_time,
                    "rejected out-of-order candle"
                );
                return false;
            }
        }

        data.push_back(candle);
        while data.len() > self.capacity {
            data.pop_front();
        }
        true
    }

    /// Ordered closing-price series. The buffer's primary read contract.
    pub fn closes(&self) -> Vec<f64> {
        let data = self.data.read().unwrap();
        data.iter().map(|c| c.close).collect()
    }

    /// Full ordered copy of the retained candles.
    pub fn candles(&self) -> Vec<Candle> {
        let data = self.data.read().unwrap();
        data.iter().cloned().collect()
    }

    /// Attach an RSI annotation to the most recent candle. Price fields
    /// are never touched.
    pub fn annotate_tail_rsi(&self, rsi: f64) {
        let mut data = self.data.write().unwrap();
        if let Some(tail) = data.back_mut() {
            tail.rsi = Some(rsi);
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `open_time` of the oldest retained candle.
    pub fn earliest_open_time(&self) -> Option<i64> {
        self.data.read().unwrap().front().map(|c| c.open_time)
    }

    /// `open_time` of the newest retained candle.
    pub fn latest_open_time(&self) -> Option<i64> {
        self.data.read().unwrap().back().map(|c| c.open_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_at(open_time: i64, close: f64) -> Candle {
        Candle::new(open_time, open_time + 999, close, close, close, close)
    }

    #[test]
    fn test_first_seed_drops_open_bar() {
        let buffer = CandleBuffer::new(10);
        let candles: Vec<Candle> = (1..=5).map(|t| candle_at(t, 100.0 + t as f64)).collect();

        let adopted = buffer.seed(candles);
        assert_eq!(adopted, 4); // final possibly-open bar dropped
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.latest_open_time(), Some(4));
    }

    #[test]
    fn test_reseed_prepends_only_older() {
        let buffer = CandleBuffer::new(10);
        buffer.seed((5..=9).map(|t| candle_at(t, 100.0)).collect::<Vec<_>>());
        assert_eq!(buffer.earliest_open_time(), Some(5));

        // Mix of older, overlapping, and newer candles; only 2..5 qualify
        let adopted = buffer.seed((2..=7).map(|t| candle_at(t, 99.0)).collect::<Vec<_>>());
        assert_eq!(adopted, 3);
        assert_eq!(buffer.earliest_open_time(), Some(2));
        assert_eq!(buffer.latest_open_time(), Some(8));

        // Ordering preserved end to end
        let closes = buffer.closes();
        assert_eq!(closes.len(), 7);
    }

    #[test]
    fn test_append_strictly_increasing() {
        let buffer = CandleBuffer::new(10);

        assert!(buffer.append(candle_at(1, 100.0)));
        assert!(buffer.append(candle_at(2, 101.0)));
        assert!(!buffer.append(candle_at(2, 102.0))); // duplicate
        assert!(!buffer.append(candle_at(1, 103.0))); // stale
        assert!(buffer.append(candle_at(3, 104.0)));

        assert_eq!(buffer.closes(), vec![100.0, 101.0, 104.0]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let buffer = CandleBuffer::new(5);

        for t in 1..=8 {
            assert!(buffer.append(candle_at(t, t as f64)));
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.earliest_open_time(), Some(4));
        assert_eq!(buffer.closes(), vec![4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_seed_append_reject_scenario() {
        // Capacity 5, seeded with open times 1..5; the feed's final bar is
        // dropped on first seed, so push it explicitly.
        let buffer = CandleBuffer::new(5);
        buffer.seed((1..=5).map(|t| candle_at(t, t as f64)).collect::<Vec<_>>());
        assert!(buffer.append(candle_at(5, 5.0)));
        assert_eq!(buffer.len(), 5);

        // Accepting 6 evicts open time 1
        assert!(buffer.append(candle_at(6, 6.0)));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.earliest_open_time(), Some(2));

        // A second 6 is rejected and the buffer is unchanged
        assert!(!buffer.append(candle_at(6, 6.5)));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.closes(), vec![2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_backfill_drops_open_bar_and_skips_overlap() {
        let buffer = CandleBuffer::new(10);
        for t in 1..=5 {
            assert!(buffer.append(candle_at(t, t as f64)));
        }

        // Re-fetch overlapping the tail and ending in a still-open bar at 9
        let fetched: Vec<Candle> = (4..=9).map(|t| candle_at(t, t as f64)).collect();
        let adopted = buffer.backfill(fetched);

        assert_eq!(adopted, 3); // 6, 7, 8; the open bar 9 is dropped
        assert_eq!(buffer.latest_open_time(), Some(8));
        assert_eq!(buffer.closes(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        // The stream's own closed bar for 9 still lands cleanly
        assert!(buffer.append(candle_at(9, 9.0)));
    }

    #[test]
    fn test_annotate_tail_rsi() {
        let buffer = CandleBuffer::new(5);
        buffer.append(candle_at(1, 100.0));
        buffer.annotate_tail_rsi(62.5);

        let candles = buffer.candles();
        assert_eq!(candles.last().unwrap().rsi, Some(62.5));
        assert_eq!(candles.last().unwrap().close, 100.0);
    }
}
