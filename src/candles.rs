//! Candle aggregation from raw trade ticks
//!
//! A `CandleSeries` owns the candles for one (contract, timeframe) pair:
//! an immutable finalized history plus the single open candle that live ticks
//! fold into. Timestamps sit on a gap-free grid spaced exactly one interval
//! apart; gaps in the tick stream are filled with synthetic flat candles so
//! indicator windows never see missing bars.

use tracing::debug;

use crate::types::{Candle, Tick, Timeframe};

#[derive(Debug)]
pub struct CandleSeries {
    timeframe: Timeframe,
    interval_ms: i64,
    /// Finalized candles, strictly increasing timestamps, no gaps
    history: Vec<Candle>,
    /// The current still-open candle, the only mutable one
    open: Option<Candle>,
}

impl CandleSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            interval_ms: timeframe.as_millis(),
            history: Vec::new(),
            open: None,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Finalized candles, oldest first
    pub fn closed(&self) -> &[Candle] {
        &self.history
    }

    pub fn last_closed(&self) -> Option<&Candle> {
        self.history.last()
    }

    /// The current open candle, if any tick has arrived yet
    pub fn open_candle(&self) -> Option<&Candle> {
        self.open.as_ref()
    }

    /// Align a timestamp down to its interval boundary
    pub fn align(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.interval_ms)
    }

    /// Seed history from REST candles before live ticks begin.
    ///
    /// Timestamps are aligned to the grid and gaps between consecutive rows
    /// are filled with flat candles, preserving the series invariant. Ignored
    /// once the series already holds data.
    pub fn backfill(&mut self, mut candles: Vec<Candle>) {
        if self.open.is_some() || !self.history.is_empty() {
            debug!("backfill ignored: series already has data");
            return;
        }
        candles.sort_by_key(|c| c.timestamp);
        for mut candle in candles {
            candle.timestamp = self.align(candle.timestamp);
            match self.history.last() {
                None => self.history.push(candle),
                Some(last) if candle.timestamp <= last.timestamp => {
                    debug!("backfill dropped duplicate candle at {}", candle.timestamp);
                }
                Some(last) => {
                    let mut boundary = last.timestamp + self.interval_ms;
                    let prior_close = last.close;
                    while boundary < candle.timestamp {
                        self.history.push(flat_candle(boundary, prior_close));
                        boundary += self.interval_ms;
                    }
                    self.history.push(candle);
                }
            }
        }
    }

    /// Fold a tick into the series and return the candles it completed,
    /// oldest first (includes any synthetic gap fillers).
    pub fn update(&mut self, tick: &Tick) -> Vec<Candle> {
        let tick_boundary = self.align(tick.timestamp);

        let open = match self.open.take() {
            Some(open) => open,
            None => {
                // First live tick; bridge from backfilled history if present
                if let Some(last) = self.history.last() {
                    if tick_boundary <= last.timestamp {
                        debug!(
                            "dropped stale tick at {} (history ends {})",
                            tick.timestamp, last.timestamp
                        );
                        return Vec::new();
                    }
                }
                let completed = self.fill_flat_until(tick_boundary);
                self.open = Some(seed_candle(tick_boundary, tick));
                return completed;
            }
        };

        if tick.timestamp < open.timestamp {
            // Late tick from before the open candle started; no reorder buffer
            debug!(
                "dropped out-of-order tick at {} (open candle starts {})",
                tick.timestamp, open.timestamp
            );
            self.open = Some(open);
            return Vec::new();
        }

        if tick.timestamp < open.timestamp + self.interval_ms {
            // Same candle
            let mut open = open;
            open.high = open.high.max(tick.price);
            open.low = open.low.min(tick.price);
            open.close = tick.price;
            open.volume += tick.size;
            self.open = Some(open);
            return Vec::new();
        }

        // The open candle is done; everything up to the tick's boundary closes
        let mut completed = Vec::new();
        self.history.push(open.clone());
        completed.push(open);
        completed.extend(self.fill_flat_until(tick_boundary));
        self.open = Some(seed_candle(tick_boundary, tick));
        completed
    }

    /// Push synthetic flat candles after the last finalized candle up to (but
    /// not including) `boundary`, returning the candles added.
    fn fill_flat_until(&mut self, boundary: i64) -> Vec<Candle> {
        let Some(last) = self.history.last() else {
            return Vec::new();
        };
        let prior_close = last.close;
        let mut added = Vec::new();
        let mut ts = last.timestamp + self.interval_ms;
        while ts < boundary {
            let synthetic = flat_candle(ts, prior_close);
            self.history.push(synthetic.clone());
            added.push(synthetic);
            ts += self.interval_ms;
        }
        added
    }
}

fn seed_candle(boundary: i64, tick: &Tick) -> Candle {
    Candle {
        timestamp: boundary,
        open: tick.price,
        high: tick.price,
        low: tick.price,
        close: tick.price,
        volume: tick.size,
    }
}

fn flat_candle(timestamp: i64, price: f64) -> Candle {
    Candle {
        timestamp,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TF: Timeframe = Timeframe::M1;
    const INTERVAL: i64 = 60_000;

    fn tick(price: f64, size: f64, timestamp: i64) -> Tick {
        Tick {
            price,
            size,
            timestamp,
        }
    }

    #[test]
    fn test_first_tick_opens_candle_on_boundary() {
        let mut series = CandleSeries::new(TF);
        assert!(series.open_candle().is_none());

        let completed = series.update(&tick(100.0, 1.0, 15_000));
        assert!(completed.is_empty());

        let open = series.open_candle().unwrap();
        assert_eq!(open.timestamp, 0);
        assert_eq!(open.open, 100.0);
        assert_eq!(open.volume, 1.0);
    }

    #[test]
    fn test_same_candle_folds_ohlcv() {
        // Ticks at t=0, 10s, 20s all land in the same 1m candle
        let mut series = CandleSeries::new(TF);
        series.update(&tick(100.0, 1.0, 0));
        series.update(&tick(105.0, 2.0, 10_000));
        let completed = series.update(&tick(95.0, 3.0, 20_000));

        assert!(completed.is_empty());
        let open = series.open_candle().unwrap();
        assert_eq!(open.open, 100.0);
        assert_eq!(open.high, 105.0);
        assert_eq!(open.low, 95.0);
        assert_eq!(open.close, 95.0);
        assert_eq!(open.volume, 6.0);
    }

    #[test]
    fn test_next_interval_finalizes_exactly_one() {
        let mut series = CandleSeries::new(TF);
        series.update(&tick(100.0, 1.0, 0));
        let completed = series.update(&tick(101.0, 2.0, INTERVAL + 500));

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].timestamp, 0);
        assert_eq!(completed[0].close, 100.0);

        let open = series.open_candle().unwrap();
        assert_eq!(open.timestamp, INTERVAL);
        assert_eq!(open.open, 101.0);
        assert_eq!(open.volume, 2.0);
    }

    #[test]
    fn test_gap_inserts_synthetic_flat_candle() {
        // Tick at the first interval, then a tick two intervals later:
        // exactly one flat filler appears between them.
        let mut series = CandleSeries::new(TF);
        series.update(&tick(100.0, 1.0, 0));
        let completed = series.update(&tick(108.0, 1.0, 2 * INTERVAL + 10_000));

        assert_eq!(completed.len(), 2);
        // Real candle closed at its last traded price
        assert_eq!(completed[0].timestamp, 0);
        assert_eq!(completed[0].close, 100.0);
        // Synthetic filler: flat at prior close, zero volume
        assert_eq!(completed[1].timestamp, INTERVAL);
        assert_eq!(completed[1].open, 100.0);
        assert_eq!(completed[1].high, 100.0);
        assert_eq!(completed[1].low, 100.0);
        assert_eq!(completed[1].close, 100.0);
        assert_eq!(completed[1].volume, 0.0);
        // New open candle seeded from the tick at its aligned boundary
        let open = series.open_candle().unwrap();
        assert_eq!(open.timestamp, 2 * INTERVAL);
        assert_eq!(open.open, 108.0);
    }

    #[test]
    fn test_long_gap_fills_every_skipped_interval() {
        let mut series = CandleSeries::new(TF);
        series.update(&tick(100.0, 1.0, 0));
        let completed = series.update(&tick(110.0, 1.0, 5 * INTERVAL));

        // 1 real + 4 synthetic
        assert_eq!(completed.len(), 5);
        for (i, candle) in completed.iter().enumerate() {
            assert_eq!(candle.timestamp, i as i64 * INTERVAL);
        }
        for synthetic in &completed[1..] {
            assert_eq!(synthetic.close, 100.0);
            assert_eq!(synthetic.volume, 0.0);
        }
        assert_eq!(series.open_candle().unwrap().timestamp, 5 * INTERVAL);
    }

    #[test]
    fn test_out_of_order_tick_dropped() {
        let mut series = CandleSeries::new(TF);
        series.update(&tick(100.0, 1.0, INTERVAL * 2));
        let completed = series.update(&tick(50.0, 1.0, INTERVAL));

        assert!(completed.is_empty());
        let open = series.open_candle().unwrap();
        assert_eq!(open.low, 100.0);
        assert_eq!(open.volume, 1.0);
    }

    #[test]
    fn test_grid_has_no_gaps_or_duplicates() {
        // Strictly increasing tick timestamps produce a gap-free grid with
        // (aligned span / interval) + 1 candles once the open one is counted.
        let mut series = CandleSeries::new(TF);
        let timestamps = [1_000, 20_000, 61_000, 250_000, 251_000, 420_000];
        for (i, ts) in timestamps.iter().enumerate() {
            series.update(&tick(100.0 + i as f64, 1.0, *ts));
        }

        let mut all: Vec<Candle> = series.closed().to_vec();
        all.push(series.open_candle().unwrap().clone());

        let expected = 420_000 / INTERVAL + 1;
        assert_eq!(all.len() as i64, expected);
        for pair in all.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, INTERVAL);
        }
    }

    #[test]
    fn test_backfill_fills_gaps_and_bridges_to_live() {
        let mut series = CandleSeries::new(TF);
        let rest = vec![
            Candle {
                timestamp: 0,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 10.0,
            },
            Candle {
                timestamp: 3 * INTERVAL,
                open: 100.5,
                high: 102.0,
                low: 100.0,
                close: 101.0,
                volume: 8.0,
            },
        ];
        series.backfill(rest);

        // Two REST rows plus two flat fillers in between
        assert_eq!(series.closed().len(), 4);
        assert_eq!(series.closed()[1].close, 100.5);
        assert_eq!(series.closed()[1].volume, 0.0);

        // Live tick one interval past the backfilled history bridges cleanly
        let completed = series.update(&tick(101.5, 1.0, 5 * INTERVAL + 100));
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].timestamp, 4 * INTERVAL);
        assert_eq!(completed[0].close, 101.0);
        assert_eq!(series.open_candle().unwrap().timestamp, 5 * INTERVAL);
    }

    #[test]
    fn test_stale_tick_before_backfilled_history_dropped() {
        let mut series = CandleSeries::new(TF);
        series.backfill(vec![Candle {
            timestamp: 3 * INTERVAL,
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 1.0,
        }]);

        let completed = series.update(&tick(99.0, 1.0, INTERVAL));
        assert!(completed.is_empty());
        assert!(series.open_candle().is_none());
        assert_eq!(series.closed().len(), 1);
    }

    #[test]
    fn test_backfill_ignored_after_live_data() {
        let mut series = CandleSeries::new(TF);
        series.update(&tick(100.0, 1.0, 0));
        series.backfill(vec![flat_candle(0, 50.0)]);
        assert!(series.closed().is_empty());
        assert_eq!(series.open_candle().unwrap().open, 100.0);
    }
}
