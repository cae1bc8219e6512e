//! bounded per-pin history: two parallel series, oldest first

use crate::domain::Timestamp;
use serde::Serialize;
use std::collections::VecDeque;

/// default number of samples kept per (device, pin)
pub const MAX_HISTORY_POINTS: usize = 20;

/// sliding window of (timestamp, celsius) samples for one device/pin
///
/// `timestamps` and `temperatures` always have the same length. pushes keep
/// the length at or below the cap; a seeded buffer may start above it and is
/// trimmed back on its next push.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistoryBuffer {
    timestamps: VecDeque<Timestamp>,
    temperatures: VecDeque<f64>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// seed from a full series as-is, no cap applied
    pub fn seeded<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = (Timestamp, f64)>,
    {
        let (timestamps, temperatures) = samples.into_iter().unzip();
        Self {
            timestamps,
            temperatures,
        }
    }

    /// append one sample, evicting from the front until `len() <= cap`
    pub fn push(&mut self, timestamp: Timestamp, temperature: f64, cap: usize) {
        self.timestamps.push_back(timestamp);
        self.temperatures.push_back(temperature);
        while self.timestamps.len() > cap {
            self.timestamps.pop_front();
            self.temperatures.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> impl ExactSizeIterator<Item = Timestamp> + '_ {
        self.timestamps.iter().copied()
    }

    pub fn temperatures(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.temperatures.iter().copied()
    }

    /// (timestamp, celsius) pairs, oldest first
    pub fn samples(&self) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        self.timestamps().zip(self.temperatures())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_holds_after_every_push() {
        let mut buf = HistoryBuffer::new();
        for n in 1..=45i64 {
            buf.push(n, n as f64 * 0.5, MAX_HISTORY_POINTS);
            let expected = (n as usize).min(MAX_HISTORY_POINTS);
            assert_eq!(buf.len(), expected);
            assert_eq!(buf.timestamps().len(), buf.temperatures().len());
        }
    }

    #[test]
    fn test_fifo_keeps_most_recent() {
        let mut buf = HistoryBuffer::new();
        let n = 33i64;
        for i in 1..=n {
            buf.push(i, i as f64, MAX_HISTORY_POINTS);
        }
        let ts: Vec<_> = buf.timestamps().collect();
        assert_eq!(ts.first(), Some(&(n - 19)));
        assert_eq!(ts.last(), Some(&n));
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
        let temps: Vec<_> = buf.temperatures().collect();
        assert_eq!(temps[0], (n - 19) as f64);
    }

    #[test]
    fn test_seeded_is_not_capped() {
        let buf = HistoryBuffer::seeded((0..30).map(|i| (i, i as f64)));
        assert_eq!(buf.len(), 30);
    }

    #[test]
    fn test_oversized_seed_trimmed_on_push() {
        let mut buf = HistoryBuffer::seeded((0..30).map(|i| (i, i as f64)));
        buf.push(30, 30.0, MAX_HISTORY_POINTS);
        assert_eq!(buf.len(), MAX_HISTORY_POINTS);
        assert_eq!(buf.timestamps().next(), Some(11));
        assert_eq!(buf.samples().last(), Some((30, 30.0)));
    }
}
