use super::sma::Sma;

/// Relative Strength Index over simple (not Wilder-smoothed) rolling means of
/// gains and losses.
///
/// The first close has no delta, so the first output is NaN. After that the
/// averages use the deltas available so far, up to `period` of them.
#[derive(Debug, Clone)]
pub struct Rsi {
    avg_gain: Sma,
    avg_loss: Sma,
    prev_close: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "RSI period must be > 0");
        Self {
            avg_gain: Sma::new(period),
            avg_loss: Sma::new(period),
            prev_close: None,
        }
    }

    pub fn push(&mut self, close: f64) -> f64 {
        let Some(prev) = self.prev_close.replace(close) else {
            return f64::NAN;
        };
        let delta = close - prev;
        let gain = self.avg_gain.push(delta.max(0.0));
        let loss = self.avg_loss.push((-delta).max(0.0));
        rsi_from_averages(gain, loss)
    }

    pub fn period(&self) -> usize {
        self.avg_gain.period()
    }
}

/// `100 - 100 / (1 + gain / loss)`.
///
/// A zero average loss is resolved explicitly: 100 when there were gains,
/// 50 when the window saw no movement at all.
pub fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut rsi = Rsi::new(period);
    closes.iter().map(|c| rsi.push(*c)).collect()
}
