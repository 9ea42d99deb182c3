/// Exponential Moving Average with `alpha = 2 / (period + 1)`.
///
/// Seeded with the first observed value; there is no SMA warm-up.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: f64,
    ema: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "EMA period must be > 0");
        Self {
            period,
            multiplier: 2.0 / (period as f64 + 1.0),
            ema: None,
        }
    }

    pub fn push(&mut self, value: f64) -> f64 {
        let next = match self.ema {
            Some(prev) => (value - prev) * self.multiplier + prev,
            None => value,
        };
        self.ema = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.ema
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema = Ema::new(period);
    values.iter().map(|v| ema.push(*v)).collect()
}
