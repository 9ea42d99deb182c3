/// Simple Moving Average using a ring buffer for O(1) push.
///
/// Before `period` values have been seen the average is taken over the values
/// available so far, so every push yields a value.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    buffer: Vec<f64>,
    head: usize,
    count: usize,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "SMA period must be > 0");
        Self {
            period,
            buffer: vec![0.0; period],
            head: 0,
            count: 0,
            sum: 0.0,
        }
    }

    /// Push a new value and return the (possibly partial) average.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.count >= self.period {
            self.sum -= self.buffer[self.head];
        }
        self.buffer[self.head] = value;
        self.sum += value;
        self.head = (self.head + 1) % self.period;
        if self.count < self.period {
            self.count += 1;
        }
        self.sum / self.count as f64
    }

    pub fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    /// True once a full period has been observed.
    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

/// Rolling SMA over a whole series.
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut sma = Sma::new(period);
    values.iter().map(|v| sma.push(*v)).collect()
}
