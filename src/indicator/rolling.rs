//! Rolling window statistics over whole series.
//!
//! Every function accepts partial windows at the start of the series: the
//! value at index `t` is computed over `values[t+1-window.min(t+1)..=t]`.

use std::collections::VecDeque;

fn rolling_extremum(values: &[f64], window: usize, keep_back: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    assert!(window > 0, "rolling window must be > 0");
    let mut out = Vec::with_capacity(values.len());
    // Indices whose values are monotonic from front (current extremum) to back.
    let mut deque: VecDeque<usize> = VecDeque::with_capacity(window);
    for (t, &v) in values.iter().enumerate() {
        while let Some(&back) = deque.back() {
            if keep_back(values[back], v) {
                break;
            }
            deque.pop_back();
        }
        deque.push_back(t);
        while let Some(&front) = deque.front() {
            if front + window <= t {
                deque.pop_front();
            } else {
                break;
            }
        }
        out.push(deque.front().map(|&i| values[i]).unwrap_or(f64::NAN));
    }
    out
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_extremum(values, window, |back, new| back > new)
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_extremum(values, window, |back, new| back < new)
}

/// Sample standard deviation (n - 1 denominator). Windows holding a single
/// observation yield NaN.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    assert!(window > 0, "rolling window must be > 0");
    (0..values.len())
        .map(|t| {
            let start = (t + 1).saturating_sub(window);
            sample_std(&values[start..=t])
        })
        .collect()
}

pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n as f64 - 1.0)).sqrt()
}

/// Mean and population standard deviation (n denominator).
pub fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_max_tracks_expiring_peak() {
        let v = [1.0, 5.0, 2.0, 3.0, 1.0, 0.5];
        assert_eq!(rolling_max(&v, 3), vec![1.0, 5.0, 5.0, 5.0, 3.0, 3.0]);
    }

    #[test]
    fn rolling_min_tracks_expiring_trough() {
        let v = [4.0, 1.0, 3.0, 5.0, 6.0, 2.0];
        assert_eq!(rolling_min(&v, 2), vec![4.0, 1.0, 1.0, 3.0, 5.0, 2.0]);
    }

    #[test]
    fn rolling_std_matches_sample_definition() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let s = rolling_std(&v, 8);
        assert!(s[0].is_nan());
        // Sample std of the full set: sqrt(32 / 7).
        assert!((s[7] - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }
}
