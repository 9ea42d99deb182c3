use crate::error::PipelineError;
use crate::indicator::rolling::mean_and_population_std;
use crate::model::feature::{FeatureFrame, NormPolicy};

/// One lookback window after per-window normalization.
///
/// `values` is row-major: `values[row * features + col]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWindow {
    pub start_time: i64,
    pub lookback: usize,
    pub features: usize,
    pub values: Vec<f64>,
    pub target: f64,
}

impl NormalizedWindow {
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.features + col]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.lookback).map(|r| self.value(r, col)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SequenceSet {
    pub windows: Vec<NormalizedWindow>,
    /// Windows considered before validity filtering: `rows - lookback`.
    pub candidates: usize,
    pub discarded_raw: usize,
    pub discarded_normalized: usize,
}

impl SequenceSet {
    pub fn discarded(&self) -> usize {
        self.discarded_raw + self.discarded_normalized
    }
}

/// Rescale one column of one window in place of `out`.
pub fn normalize_column(policy: NormPolicy, raw: &[f64], out: &mut Vec<f64>) {
    out.clear();
    match policy {
        NormPolicy::Range => {
            let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
            let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let denom = if max > min { max - min } else { 1.0 };
            out.extend(raw.iter().map(|x| (x - min) / denom));
        }
        NormPolicy::Distribution => {
            // Rounding in the mean leaves a tiny nonzero std for constant
            // columns, so test the raw values instead.
            let constant = raw.windows(2).all(|w| w[0] == w[1]);
            let (mean, std) = mean_and_population_std(raw);
            if constant || std == 0.0 {
                out.extend(raw.iter().map(|_| f64::NAN));
            } else {
                out.extend(raw.iter().map(|x| (x - mean) / std));
            }
        }
        NormPolicy::PassThrough => out.extend_from_slice(raw),
        NormPolicy::Fixed(scale) => out.extend(raw.iter().map(|x| x / scale as f64)),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SequenceBuilder {
    lookback: usize,
}

impl SequenceBuilder {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback > 0, "lookback must be > 0");
        Self { lookback }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Slide a `lookback`-row window over the frame. The label of the window
    /// starting at `i` is the close right after its last row, carried by the
    /// frame as `target[i + lookback - 1]`. That is `close[i + lookback]`, the
    /// very next bar, not the bar after it.
    pub fn build(&self, frame: &FeatureFrame) -> SequenceSet {
        let l = self.lookback;
        let width = frame.manifest.len();
        let candidates = frame.len().saturating_sub(l);
        let mut set = SequenceSet {
            windows: Vec::with_capacity(candidates),
            candidates,
            ..SequenceSet::default()
        };
        let mut scratch = Vec::with_capacity(l);

        for i in 0..candidates {
            let target = frame.target[i + l - 1];
            if let Err(e) = check_raw(frame, i, l, target) {
                tracing::debug!(error = %e, "Discarding window");
                set.discarded_raw += 1;
                continue;
            }

            let mut values = vec![0.0; l * width];
            let mut finite = true;
            for (col, spec) in frame.manifest.columns.iter().enumerate() {
                normalize_column(spec.policy, &frame.columns[col][i..i + l], &mut scratch);
                for (row, v) in scratch.iter().enumerate() {
                    finite &= v.is_finite();
                    values[row * width + col] = *v;
                }
                if !finite {
                    let e = PipelineError::InvalidWindow {
                        start_time: frame.times[i],
                        column: spec.name.clone(),
                    };
                    tracing::debug!(error = %e, "Discarding window after normalization");
                    break;
                }
            }
            if !finite {
                set.discarded_normalized += 1;
                continue;
            }

            set.windows.push(NormalizedWindow {
                start_time: frame.times[i],
                lookback: l,
                features: width,
                values,
                target,
            });
        }

        tracing::info!(
            lookback = l,
            candidates,
            kept = set.windows.len(),
            discarded_raw = set.discarded_raw,
            discarded_normalized = set.discarded_normalized,
            "Sequences built"
        );
        set
    }
}

fn check_raw(frame: &FeatureFrame, start: usize, len: usize, target: f64) -> Result<(), PipelineError> {
    let invalid = |column: &str| PipelineError::InvalidWindow {
        start_time: frame.times[start],
        column: column.to_string(),
    };
    if !target.is_finite() {
        return Err(invalid("target"));
    }
    for (col, spec) in frame.manifest.columns.iter().enumerate() {
        if frame.columns[col][start..start + len].iter().any(|v| !v.is_finite()) {
            return Err(invalid(&spec.name));
        }
    }
    Ok(())
}
