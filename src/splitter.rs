use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::indicator::rolling::mean_and_population_std;
use crate::sequence::NormalizedWindow;

/// Standardizes targets as `(y - mean) / scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetScaler {
    pub mean: f64,
    pub scale: f64,
}

impl TargetScaler {
    /// Fit on training targets only. A zero standard deviation becomes a
    /// scale of 1 so constant targets transform to 0.
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let (mean, std) = mean_and_population_std(values);
        let scale = if std == 0.0 { 1.0 } else { std };
        Some(Self { mean, scale })
    }

    pub fn transform(&self, y: f64) -> f64 {
        (y - self.mean) / self.scale
    }

    pub fn inverse_transform(&self, z: f64) -> f64 {
        z * self.scale + self.mean
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|y| self.transform(*y)).collect()
    }

    pub fn inverse_transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|z| self.inverse_transform(*z)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    /// Index of the first test window in the original ordering.
    pub boundary: usize,
    pub train: Vec<NormalizedWindow>,
    pub test: Vec<NormalizedWindow>,
    pub y_train: Vec<f64>,
    pub y_test: Vec<f64>,
    /// Unscaled test targets, for error reporting in price units.
    pub y_test_raw: Vec<f64>,
    pub scaler: TargetScaler,
}

/// Chronological split: the first `floor(n * (1 - test_fraction))` windows
/// train, the rest test. Never shuffles.
pub fn split(windows: Vec<NormalizedWindow>, test_fraction: f64) -> Result<Split, PipelineError> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(PipelineError::Config(format!(
            "test fraction must lie in [0, 1), got {}",
            test_fraction
        )));
    }
    let n = windows.len();
    let boundary = (n as f64 * (1.0 - test_fraction)).floor() as usize;

    let mut train = windows;
    let test = train.split_off(boundary.min(n));

    let y_train_raw: Vec<f64> = train.iter().map(|w| w.target).collect();
    let y_test_raw: Vec<f64> = test.iter().map(|w| w.target).collect();
    let scaler = TargetScaler::fit(&y_train_raw).ok_or_else(|| {
        PipelineError::EmptyInputAfterFiltering {
            stage: "split".to_string(),
        }
    })?;

    tracing::info!(
        windows = n,
        boundary,
        train = train.len(),
        test = test.len(),
        target_mean = scaler.mean,
        target_scale = scaler.scale,
        "Chronological split"
    );

    Ok(Split {
        boundary,
        y_train: scaler.transform_all(&y_train_raw),
        y_test: scaler.transform_all(&y_test_raw),
        y_test_raw,
        train,
        test,
        scaler,
    })
}
