use std::collections::HashMap;

use chrono::{Datelike, Timelike};

use crate::config::FeatureConfig;
use crate::error::PipelineError;
use crate::indicator::ema::ema_series;
use crate::indicator::rolling::{rolling_max, rolling_min, rolling_std};
use crate::indicator::rsi::rsi_series;
use crate::indicator::sma::sma_series;
use crate::model::candle::CandleSeries;
use crate::model::feature::{ColumnManifest, FeatureFrame};

/// Turns an ordered candle series into a [`FeatureFrame`] with a next-close
/// target.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    config: FeatureConfig,
    manifest: ColumnManifest,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Self {
        let manifest = ColumnManifest::from_config(&config);
        Self { config, manifest }
    }

    pub fn manifest(&self) -> &ColumnManifest {
        &self.manifest
    }

    /// Rows whose target or any engineered value is undefined are dropped
    /// after every column has been computed, so rolling windows still see the
    /// final candle.
    pub fn transform(&self, series: &CandleSeries) -> Result<FeatureFrame, PipelineError> {
        let candles = series.as_slice();
        let n = candles.len();
        let open: Vec<f64> = candles.iter().map(|c| c.open).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let mut cols: HashMap<String, Vec<f64>> = HashMap::new();

        cols.insert(
            "buy_pressure".into(),
            high.iter().zip(&close).map(|(h, c)| h - c).collect(),
        );
        cols.insert(
            "sell_pressure".into(),
            close.iter().zip(&low).map(|(c, l)| c - l).collect(),
        );

        for &p in &self.config.ma_periods {
            cols.insert(format!("sma_{}", p), sma_series(&close, p));
            cols.insert(format!("ema_{}", p), ema_series(&close, p));
        }

        let window = self.config.support_resistance_window;
        let resistance = rolling_max(&high, window);
        let support = rolling_min(&low, window);
        cols.insert(
            "dist_resistance".into(),
            resistance.iter().zip(&close).map(|(r, c)| r - c).collect(),
        );
        cols.insert(
            "dist_support".into(),
            close.iter().zip(&support).map(|(c, s)| c - s).collect(),
        );
        cols.insert("resistance".into(), resistance);
        cols.insert("support".into(), support);

        let delta: Vec<f64> = (0..n)
            .map(|t| if t == 0 { f64::NAN } else { close[t] - close[t - 1] })
            .collect();
        cols.insert("delta".into(), delta);

        cols.insert(
            format!("rsi_{}", self.config.rsi_period),
            rsi_series(&close, self.config.rsi_period),
        );

        for &p in &self.config.volume_ma_periods {
            cols.insert(format!("volume_sma_{}", p), sma_series(&volume, p));
        }

        let mut hour = Vec::with_capacity(n);
        let mut minute = Vec::with_capacity(n);
        let mut day_of_week = Vec::with_capacity(n);
        for c in candles {
            match c.datetime() {
                Some(dt) => {
                    hour.push(dt.hour() as f64);
                    minute.push(dt.minute() as f64);
                    day_of_week.push(dt.weekday().num_days_from_monday() as f64);
                }
                None => {
                    hour.push(f64::NAN);
                    minute.push(f64::NAN);
                    day_of_week.push(f64::NAN);
                }
            }
        }
        cols.insert("hour".into(), hour);
        cols.insert("minute".into(), minute);
        cols.insert("day_of_week".into(), day_of_week);

        let returns: Vec<f64> = (0..n)
            .map(|t| if t == 0 { 0.0 } else { close[t] / close[t - 1] - 1.0 })
            .collect();
        let volatility: Vec<f64> = rolling_std(&returns, self.config.volatility_window)
            .into_iter()
            .map(|v| if v.is_nan() { 0.0 } else { v })
            .collect();
        cols.insert("return".into(), returns);
        cols.insert("volatility".into(), volatility);

        cols.insert("open".into(), open);
        cols.insert("high".into(), high);
        cols.insert("low".into(), low);
        cols.insert("volume".into(), volume);
        cols.insert("close".into(), close.clone());

        let target: Vec<f64> = (0..n)
            .map(|t| close.get(t + 1).copied().unwrap_or(f64::NAN))
            .collect();

        let mut columns = Vec::with_capacity(self.manifest.len());
        for spec in &self.manifest.columns {
            let col = cols.remove(&spec.name).ok_or_else(|| {
                PipelineError::MissingRequiredColumn {
                    file: "feature engine".to_string(),
                    column: spec.name.clone(),
                }
            })?;
            columns.push(col);
        }

        let mut frame = FeatureFrame {
            manifest: self.manifest.clone(),
            times: candles.iter().map(|c| c.time).collect(),
            columns,
            target,
        };

        let mask: Vec<bool> = (0..n)
            .map(|t| !frame.target[t].is_nan() && frame.columns.iter().all(|col| !col[t].is_nan()))
            .collect();
        frame.retain_rows(&mask);
        tracing::info!(
            candles = n,
            rows = frame.len(),
            dropped = n - frame.len(),
            columns = frame.manifest.len(),
            manifest_version = frame.manifest.version,
            "Feature transform finished"
        );

        if frame.is_empty() {
            return Err(PipelineError::EmptyInputAfterFiltering {
                stage: "transform".to_string(),
            });
        }
        Ok(frame)
    }
}
