use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;

/// Bumped whenever column names, order or policies change incompatibly.
pub const MANIFEST_VERSION: u32 = 1;

/// How a column is rescaled inside each lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormPolicy {
    /// `(x - min) / (max - min)` using the window's own extremes.
    Range,
    /// z-score using the window's own mean and standard deviation.
    Distribution,
    /// Already bounded, left as is.
    PassThrough,
    /// Divided by a global constant.
    Fixed(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub policy: NormPolicy,
}

impl ColumnSpec {
    fn new(name: impl Into<String>, policy: NormPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }
}

/// Ordered feature columns produced by the feature engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnManifest {
    pub version: u32,
    pub columns: Vec<ColumnSpec>,
}

impl ColumnManifest {
    pub fn from_config(cfg: &FeatureConfig) -> Self {
        use NormPolicy::*;

        let mut columns = vec![
            ColumnSpec::new("open", Range),
            ColumnSpec::new("high", Range),
            ColumnSpec::new("low", Range),
            ColumnSpec::new("close", Range),
            ColumnSpec::new("buy_pressure", Range),
            ColumnSpec::new("sell_pressure", Range),
            ColumnSpec::new("delta", Range),
            ColumnSpec::new("resistance", Range),
            ColumnSpec::new("support", Range),
            ColumnSpec::new("dist_resistance", Range),
            ColumnSpec::new("dist_support", Range),
        ];
        for p in &cfg.ma_periods {
            columns.push(ColumnSpec::new(format!("sma_{}", p), Range));
            columns.push(ColumnSpec::new(format!("ema_{}", p), Range));
        }
        columns.push(ColumnSpec::new("volume", Distribution));
        for p in &cfg.volume_ma_periods {
            columns.push(ColumnSpec::new(format!("volume_sma_{}", p), Distribution));
        }
        columns.push(ColumnSpec::new("return", Distribution));
        columns.push(ColumnSpec::new("volatility", Distribution));
        columns.push(ColumnSpec::new(format!("rsi_{}", cfg.rsi_period), PassThrough));
        columns.push(ColumnSpec::new("hour", Fixed(23)));
        columns.push(ColumnSpec::new("minute", Fixed(59)));
        columns.push(ColumnSpec::new("day_of_week", Fixed(6)));

        Self {
            version: MANIFEST_VERSION,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// One row of a [`FeatureFrame`], copied out column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub time: i64,
    pub values: Vec<f64>,
    pub target: f64,
}

/// Column-oriented feature table. `columns[j]` follows `manifest.columns[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub manifest: ColumnManifest,
    pub times: Vec<i64>,
    pub columns: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl FeatureFrame {
    pub fn empty(manifest: ColumnManifest) -> Self {
        let columns = vec![Vec::new(); manifest.len()];
        Self {
            manifest,
            times: Vec::new(),
            columns,
            target: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.manifest
            .index_of(name)
            .map(|idx| self.columns[idx].as_slice())
    }

    pub fn row(&self, i: usize) -> FeatureRow {
        FeatureRow {
            time: self.times[i],
            values: self.columns.iter().map(|col| col[i]).collect(),
            target: self.target[i],
        }
    }

    pub fn push_row(&mut self, row: FeatureRow) {
        debug_assert_eq!(row.values.len(), self.columns.len());
        self.times.push(row.time);
        for (col, v) in self.columns.iter_mut().zip(row.values) {
            col.push(v);
        }
        self.target.push(row.target);
    }

    /// Keep only rows whose mask entry is true.
    pub fn retain_rows(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.len());
        let keep = |values: &mut Vec<f64>| {
            let mut it = mask.iter();
            values.retain(|_| *it.next().unwrap_or(&false));
        };
        for col in &mut self.columns {
            keep(col);
        }
        keep(&mut self.target);
        let mut it = mask.iter();
        self.times.retain(|_| *it.next().unwrap_or(&false));
    }
}
