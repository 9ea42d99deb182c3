use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    pub sequence: SequenceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub rest_base_url: String,
    pub instrument: String,
    pub bar_interval: String,
    pub history_days: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    pub ma_periods: Vec<usize>,
    pub volume_ma_periods: Vec<usize>,
    pub support_resistance_window: usize,
    pub rsi_period: usize,
    pub volatility_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            ma_periods: vec![5, 10, 20, 50, 100, 200],
            volume_ma_periods: vec![5, 20],
            support_resistance_window: 20,
            rsi_period: 14,
            volatility_window: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequenceConfig {
    pub lookback: usize,
    pub test_fraction: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

fn default_page_size() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_log_file() -> PathBuf {
    PathBuf::from("candle-sequencer.log")
}

/// Parse a bar interval string (e.g. "1s", "1m", "5m", "1h", "1d", "1w") into seconds.
pub fn parse_interval_secs(s: &str) -> Result<u64> {
    if s.len() < 2 {
        bail!("invalid interval '{}': expected format like '5m'", s);
    }

    let (num_str, suffix) = s.split_at(s.len() - 1);
    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid interval '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid interval '{}': quantity must be > 0", s);
    }

    let unit_secs = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 7 * 86_400,
        _ => bail!(
            "invalid interval '{}': unsupported suffix '{}', expected one of s/m/h/d/w",
            s,
            suffix
        ),
    };

    n.checked_mul(unit_secs)
        .with_context(|| format!("invalid interval '{}': value is too large", s))
}

impl SourceConfig {
    pub fn bar_seconds(&self) -> Result<u64> {
        parse_interval_secs(&self.bar_interval)
    }

    /// Number of bars covering `history_days` at the configured bar duration.
    pub fn total_bars(&self) -> Result<usize> {
        let bar = self.bar_seconds()?;
        Ok((self.history_days * 86_400 / bar) as usize)
    }

    pub fn instrument_key(&self) -> String {
        self.instrument.trim().to_ascii_uppercase()
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ma_periods.is_empty() {
            bail!("features.ma_periods must not be empty");
        }
        if self.ma_periods.iter().chain(&self.volume_ma_periods).any(|p| *p == 0) {
            bail!("features: moving-average periods must be > 0");
        }
        if self.support_resistance_window == 0 {
            bail!("features.support_resistance_window must be > 0");
        }
        if self.rsi_period == 0 {
            bail!("features.rsi_period must be > 0");
        }
        if self.volatility_window == 0 {
            bail!("features.volatility_window must be > 0");
        }
        Ok(())
    }
}

impl SequenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback == 0 {
            bail!("sequence.lookback must be > 0");
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            bail!(
                "sequence.test_fraction must lie in (0, 1), got {}",
                self.test_fraction
            );
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("SEQ_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.source
            .bar_seconds()
            .context("source.bar_interval is invalid")?;
        if self.source.instrument_key().is_empty() {
            bail!("source.instrument must not be empty");
        }
        if self.source.page_size == 0 {
            bail!("source.page_size must be > 0");
        }
        if self.source.history_days == 0 {
            bail!("source.history_days must be > 0");
        }
        self.features.validate()?;
        self.sequence.validate()?;
        Ok(())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.storage.root.join("data").join("raw")
    }

    pub fn transformed_dir(&self) -> PathBuf {
        self.storage.root.join("data").join("transformed")
    }

    /// One raw candle file per (instrument, bar duration, day count).
    pub fn raw_candle_path(&self) -> Result<PathBuf> {
        let bar = self.source.bar_seconds()?;
        Ok(self.raw_dir().join(format!(
            "{}_{}s_{}d.csv",
            self.source.instrument_key(),
            bar,
            self.source.history_days
        )))
    }
}
