use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("candle source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("candle source returned no data for {instrument} before reference time {reference_time}")]
    NoDataReturned {
        instrument: String,
        reference_time: i64,
    },

    #[error("{file}: no time column found (expected one of time/timestamp/from/datetime)")]
    MissingTimeColumn { file: String },

    #[error("{file}: required column '{column}' is missing")]
    MissingRequiredColumn { file: String, column: String },

    #[error("window starting at {start_time} contains a non-finite value in '{column}'")]
    InvalidWindow { start_time: i64, column: String },

    #[error("{stage}: no usable rows left after filtering")]
    EmptyInputAfterFiltering { stage: String },

    #[error("{kind} artifact version {version} already exists")]
    VersionExists { kind: String, version: String },

    #[error("{file}: written with column manifest v{found}, expected v{expected}")]
    ManifestMismatch {
        file: String,
        found: u32,
        expected: u32,
    },

    #[error("binance API error (code {code}): {msg}")]
    BinanceApi { code: i64, msg: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
