use serde_json::Value;

use crate::error::PipelineError;
use crate::model::candle::Candle;

use super::CandleSource;

/// Binance caps `/api/v3/klines` at this many bars per request.
pub const BINANCE_MAX_KLINES: usize = 1000;

#[derive(Debug, serde::Deserialize)]
struct BinanceApiErrorResponse {
    code: i64,
    msg: String,
}

/// Spot kline history over the public REST API. No credentials required.
pub struct BinanceKlineSource {
    http: reqwest::Client,
    base_url: String,
    connected: bool,
}

impl BinanceKlineSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Map a bar duration to a Binance kline interval label.
pub fn binance_interval(bar_seconds: u64) -> Option<&'static str> {
    Some(match bar_seconds {
        1 => "1s",
        60 => "1m",
        180 => "3m",
        300 => "5m",
        900 => "15m",
        1_800 => "30m",
        3_600 => "1h",
        7_200 => "2h",
        14_400 => "4h",
        21_600 => "6h",
        28_800 => "8h",
        43_200 => "12h",
        86_400 => "1d",
        259_200 => "3d",
        604_800 => "1w",
        _ => return None,
    })
}

fn field_f64(row: &[Value], idx: usize) -> Option<f64> {
    match row.get(idx)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parse the array-of-arrays kline payload. Rows that do not parse are skipped.
pub fn parse_klines(payload: &Value) -> Vec<Candle> {
    let Some(rows) = payload.as_array() else {
        return Vec::new();
    };
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array() else {
            continue;
        };
        let Some(open_time_ms) = row.first().and_then(Value::as_i64) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            field_f64(row, 1),
            field_f64(row, 2),
            field_f64(row, 3),
            field_f64(row, 4),
            field_f64(row, 5),
        ) else {
            tracing::warn!(open_time_ms, "Skipping malformed kline row");
            continue;
        };
        candles.push(Candle {
            time: open_time_ms.div_euclid(1000),
            open,
            high,
            low,
            close,
            volume,
        });
    }
    candles
}

impl CandleSource for BinanceKlineSource {
    async fn connect(&mut self) -> Result<(), PipelineError> {
        let url = format!("{}/api/v3/ping", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {}", url, e)))?;
        self.connected = true;
        tracing::info!(base_url = %self.base_url, "Connected to Binance REST");
        Ok(())
    }

    async fn get_page(
        &mut self,
        instrument: &str,
        bar_seconds: u64,
        count: usize,
        reference_time: i64,
    ) -> Result<Vec<Candle>, PipelineError> {
        if !self.connected {
            return Err(PipelineError::SourceUnavailable(
                "get_page called before connect".to_string(),
            ));
        }
        let interval = binance_interval(bar_seconds).ok_or_else(|| {
            PipelineError::Config(format!(
                "bar duration {}s has no Binance kline interval",
                bar_seconds
            ))
        })?;
        let limit = count.clamp(1, BINANCE_MAX_KLINES).to_string();
        let end_time_ms = reference_time.saturating_mul(1000).to_string();
        let url = format!("{}/api/v3/klines", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", instrument),
                ("interval", interval),
                ("limit", limit.as_str()),
                ("endTime", end_time_ms.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<BinanceApiErrorResponse>(&body) {
                return Err(PipelineError::BinanceApi {
                    code: err.code,
                    msg: err.msg,
                });
            }
            return Err(PipelineError::SourceUnavailable(format!(
                "kline request failed: {}",
                body
            )));
        }

        let payload: Value = resp.json().await?;
        let candles = parse_klines(&payload);
        tracing::debug!(
            instrument,
            interval,
            requested = count,
            received = candles.len(),
            reference_time,
            "Fetched kline page"
        );
        Ok(candles)
    }

    fn disconnect(&mut self) {
        if self.connected {
            tracing::info!(base_url = %self.base_url, "Disconnected from Binance REST");
        }
        self.connected = false;
    }
}
