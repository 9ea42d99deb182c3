//! CSV files for the raw candle and transformed feature stages.

use std::path::Path;

use chrono::DateTime;
use csv::StringRecord;

use crate::error::PipelineError;
use crate::model::candle::{Candle, CandleSeries};
use crate::model::feature::{ColumnManifest, FeatureFrame, FeatureRow};

/// Accepted names for the timestamp column, in lookup order.
pub const TIME_COLUMNS: [&str; 4] = ["time", "timestamp", "from", "datetime"];

const CANDLE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

const CANDLE_HEADER: [&str; 6] = ["time", "open", "high", "low", "close", "volume"];

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn time_column(headers: &StringRecord, path: &Path) -> Result<usize, PipelineError> {
    TIME_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        .ok_or_else(|| PipelineError::MissingTimeColumn { file: display(path) })
}

fn required_column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize, PipelineError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| PipelineError::MissingRequiredColumn {
            file: display(path),
            column: name.to_string(),
        })
}

/// Unix seconds, unix milliseconds, or an RFC 3339 instant.
pub fn parse_time(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        // Anything past year 2286 in seconds is taken as milliseconds.
        return Some(if n.abs() >= 10_000_000_000 { n.div_euclid(1000) } else { n });
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z"))
        .ok()
        .map(|dt| dt.timestamp())
}

fn parse_value(record: &StringRecord, idx: usize) -> f64 {
    record
        .get(idx)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn malformed(path: &Path, line: usize, what: &str) -> PipelineError {
    PipelineError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{}:{}: {}", display(path), line, what),
    ))
}

/// Write to a sibling temp file, then rename over `path`. Callers write their
/// own header record so empty tables still carry one.
fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut csv::Writer<std::fs::File>) -> Result<(), PipelineError>,
) -> Result<(), PipelineError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("csv.tmp");
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp)?;
    write(&mut writer)?;
    writer.flush()?;
    drop(writer);
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn write_candles(path: &Path, series: &CandleSeries) -> Result<(), PipelineError> {
    write_atomically(path, |w| {
        w.write_record(CANDLE_HEADER)?;
        for c in series {
            w.serialize(c)?;
        }
        Ok(())
    })?;
    tracing::info!(path = %path.display(), rows = series.len(), "Raw candles written");
    Ok(())
}

/// A missing or zero-byte file reads as an empty series.
pub fn read_candles(path: &Path) -> Result<CandleSeries, PipelineError> {
    if !path.exists() || std::fs::metadata(path)?.len() == 0 {
        return Ok(CandleSeries::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let time_idx = time_column(&headers, path)?;
    let idx: Vec<usize> = CANDLE_COLUMNS
        .iter()
        .map(|name| required_column(&headers, name, path))
        .collect::<Result<_, _>>()?;

    let mut candles = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let time = record
            .get(time_idx)
            .and_then(parse_time)
            .ok_or_else(|| malformed(path, line + 2, "unparseable time"))?;
        candles.push(Candle {
            time,
            open: parse_value(&record, idx[0]),
            high: parse_value(&record, idx[1]),
            low: parse_value(&record, idx[2]),
            close: parse_value(&record, idx[3]),
            volume: parse_value(&record, idx[4]),
        });
    }
    Ok(CandleSeries::from_unsorted(candles))
}

pub fn write_frame(path: &Path, frame: &FeatureFrame) -> Result<(), PipelineError> {
    write_atomically(path, |w| {
        let mut header = vec!["time".to_string()];
        header.extend(frame.manifest.names().map(str::to_string));
        header.push("target".to_string());
        w.write_record(&header)?;

        for i in 0..frame.len() {
            let row = frame.row(i);
            let mut record = Vec::with_capacity(header.len());
            record.push(row.time.to_string());
            record.extend(row.values.iter().map(|v| v.to_string()));
            record.push(row.target.to_string());
            w.write_record(&record)?;
        }
        Ok(())
    })?;
    tracing::info!(
        path = %path.display(),
        rows = frame.len(),
        columns = frame.manifest.len(),
        "Feature frame written"
    );
    Ok(())
}

/// Read a transformed file back into the column order of `manifest`.
/// Extra columns are ignored; rows are re-sorted by time if needed.
pub fn read_frame(path: &Path, manifest: &ColumnManifest) -> Result<FeatureFrame, PipelineError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let time_idx = time_column(&headers, path)?;
    let col_idx: Vec<usize> = manifest
        .names()
        .map(|name| required_column(&headers, name, path))
        .collect::<Result<_, _>>()?;
    let target_idx = required_column(&headers, "target", path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let time = record
            .get(time_idx)
            .and_then(parse_time)
            .ok_or_else(|| malformed(path, line + 2, "unparseable time"))?;
        rows.push(FeatureRow {
            time,
            values: col_idx.iter().map(|&j| parse_value(&record, j)).collect(),
            target: parse_value(&record, target_idx),
        });
    }
    rows.sort_by_key(|r| r.time);

    let mut frame = FeatureFrame::empty(manifest.clone());
    for row in rows {
        frame.push_row(row);
    }
    Ok(frame)
}
