use std::time::Duration;

use crate::error::PipelineError;
use crate::model::candle::{Candle, CandleSeries};
use crate::source::{CandleSource, SourceSession};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub pages_requested: usize,
    pub candles_received: usize,
    pub duplicates_dropped: usize,
    pub open_bars_dropped: usize,
    /// A page came back empty before the requested total was reached.
    pub exhausted: bool,
}

/// Walks a [`CandleSource`] backward in time, page by page.
#[derive(Debug, Clone)]
pub struct CandleFetcher {
    page_size: usize,
    timeout: Option<Duration>,
}

impl Default for CandleFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl CandleFetcher {
    pub fn new(page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be > 0");
        Self {
            page_size,
            timeout: None,
        }
    }

    /// Bound the whole network exchange. Expiry surfaces as `SourceUnavailable`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn fetch<S: CandleSource>(
        &self,
        source: &mut S,
        instrument: &str,
        bar_seconds: u64,
        total_count: usize,
        reference_time: i64,
    ) -> Result<CandleSeries, PipelineError> {
        let (series, report) = self
            .fetch_with_report(source, instrument, bar_seconds, total_count, reference_time)
            .await?;
        tracing::info!(
            instrument,
            bar_seconds,
            total_count,
            pages = report.pages_requested,
            received = report.candles_received,
            duplicates = report.duplicates_dropped,
            open_bars = report.open_bars_dropped,
            exhausted = report.exhausted,
            kept = series.len(),
            "Candle fetch finished"
        );
        Ok(series)
    }

    /// Fetch up to `total_count` bars ending at `reference_time` (unix seconds,
    /// normally "now"). Bars whose close time lies after `reference_time` are
    /// still forming and are dropped.
    pub async fn fetch_with_report<S: CandleSource>(
        &self,
        source: &mut S,
        instrument: &str,
        bar_seconds: u64,
        total_count: usize,
        reference_time: i64,
    ) -> Result<(CandleSeries, FetchReport), PipelineError> {
        let paging = self.collect_pages(source, instrument, bar_seconds, total_count, reference_time);
        let (acquired, mut report) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, paging).await.map_err(|_| {
                PipelineError::SourceUnavailable(format!(
                    "candle fetch for {} timed out after {:?}",
                    instrument, limit
                ))
            })??,
            None => paging.await?,
        };

        report.candles_received = acquired.len();
        let mut series = CandleSeries::from_unsorted(acquired);
        report.duplicates_dropped = report.candles_received - series.len();
        report.open_bars_dropped = series.retain_closed(bar_seconds, reference_time);
        Ok((series, report))
    }

    async fn collect_pages<S: CandleSource>(
        &self,
        source: &mut S,
        instrument: &str,
        bar_seconds: u64,
        total_count: usize,
        reference_time: i64,
    ) -> Result<(Vec<Candle>, FetchReport), PipelineError> {
        let mut session = SourceSession::open(source).await?;
        let mut report = FetchReport::default();
        let mut acquired: Vec<Candle> = Vec::with_capacity(total_count);
        let mut remaining = total_count;
        let mut reference = reference_time;
        let mut oldest: Option<i64> = None;

        while remaining > 0 {
            let count = remaining.min(self.page_size);
            let page = session
                .get_page(instrument, bar_seconds, count, reference)
                .await?;
            report.pages_requested += 1;

            if page.is_empty() {
                let condition = PipelineError::NoDataReturned {
                    instrument: instrument.to_string(),
                    reference_time: reference,
                };
                tracing::warn!(
                    remaining,
                    acquired = acquired.len(),
                    "{}; continuing with what was fetched",
                    condition
                );
                report.exhausted = true;
                break;
            }

            if let Some(page_oldest) = page.iter().map(|c| c.time).min() {
                oldest = Some(oldest.map_or(page_oldest, |o| o.min(page_oldest)));
            }
            acquired.extend(page);
            remaining -= count;
            if let Some(o) = oldest {
                reference = o - 1;
            }
        }

        Ok((acquired, report))
    }
}
