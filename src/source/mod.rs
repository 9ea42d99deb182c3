pub mod binance;

use crate::error::PipelineError;
use crate::model::candle::Candle;

/// Paginated supplier of historical candles.
///
/// `get_page` returns up to `count` bars whose open time is at or before
/// `reference_time` (unix seconds), most recent last. An empty page means the
/// source has nothing older to give.
#[allow(async_fn_in_trait)]
pub trait CandleSource {
    async fn connect(&mut self) -> Result<(), PipelineError>;

    async fn get_page(
        &mut self,
        instrument: &str,
        bar_seconds: u64,
        count: usize,
        reference_time: i64,
    ) -> Result<Vec<Candle>, PipelineError>;

    fn disconnect(&mut self);
}

/// Connected source. Disconnects when dropped, whichever way the caller exits.
pub struct SourceSession<'a, S: CandleSource> {
    source: &'a mut S,
}

impl<'a, S: CandleSource> SourceSession<'a, S> {
    pub async fn open(source: &'a mut S) -> Result<Self, PipelineError> {
        source.connect().await?;
        Ok(Self { source })
    }

    pub async fn get_page(
        &mut self,
        instrument: &str,
        bar_seconds: u64,
        count: usize,
        reference_time: i64,
    ) -> Result<Vec<Candle>, PipelineError> {
        self.source
            .get_page(instrument, bar_seconds, count, reference_time)
            .await
    }
}

impl<S: CandleSource> Drop for SourceSession<'_, S> {
    fn drop(&mut self) {
        self.source.disconnect();
        tracing::debug!("Candle source session released");
    }
}
