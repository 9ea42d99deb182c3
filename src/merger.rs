use crate::model::candle::CandleSeries;

/// Union of persisted and freshly fetched candles keyed by timestamp.
///
/// When both sides carry the same timestamp the incoming bar wins: it was
/// read after the bar closed, the persisted one may have been provisional.
pub fn merge(existing: &CandleSeries, incoming: &CandleSeries) -> CandleSeries {
    let merged = CandleSeries::from_unsorted(
        existing
            .iter()
            .chain(incoming.iter())
            .copied()
            .collect(),
    );
    tracing::debug!(
        existing = existing.len(),
        incoming = incoming.len(),
        merged = merged.len(),
        added = merged.len() - existing.len(),
        "Merged candle series"
    );
    merged
}
