use candle_sequencer::config::FeatureConfig;
use candle_sequencer::error::PipelineError;
use candle_sequencer::features::FeatureEngine;
use candle_sequencer::model::candle::{Candle, CandleSeries};
use candle_sequencer::model::feature::{ColumnManifest, NormPolicy};

// 2024-01-01T00:00:00Z, a Monday.
const BASE: i64 = 1_704_067_200;
const BAR: i64 = 300;

fn small_config() -> FeatureConfig {
    FeatureConfig {
        ma_periods: vec![2, 3],
        volume_ma_periods: vec![2],
        support_resistance_window: 3,
        rsi_period: 3,
        volatility_window: 3,
    }
}

fn candles(closes: &[f64]) -> CandleSeries {
    CandleSeries::from_unsorted(
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Candle {
                time: BASE + i as i64 * BAR,
                open: *c,
                high: c + 1.0,
                low: c - 1.0,
                close: *c,
                volume: (i + 1) as f64,
            })
            .collect(),
    )
}

fn value(frame: &candle_sequencer::model::feature::FeatureFrame, col: &str, row: usize) -> f64 {
    frame.column(col).unwrap_or_else(|| panic!("missing column {}", col))[row]
}

#[test]
/// Verifies the first row (no previous close) and the last row (no next
/// close) are dropped, and every kept row is labelled with the next close.
fn transform_drops_edges_and_labels_next_close() {
    let engine = FeatureEngine::new(small_config());
    let frame = engine
        .transform(&candles(&[10.0, 12.0, 11.0, 13.0, 14.0, 15.0]))
        .expect("transform should succeed");

    assert_eq!(frame.len(), 4);
    assert_eq!(frame.times[0], BASE + BAR);
    assert_eq!(frame.target, vec![11.0, 13.0, 14.0, 15.0]);
    assert_eq!(frame.manifest.len(), 23);
    assert!(frame.columns.iter().all(|c| c.len() == 4));
}

#[test]
/// Verifies price-derived columns on hand-computed values.
fn price_features_match_hand_computation() {
    let engine = FeatureEngine::new(small_config());
    let frame = engine
        .transform(&candles(&[10.0, 12.0, 11.0, 13.0, 14.0, 15.0]))
        .expect("transform should succeed");

    assert!((value(&frame, "delta", 0) - 2.0).abs() < 1e-12);
    assert!((value(&frame, "buy_pressure", 0) - 1.0).abs() < 1e-12);
    assert!((value(&frame, "sell_pressure", 0) - 1.0).abs() < 1e-12);
    assert!((value(&frame, "sma_2", 0) - 11.0).abs() < 1e-12);
    assert!((value(&frame, "ema_2", 0) - 34.0 / 3.0).abs() < 1e-12);

    // Row 1 is the third candle: highs [11, 13, 12], lows [9, 11, 10].
    assert!((value(&frame, "resistance", 1) - 13.0).abs() < 1e-12);
    assert!((value(&frame, "support", 1) - 9.0).abs() < 1e-12);
    assert!((value(&frame, "dist_resistance", 1) - 2.0).abs() < 1e-12);
    assert!((value(&frame, "dist_support", 1) - 2.0).abs() < 1e-12);
    assert!((value(&frame, "volume_sma_2", 1) - 2.5).abs() < 1e-12);
}

#[test]
/// Verifies returns and the rolling sample volatility, whose one-element
/// windows read as zero.
fn return_and_volatility() {
    let engine = FeatureEngine::new(small_config());
    let frame = engine
        .transform(&candles(&[10.0, 12.0, 11.0, 13.0, 14.0, 15.0]))
        .expect("transform should succeed");

    assert!((value(&frame, "return", 0) - 0.2).abs() < 1e-12);
    assert!((value(&frame, "volatility", 0) - 0.02f64.sqrt()).abs() < 1e-12);
}

#[test]
fn calendar_fields_are_raw_utc_components() {
    let engine = FeatureEngine::new(small_config());
    let frame = engine
        .transform(&candles(&[10.0, 12.0, 11.0, 13.0, 14.0, 15.0]))
        .expect("transform should succeed");

    assert_eq!(value(&frame, "hour", 0), 0.0);
    assert_eq!(value(&frame, "minute", 0), 5.0);
    assert_eq!(value(&frame, "minute", 3), 20.0);
    assert_eq!(value(&frame, "day_of_week", 0), 0.0);
}

#[test]
fn rsi_stays_within_bounds() {
    let closes: Vec<f64> = (0..60)
        .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0)
        .collect();
    let engine = FeatureEngine::new(FeatureConfig::default());
    let frame = engine
        .transform(&candles(&closes))
        .expect("transform should succeed");

    let rsi = frame.column("rsi_14").expect("rsi column");
    assert!(rsi.iter().all(|v| (0.0..=100.0).contains(v)));
}

#[test]
/// Verifies the default manifest layout: price columns first, calendar
/// columns last with their fixed divisors.
fn default_manifest_layout() {
    let manifest = ColumnManifest::from_config(&FeatureConfig::default());

    assert_eq!(manifest.len(), 32);
    assert_eq!(manifest.index_of("open"), Some(0));
    assert_eq!(manifest.columns[3].name, "close");
    let last: Vec<(&str, NormPolicy)> = manifest.columns[29..]
        .iter()
        .map(|c| (c.name.as_str(), c.policy))
        .collect();
    assert_eq!(
        last,
        vec![
            ("hour", NormPolicy::Fixed(23)),
            ("minute", NormPolicy::Fixed(59)),
            ("day_of_week", NormPolicy::Fixed(6)),
        ]
    );
    assert_eq!(
        manifest.columns[manifest.index_of("volume").unwrap_or(0)].policy,
        NormPolicy::Distribution
    );
}

#[test]
fn too_few_candles_is_an_error() {
    let engine = FeatureEngine::new(small_config());
    let err = engine
        .transform(&candles(&[10.0, 11.0]))
        .expect_err("two candles leave no labelled row with a delta");
    assert!(matches!(err, PipelineError::EmptyInputAfterFiltering { .. }));
}
