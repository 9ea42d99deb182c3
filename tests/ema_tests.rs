use candle_sequencer::indicator::ema::{ema_series, Ema};

#[test]
fn seeded_with_first_value() {
    let mut ema = Ema::new(3);
    // alpha = 2 / (3 + 1) = 0.5
    assert!((ema.push(2.0) - 2.0).abs() < f64::EPSILON);
    assert!((ema.push(4.0) - 3.0).abs() < f64::EPSILON);
    assert!((ema.push(8.0) - 5.5).abs() < f64::EPSILON);
}

#[test]
fn single_period_tracks_input() {
    let mut ema = Ema::new(1);
    assert!((ema.push(42.0) - 42.0).abs() < f64::EPSILON);
    assert!((ema.push(99.0) - 99.0).abs() < f64::EPSILON);
}

#[test]
fn value_without_push() {
    let mut ema = Ema::new(2);
    assert_eq!(ema.value(), None);
    ema.push(10.0);
    assert_eq!(ema.value(), Some(10.0));
}

#[test]
fn constant_series_stays_constant() {
    let out = ema_series(&[7.0; 50], 20);
    assert!(out.iter().all(|v| (v - 7.0).abs() < 1e-12));
}

#[test]
#[should_panic(expected = "EMA period must be > 0")]
fn zero_period_panics() {
    Ema::new(0);
}
