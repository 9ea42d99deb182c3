use candle_sequencer::model::feature::{ColumnManifest, ColumnSpec, FeatureFrame, NormPolicy};
use candle_sequencer::sequence::{normalize_column, SequenceBuilder};

fn manifest(columns: &[(&str, NormPolicy)]) -> ColumnManifest {
    ColumnManifest {
        version: 1,
        columns: columns
            .iter()
            .map(|(name, policy)| ColumnSpec {
                name: name.to_string(),
                policy: *policy,
            })
            .collect(),
    }
}

fn frame(manifest: ColumnManifest, columns: Vec<Vec<f64>>, target: Vec<f64>) -> FeatureFrame {
    let times = (0..target.len() as i64).map(|i| i * 300).collect();
    FeatureFrame {
        manifest,
        times,
        columns,
        target,
    }
}

fn closes_frame() -> FeatureFrame {
    let closes = vec![10.0, 12.0, 11.0, 13.0, 14.0];
    let target = vec![12.0, 11.0, 13.0, 14.0, 15.0];
    frame(
        manifest(&[("close", NormPolicy::Range)]),
        vec![closes],
        target,
    )
}

#[test]
/// Verifies the worked example: five rows with a lookback of three produce two
/// windows, the first scaled to [0, 1, 0.5] and labelled with the close that
/// follows it.
fn closes_produce_two_windows() {
    let set = SequenceBuilder::new(3).build(&closes_frame());

    assert_eq!(set.candidates, 2);
    assert_eq!(set.windows.len(), 2);
    assert_eq!(set.discarded(), 0);

    let first = &set.windows[0];
    assert_eq!(first.column(0), vec![0.0, 1.0, 0.5]);
    assert!((first.target - 13.0).abs() < f64::EPSILON);
    assert!((set.windows[1].target - 14.0).abs() < f64::EPSILON);
    assert_eq!(first.start_time, 0);
    assert_eq!(set.windows[1].start_time, 300);
}

#[test]
/// Verifies windows respect row order: the label of window i never comes from
/// a row inside the window.
fn label_comes_after_window() {
    let set = SequenceBuilder::new(2).build(&closes_frame());
    assert_eq!(set.candidates, 3);
    let targets: Vec<f64> = set.windows.iter().map(|w| w.target).collect();
    assert_eq!(targets, vec![11.0, 13.0, 14.0]);
}

#[test]
fn lookback_longer_than_frame_yields_nothing() {
    let set = SequenceBuilder::new(5).build(&closes_frame());
    assert_eq!(set.candidates, 0);
    assert!(set.windows.is_empty());
}

#[test]
/// Verifies a constant range-normalized column becomes all zeros instead of
/// dividing by zero.
fn constant_range_column_becomes_zero() {
    let mut out = Vec::new();
    normalize_column(NormPolicy::Range, &[7.0, 7.0, 7.0], &mut out);
    assert_eq!(out, vec![0.0, 0.0, 0.0]);
}

#[test]
fn fixed_and_pass_through_policies() {
    let mut out = Vec::new();
    normalize_column(NormPolicy::Fixed(23), &[0.0, 23.0], &mut out);
    assert_eq!(out, vec![0.0, 1.0]);

    normalize_column(NormPolicy::PassThrough, &[42.0, 58.5], &mut out);
    assert_eq!(out, vec![42.0, 58.5]);
}

#[test]
/// Verifies the z-score uses the window's own mean and population deviation.
fn distribution_column_is_standardized() {
    let mut out = Vec::new();
    normalize_column(NormPolicy::Distribution, &[1.0, 2.0, 3.0], &mut out);
    let s = (2.0f64 / 3.0).sqrt();
    let expected = [-1.0 / s, 0.0, 1.0 / s];
    for (a, b) in out.iter().zip(expected) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
/// Verifies a window whose distribution column is constant cannot be
/// standardized and is discarded and counted.
fn constant_volume_window_is_discarded() {
    let m = manifest(&[
        ("close", NormPolicy::Range),
        ("volume", NormPolicy::Distribution),
    ]);
    let closes = vec![10.0, 12.0, 11.0, 13.0, 14.0];
    let volume = vec![5.0, 5.0, 5.0, 6.0, 7.0];
    let target = vec![12.0, 11.0, 13.0, 14.0, 15.0];
    let set = SequenceBuilder::new(3).build(&frame(m, vec![closes, volume], target));

    assert_eq!(set.candidates, 2);
    assert_eq!(set.windows.len(), 1);
    assert_eq!(set.discarded_normalized, 1);
    assert_eq!(set.discarded_raw, 0);
    assert_eq!(set.windows[0].start_time, 300);
    assert!(set.windows[0].values.iter().all(|v| v.is_finite()));
}

#[test]
/// Verifies a non-finite raw value only removes the windows that contain it.
fn non_finite_raw_value_discards_covering_windows() {
    let closes = vec![10.0, f64::NAN, 11.0, 13.0, 14.0, 15.0, 16.0];
    let target = vec![12.0, 11.0, 13.0, 14.0, 15.0, 16.0, 17.0];
    let m = manifest(&[("close", NormPolicy::Range)]);
    let set = SequenceBuilder::new(2).build(&frame(m, vec![closes], target));

    assert_eq!(set.candidates, 5);
    assert_eq!(set.discarded_raw, 2);
    assert_eq!(set.windows.len(), 3);
    assert!(set
        .windows
        .iter()
        .all(|w| w.values.iter().all(|v| v.is_finite()) && w.target.is_finite()));
}

#[test]
#[should_panic(expected = "lookback must be > 0")]
fn zero_lookback_panics() {
    let _ = SequenceBuilder::new(0);
}

#[test]
/// Verifies a long window of a constant that is not exactly representable in
/// binary is still recognized as constant and discarded, rather than being
/// standardized to +-1 by rounding noise.
fn inexact_constant_volume_window_is_discarded() {
    for v in [0.1, 0.7, 3.3, 17.93, 1234.56] {
        let m = manifest(&[("volume", NormPolicy::Distribution)]);
        let target: Vec<f64> = (0..289).map(|i| 100.0 + i as f64).collect();
        let set = SequenceBuilder::new(288).build(&frame(m, vec![vec![v; 289]], target));

        assert_eq!(set.candidates, 1, "value {}", v);
        assert!(set.windows.is_empty(), "value {} produced a window", v);
        assert_eq!(set.discarded_normalized, 1, "value {}", v);
    }

    let mut out = Vec::new();
    normalize_column(NormPolicy::Distribution, &[1234.56; 288], &mut out);
    assert!(out.iter().all(|x| x.is_nan()));
}
