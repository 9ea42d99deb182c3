use std::time::Duration;

use candle_sequencer::error::PipelineError;
use candle_sequencer::fetcher::CandleFetcher;
use candle_sequencer::model::candle::Candle;
use candle_sequencer::source::CandleSource;

const BAR: u64 = 300;
// Aligned to a 5 minute boundary, so the bar opening at NOW is still forming.
const NOW: i64 = 1_700_000_100;

/// Serves synthetic bars back to `earliest`, records every request.
#[derive(Default)]
struct ScriptedSource {
    earliest: i64,
    fail_connect: bool,
    fail_on_request: Option<usize>,
    delay: Option<Duration>,
    requests: Vec<(usize, i64)>,
    connects: usize,
    disconnects: usize,
}

impl ScriptedSource {
    fn unlimited() -> Self {
        Self {
            earliest: i64::MIN,
            ..Self::default()
        }
    }
}

fn candle_at(time: i64) -> Candle {
    let px = 100.0 + (time / BAR as i64 % 17) as f64;
    Candle {
        time,
        open: px,
        high: px + 1.0,
        low: px - 1.0,
        close: px + 0.5,
        volume: 10.0,
    }
}

impl CandleSource for ScriptedSource {
    async fn connect(&mut self) -> Result<(), PipelineError> {
        self.connects += 1;
        if self.fail_connect {
            return Err(PipelineError::SourceUnavailable("scripted refusal".into()));
        }
        Ok(())
    }

    async fn get_page(
        &mut self,
        _instrument: &str,
        bar_seconds: u64,
        count: usize,
        reference_time: i64,
    ) -> Result<Vec<Candle>, PipelineError> {
        self.requests.push((count, reference_time));
        if self.fail_on_request == Some(self.requests.len()) {
            return Err(PipelineError::SourceUnavailable("scripted outage".into()));
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let bar = bar_seconds as i64;
        let last = reference_time - reference_time.rem_euclid(bar);
        let mut page: Vec<Candle> = (0..count as i64)
            .map(|k| last - k * bar)
            .filter(|t| *t >= self.earliest)
            .map(candle_at)
            .collect();
        page.reverse();
        Ok(page)
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

#[test]
/// Verifies paging: 2500 bars with a 1000 bar page size take three requests
/// of 1000, 1000 and 500, each ending one second before the previous oldest.
fn fetch_pages_backward_in_fixed_chunks() {
    let mut source = ScriptedSource::unlimited();
    let fetcher = CandleFetcher::new(1000);

    let (series, report) = tokio_test::block_on(fetcher.fetch_with_report(
        &mut source,
        "ETHUSDT",
        BAR,
        2500,
        NOW,
    ))
    .expect("fetch should succeed");

    let counts: Vec<usize> = source.requests.iter().map(|(c, _)| *c).collect();
    assert_eq!(counts, vec![1000, 1000, 500]);

    let first_oldest = NOW - 999 * BAR as i64;
    let second_oldest = first_oldest - 1000 * BAR as i64;
    let references: Vec<i64> = source.requests.iter().map(|(_, r)| *r).collect();
    assert_eq!(references, vec![NOW, first_oldest - 1, second_oldest - 1]);

    assert_eq!(report.pages_requested, 3);
    assert_eq!(report.candles_received, 2500);
    assert_eq!(report.duplicates_dropped, 0);
    assert_eq!(report.open_bars_dropped, 1);
    assert!(!report.exhausted);
    assert_eq!(series.len(), 2499);
    assert!(series.is_strictly_ascending());
}

#[test]
/// Verifies the bar still forming at the reference time never reaches the
/// output, while the previous bar (closing exactly at the reference) does.
fn fetch_drops_open_bar() {
    let mut source = ScriptedSource::unlimited();
    let fetcher = CandleFetcher::new(1000);

    let series = tokio_test::block_on(fetcher.fetch(&mut source, "ETHUSDT", BAR, 10, NOW))
        .expect("fetch should succeed");

    let last = series.last().expect("series should not be empty");
    assert_eq!(last.time, NOW - BAR as i64);
    assert!(series.iter().all(|c| c.close_time(BAR) <= NOW));
}

#[test]
/// Verifies exhaustion: once the source answers with an empty page the fetch
/// stops and returns what it already has.
fn fetch_stops_on_empty_page() {
    let mut source = ScriptedSource {
        earliest: NOW - 1199 * BAR as i64,
        ..ScriptedSource::default()
    };
    let fetcher = CandleFetcher::new(1000);

    let (series, report) = tokio_test::block_on(fetcher.fetch_with_report(
        &mut source,
        "ETHUSDT",
        BAR,
        2500,
        NOW,
    ))
    .expect("exhaustion is not an error");

    assert_eq!(source.requests.len(), 3);
    assert!(report.exhausted);
    assert_eq!(report.candles_received, 1200);
    assert_eq!(series.len(), 1199);
    assert_eq!(series.first().map(|c| c.time), Some(source.earliest));
}

#[test]
/// Verifies a refused connection surfaces as SourceUnavailable without any
/// page request.
fn fetch_fails_when_source_refuses_connection() {
    let mut source = ScriptedSource {
        fail_connect: true,
        ..ScriptedSource::unlimited()
    };
    let fetcher = CandleFetcher::default();

    let err = tokio_test::block_on(fetcher.fetch(&mut source, "ETHUSDT", BAR, 100, NOW))
        .expect_err("connect failure must propagate");

    assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    assert!(source.requests.is_empty());
    assert_eq!(source.disconnects, 0);
}

#[test]
/// Verifies the session is released exactly once on both the success path and
/// a mid-fetch failure.
fn fetch_always_disconnects_after_connecting() {
    let fetcher = CandleFetcher::new(1000);

    let mut ok_source = ScriptedSource::unlimited();
    tokio_test::block_on(fetcher.fetch(&mut ok_source, "ETHUSDT", BAR, 1500, NOW))
        .expect("fetch should succeed");
    assert_eq!(ok_source.connects, 1);
    assert_eq!(ok_source.disconnects, 1);

    let mut failing = ScriptedSource {
        fail_on_request: Some(2),
        ..ScriptedSource::unlimited()
    };
    let err = tokio_test::block_on(fetcher.fetch(&mut failing, "ETHUSDT", BAR, 1500, NOW))
        .expect_err("second page fails");
    assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    assert_eq!(failing.connects, 1);
    assert_eq!(failing.disconnects, 1);
}

#[test]
/// Verifies a stalled source is cut off by the fetch timeout and still
/// disconnected.
fn fetch_times_out_on_stalled_source() {
    let mut source = ScriptedSource {
        delay: Some(Duration::from_secs(30)),
        ..ScriptedSource::unlimited()
    };
    let fetcher = CandleFetcher::new(1000).with_timeout(Duration::from_millis(20));

    let err = tokio_test::block_on(fetcher.fetch(&mut source, "ETHUSDT", BAR, 10, NOW))
        .expect_err("stalled fetch must time out");

    assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    assert_eq!(source.disconnects, 1);
}
