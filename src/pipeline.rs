//! Stage runners. Each stage reads the previous stage's persisted output, so
//! the pipeline can be resumed at any boundary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::artifact_store::{Artifact, ArrayStats, ArtifactKind, ArtifactStore, PreparedArrays};
use crate::config::Config;
use crate::dataset_files::{read_candles, read_frame, write_candles, write_frame};
use crate::error::PipelineError;
use crate::features::FeatureEngine;
use crate::fetcher::{CandleFetcher, FetchReport};
use crate::merger::merge;
use crate::sequence::SequenceBuilder;
use crate::source::CandleSource;
use crate::splitter::split;

#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub raw_path: PathBuf,
    pub existing: usize,
    pub fetched: usize,
    pub merged: usize,
    pub report: FetchReport,
}

#[derive(Debug, Clone)]
pub struct TransformSummary {
    pub version: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone)]
pub struct PrepareSummary {
    pub version: String,
    pub source_version: String,
    pub candidates: usize,
    pub discarded: usize,
    pub train_shape: (usize, usize, usize),
    pub test_shape: (usize, usize, usize),
    pub target_mean: f64,
    pub target_scale: f64,
    pub array_stats: [(&'static str, ArrayStats); 5],
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fetch: FetchSummary,
    pub transform: TransformSummary,
    pub prepare: PrepareSummary,
}

/// Fetch the configured history ending at `now` and merge it into the raw
/// candle file.
pub async fn fetch_stage<S: CandleSource>(
    config: &Config,
    source: &mut S,
    now: i64,
) -> Result<FetchSummary> {
    let raw_path = config.raw_candle_path()?;
    let bar_seconds = config.source.bar_seconds()?;
    let total = config.source.total_bars()?;
    let instrument = config.source.instrument_key();

    let existing = read_candles(&raw_path)
        .with_context(|| format!("fetch stage: failed to read {}", raw_path.display()))?;

    tracing::info!(
        instrument = %instrument,
        bar_seconds,
        total,
        existing = existing.len(),
        "Fetching candles"
    );
    let fetcher = CandleFetcher::new(config.source.page_size)
        .with_timeout(Duration::from_secs(config.source.timeout_secs));
    let (incoming, report) = fetcher
        .fetch_with_report(source, &instrument, bar_seconds, total, now)
        .await
        .with_context(|| format!("fetch stage: {} {}s", instrument, bar_seconds))?;

    let mut merged = merge(&existing, &incoming);
    let stale_open = merged.retain_closed(bar_seconds, now);
    if stale_open > 0 {
        tracing::warn!(stale_open, "Dropped persisted bars that are not closed yet");
    }
    write_candles(&raw_path, &merged)
        .with_context(|| format!("fetch stage: failed to write {}", raw_path.display()))?;

    let summary = FetchSummary {
        raw_path,
        existing: existing.len(),
        fetched: incoming.len(),
        merged: merged.len(),
        report,
    };
    tracing::info!(
        path = %summary.raw_path.display(),
        existing = summary.existing,
        fetched = summary.fetched,
        merged = summary.merged,
        "Fetch stage finished"
    );
    Ok(summary)
}

/// Engineer features from the raw candle file and register a new transformed
/// version.
pub fn transform_stage(config: &Config, store: &mut ArtifactStore) -> Result<TransformSummary> {
    let raw_path = config.raw_candle_path()?;
    let series = read_candles(&raw_path)
        .with_context(|| format!("transform stage: failed to read {}", raw_path.display()))?;
    if series.is_empty() {
        bail!(
            "transform stage: {} holds no candles, run the fetch stage first",
            raw_path.display()
        );
    }

    let engine = FeatureEngine::new(config.features.clone());
    let frame = engine
        .transform(&series)
        .with_context(|| format!("transform stage: {}", raw_path.display()))?;

    let version = store.next_version(ArtifactKind::Transformed)?;
    let stem = raw_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.source.instrument_key());
    let path = config
        .transformed_dir()
        .join(format!("{}_transformed_{}.csv", stem, version));
    write_frame(&path, &frame)
        .with_context(|| format!("transform stage: failed to write {}", path.display()))?;
    store.register_transformed(&version, &path, frame.manifest.version)?;

    Ok(TransformSummary {
        version,
        path,
        rows: frame.len(),
        columns: frame.manifest.len(),
    })
}

/// Window, normalize, split and persist the latest transformed version.
pub fn prepare_stage(config: &Config, store: &mut ArtifactStore) -> Result<PrepareSummary> {
    let Some(Artifact::Transformed(transformed)) = store.load_latest(ArtifactKind::Transformed)?
    else {
        bail!("prepare stage: no transformed artifact registered, run the transform stage first");
    };

    let engine = FeatureEngine::new(config.features.clone());
    let manifest = engine.manifest();
    if transformed.manifest_version != manifest.version {
        return Err(PipelineError::ManifestMismatch {
            file: transformed.path.display().to_string(),
            found: transformed.manifest_version,
            expected: manifest.version,
        }
        .into());
    }
    let frame = read_frame(&transformed.path, manifest)
        .with_context(|| format!("prepare stage: {}", transformed.path.display()))?;

    let builder = SequenceBuilder::new(config.sequence.lookback);
    let set = builder.build(&frame);
    if set.windows.is_empty() {
        return Err(PipelineError::EmptyInputAfterFiltering {
            stage: format!("prepare ({})", transformed.path.display()),
        }
        .into());
    }
    let candidates = set.candidates;
    let discarded = set.discarded();

    let split = split(set.windows, config.sequence.test_fraction)
        .with_context(|| format!("prepare stage: {}", transformed.path.display()))?;
    let arrays = PreparedArrays::from_split(&split, builder.lookback(), manifest.len());

    let version = store.next_version(ArtifactKind::Prepared)?;
    store.save(&version, &arrays, &split.scaler, manifest.version)?;

    let summary = PrepareSummary {
        version,
        source_version: transformed.version,
        candidates,
        discarded,
        train_shape: arrays.train_shape(),
        test_shape: arrays.test_shape(),
        target_mean: split.scaler.mean,
        target_scale: split.scaler.scale,
        array_stats: arrays.stats(),
    };
    for (name, s) in &summary.array_stats {
        tracing::info!(
            version = %summary.version,
            array = *name,
            len = s.len,
            min = s.min as f64,
            max = s.max as f64,
            mean = s.mean,
            non_finite = s.non_finite,
            "Prepared array stats"
        );
        if s.non_finite > 0 {
            tracing::warn!(array = *name, non_finite = s.non_finite, "Prepared array holds non-finite values");
        }
    }
    tracing::info!(
        version = %summary.version,
        source_version = %summary.source_version,
        candidates,
        discarded,
        train = ?summary.train_shape,
        test = ?summary.test_shape,
        "Prepare stage finished"
    );
    Ok(summary)
}

pub async fn run_all<S: CandleSource>(
    config: &Config,
    source: &mut S,
    now: i64,
) -> Result<RunSummary> {
    let fetch = fetch_stage(config, source, now).await?;
    let mut store = ArtifactStore::open(&config.storage.root)?;
    let transform = transform_stage(config, &mut store)?;
    let prepare = prepare_stage(config, &mut store)?;
    Ok(RunSummary {
        fetch,
        transform,
        prepare,
    })
}
