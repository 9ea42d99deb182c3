use anyhow::{bail, Result};

use candle_sequencer::artifact_store::ArtifactStore;
use candle_sequencer::config::Config;
use candle_sequencer::pipeline::{fetch_stage, prepare_stage, run_all, transform_stage};
use candle_sequencer::source::binance::BinanceKlineSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fetch,
    Transform,
    Prepare,
    All,
}

impl Stage {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg.unwrap_or("all") {
            "fetch" => Ok(Stage::Fetch),
            "transform" => Ok(Stage::Transform),
            "prepare" => Ok(Stage::Prepare),
            "all" => Ok(Stage::All),
            other => bail!("unknown stage '{}' (expected fetch, transform, prepare or all)", other),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23 needs a process-wide provider before reqwest builds a client.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let stage = match Stage::parse(std::env::args().nth(1).as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(2);
        }
    };

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set SEQ_CONFIG_PATH or provide config/default.toml");
            std::process::exit(1);
        }
    };

    let log_file = std::fs::File::create(&config.logging.file)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.logging.level.as_str())
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    tracing::info!(
        instrument = %config.source.instrument_key(),
        bar_interval = %config.source.bar_interval,
        history_days = config.source.history_days,
        stage = ?stage,
        "Starting candle-sequencer"
    );

    let now = chrono::Utc::now().timestamp();
    let result = match stage {
        Stage::Fetch => {
            let mut source = BinanceKlineSource::new(&config.source.rest_base_url);
            fetch_stage(&config, &mut source, now).await.map(|s| {
                println!(
                    "fetched {} candles, {} stored in {}",
                    s.fetched,
                    s.merged,
                    s.raw_path.display()
                );
            })
        }
        Stage::Transform => {
            let mut store = ArtifactStore::open(&config.storage.root)?;
            transform_stage(&config, &mut store).map(|s| {
                println!(
                    "transformed version {}: {} rows x {} columns -> {}",
                    s.version,
                    s.rows,
                    s.columns,
                    s.path.display()
                );
            })
        }
        Stage::Prepare => {
            let mut store = ArtifactStore::open(&config.storage.root)?;
            prepare_stage(&config, &mut store).map(|s| {
                println!(
                    "prepared version {}: train {:?}, test {:?}, {} windows discarded",
                    s.version, s.train_shape, s.test_shape, s.discarded
                );
            })
        }
        Stage::All => {
            let mut source = BinanceKlineSource::new(&config.source.rest_base_url);
            run_all(&config, &mut source, now).await.map(|s| {
                println!(
                    "stored {} candles, transformed {}, prepared {}: train {:?}, test {:?}",
                    s.fetch.merged,
                    s.transform.version,
                    s.prepare.version,
                    s.prepare.train_shape,
                    s.prepare.test_shape
                );
            })
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %format!("{:#}", e), "Pipeline failed");
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
    tracing::info!("candle-sequencer finished");
    Ok(())
}
