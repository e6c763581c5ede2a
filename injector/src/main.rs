use anyhow::Result;
use clap::Parser;
use flarestack_common::{init_tracer, metrics};
use metrics_exporter_prometheus::PrometheusBuilder;
use pseudo_injector::{
    Injector, InjectorConfig, Season, TrialSettings, UnblindedInjector,
    config::{load_catalogue, read_json},
    run_trials,
    storage::DatasetWriter,
};
use std::{net::SocketAddr, path::PathBuf};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// JSON description of the season: name, table paths and time span
    #[clap(long)]
    season: PathBuf,

    /// JSON source catalogue
    #[clap(long)]
    sources: PathBuf,

    /// JSON injector configuration
    #[clap(long)]
    config: PathBuf,

    /// Multiplier applied to every source flux
    #[clap(long, default_value = "1")]
    scale: f64,

    /// Number of datasets to generate
    #[clap(long, default_value = "1")]
    trials: usize,

    /// Seed of the first trial, trial `n` uses `seed + n`
    #[clap(long, default_value = "0")]
    seed: u64,

    /// HDF5 file to write the datasets to
    #[clap(long)]
    output: Option<PathBuf>,

    /// Load the real, unscrambled data. Dataset creation is then refused.
    #[clap(long)]
    unblinded: bool,

    /// Endpoint on which Prometheus text format metrics are available
    #[clap(long, env = "OBSERVABILITY_ADDRESS")]
    observability_address: Option<SocketAddr>,
}

fn main() -> Result<()> {
    init_tracer();

    let args = Cli::parse();
    debug!("Args: {:?}", args);

    if let Some(address) = args.observability_address {
        PrometheusBuilder::new()
            .with_http_listener(address)
            .install()?;
    }
    metrics::component_info_metric("pseudo-injector");
    metrics::describe_injection_metrics();

    let season: Season = read_json(&args.season)?;

    if args.unblinded {
        let mut injector = UnblindedInjector::new(season)?;
        info!(season = %injector.season().name, "Unblinded injector created");
        injector.create_dataset()?;
        return Ok(());
    }

    let sources = load_catalogue(&args.sources)?;
    let config: InjectorConfig = read_json(&args.config)?;
    let injector = Injector::new(season, sources, &config)?;
    info!(season = %injector.season().name, "Injector created");

    let writer = args
        .output
        .as_deref()
        .map(DatasetWriter::create)
        .transpose()?;

    let settings = TrialSettings::new(args.scale, args.trials, args.seed);
    let summary = run_trials(&injector, &settings, |outcome| {
        info!(
            trial = outcome.trial,
            events = outcome.dataset.len(),
            n_signal = outcome.n_signal,
            n_expected = outcome.n_expected,
            "Dataset created"
        );
        if let Some(writer) = &writer {
            writer.write_trial(outcome.trial, outcome.seed, settings.scale, &outcome.dataset)?;
        }
        Ok(())
    })?;

    if let (Some(mean_signal), Some(mean_expected)) =
        (summary.mean_signal(), summary.mean_expected())
    {
        info!(mean_signal, mean_expected, "Summary of {} trials", summary.n_trials);
    }
    if let Some(path) = &args.output {
        info!("Datasets written to {}", path.display());
    }
    Ok(())
}
