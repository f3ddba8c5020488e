use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueHint};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tc_config::{ConfigLayering, LayeredConfig, RunConfig};
use tc_distributor::{
    build_distributor, optimize_slice, AffineDenormalizer, LossTerms, SliceFile,
};
use tc_metrics::JsonlSummaryWriter;
use tracing::info;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Trains the trigger-cell phi distributor on one R/z slice"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the optimisation loop for the configured slice
    Train(TrainArgs),

    /// Print the merged run configuration and the keys each layer changed
    ShowConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML base configuration
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// JSON run overrides merged on top of the base configuration
    #[arg(long, value_hint = ValueHint::FilePath)]
    run: Option<PathBuf>,
}

impl ConfigArgs {
    fn layering(&self) -> ConfigLayering {
        let layering = ConfigLayering::default().with_base(&self.config);
        match &self.run {
            Some(run) => layering.with_run(run),
            None => layering,
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// JSON file holding the per-slice values, bins and boundary sizes
    #[arg(long, value_hint = ValueHint::FilePath)]
    slices: PathBuf,

    /// Override the configured number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Restore the latest checkpoint before the first step
    #[arg(long)]
    pretrained: bool,

    /// Write the run summary as JSON to this path instead of STDOUT
    #[arg(long, value_hint = ValueHint::FilePath)]
    summary_out: Option<PathBuf>,
}

#[derive(Serialize)]
struct SummaryReport {
    slice: usize,
    epochs: usize,
    checkpoints_written: usize,
    final_losses: Option<LossTerms>,
    final_total: Option<f32>,
    events: PathBuf,
}

fn train(args: TrainArgs) -> Result<()> {
    let mut config = RunConfig::load(args.config.layering()).context("loading run configuration")?;
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if args.pretrained {
        config.pretrained = true;
    }

    let slices = SliceFile::load(&args.slices)
        .with_context(|| format!("reading slices from {}", args.slices.display()))?;
    let slice = slices
        .slice(config.chosen_layer)
        .context("selecting the configured slice")?;

    let mut distributor = build_distributor(&config, slice).context("building distributor")?;
    let postprocess = AffineDenormalizer::from_phi_bounds(config.phi_bounds());
    let mut writer = JsonlSummaryWriter::create_in(&config.log_dir)
        .with_context(|| format!("creating summary log under {}", config.log_dir.display()))?;
    info!(
        slice = config.chosen_layer,
        cells = slice.values.len(),
        epochs = config.epochs,
        "starting optimisation"
    );

    let summary = optimize_slice(
        &mut distributor,
        &postprocess,
        &mut writer,
        config.epochs,
        config.checkpoint_every,
    )
    .with_context(|| format!("optimising slice {}", config.chosen_layer))?;

    let report = SummaryReport {
        slice: config.chosen_layer,
        epochs: summary.epochs,
        checkpoints_written: summary.checkpoints_written,
        final_total: summary.final_losses.map(|terms| terms.total()),
        final_losses: summary.final_losses,
        events: writer.path().to_path_buf(),
    };
    let json = serde_json::to_string_pretty(&report)?;
    match args.summary_out {
        Some(path) => fs::write(&path, json)
            .with_context(|| format!("writing summary to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn show_config(args: ConfigArgs) -> Result<()> {
    let layered = LayeredConfig::load(args.layering()).context("loading configuration layers")?;
    let config: RunConfig = layered.deserialize().context("decoding run configuration")?;
    config.validate().context("validating run configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    for change in layered.changes() {
        eprintln!(
            "{:?} {}: {} -> {}",
            change.layer,
            change.path,
            change
                .previous
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |v| v.to_string()),
            change
                .current
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |v| v.to_string()),
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    tc_config::tracing::init_tracing().context("initialising tracing")?;
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Train(args) => train(args),
        Command::ShowConfig(args) => show_config(args),
    };
    tc_config::tracing::flush_chrome_trace();
    result
}
