mod batch;
mod logging;

use anyhow::{Context, Result};
use batch::BatchConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use verhulst_core::Scenario;

#[derive(Debug, Parser)]
#[command(name = "verhulst", version, about = "Bifurcation diagrams of coupled population recurrences")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Size of the rayon worker pool. Defaults to one thread per core.
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render one diagram described by a JSON scenario file.
    Render {
        scenario: PathBuf,

        /// Output PNG path. Defaults to a name derived from the diagram.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render columns on the worker pool.
        #[arg(long)]
        parallel: bool,
    },
    /// Render one shard of a fertility sweep as numbered frames.
    Batch {
        /// Shard index handled by this process.
        #[arg(long, alias = "core", default_value_t = 0)]
        shard: usize,
        #[arg(long, default_value_t = 8)]
        shards: usize,
        #[arg(long, default_value_t = 800)]
        frames: usize,
        #[arg(long, default_value_t = 2.5)]
        start: f64,
        #[arg(long, default_value_t = 4.0)]
        end: f64,
        #[arg(long, default_value_t = 0.3)]
        power: f64,
        #[arg(long, default_value_t = 600)]
        iterations: usize,
        #[arg(long, default_value_t = 3840)]
        width: u32,
        #[arg(long, default_value_t = 2160)]
        height: u32,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        y_min: f64,
        #[arg(long, default_value_t = 4.0, allow_negative_numbers = true)]
        y_max: f64,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, default_value = "soo")]
        prefix: String,
        /// Render frames on the worker pool.
        #[arg(long)]
        parallel: bool,
    },
}

fn render(scenario: PathBuf, output: Option<PathBuf>, parallel: bool) -> Result<()> {
    let scenario = Scenario::load(&scenario)?;
    let mut diagram = scenario
        .build()
        .context("Scenario describes an invalid diagram")?;
    if parallel {
        let settings = verhulst_core::RenderSettings {
            parallel: true,
            ..*diagram.settings()
        };
        diagram = diagram.with_settings(settings);
    }
    let path = output.unwrap_or_else(|| PathBuf::from(diagram.file_name()));
    info!(diagram = %diagram, path = %path.display(), "rendering");

    let outcome = diagram.save(&path)?;
    info!(
        plotted = outcome.plotted,
        out_of_range = outcome.out_of_range,
        path = %path.display(),
        "saved"
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the worker pool")?;
    }

    match cli.command {
        Command::Render {
            scenario,
            output,
            parallel,
        } => render(scenario, output, parallel),
        Command::Batch {
            shard,
            shards,
            frames,
            start,
            end,
            power,
            iterations,
            width,
            height,
            y_min,
            y_max,
            out_dir,
            prefix,
            parallel,
        } => batch::run(&BatchConfig {
            frames,
            shards,
            shard,
            start,
            end,
            power,
            iterations,
            width,
            height,
            y_min,
            y_max,
            out_dir,
            prefix,
            parallel,
        }),
    }
}
