use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod pipeline;

#[derive(Parser)]
#[command(version, about = "Convert bank/broker CSV exports to a QIF ledger file")]
struct Cli {
    /// Bank/broker CSV export files to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory holding banks/*.def, bankaccounts.def and categories.csv
    #[arg(short, long, default_value = ".")]
    config_dir: PathBuf,

    /// Output QIF file; defaults to the input's name with a .qif
    /// extension, or out.qif for multiple inputs
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

fn default_output(inputs: &[PathBuf]) -> PathBuf {
    match inputs {
        [single] => single.with_extension("qif"),
        _ => PathBuf::from("out.qif"),
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Bail out before touching the pipeline if any input is missing.
    for input in &cli.inputs {
        if !input.is_file() {
            anyhow::bail!("input file {} does not exist", input.display());
        }
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.inputs));

    pipeline::run(&cli.inputs, &cli.config_dir, &output)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        tracing::error!(error = %e, "conversion failed");
        std::process::exit(1);
    }
}
