use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use dapce::dataset;
use dapce::error::{DapError, Result};
use dapce::print;
use dapce::settings::Settings;

#[derive(Parser)]
#[command(name = "dapce", about = "Evaluate DAP constraint expressions against a dataset", version)]
struct Cli {
    /// JSON dataset description (falls back to the configured dataset)
    #[arg(long, short = 'd')]
    dataset: Option<PathBuf>,

    /// Constraint expression
    #[arg(long, short = 'k', default_value = "")]
    constraint: String,

    /// Print the constrained DDS before the values
    #[arg(long)]
    dds: bool,

    /// Path to settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn init_tracing(settings: &Settings, verbose: bool) {
    // RUST_LOG wins; otherwise --verbose, then the configured filter
    let fallback = if verbose { "debug".to_string() } else { settings.log_filter.clone() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli, settings: &Settings) -> Result<String> {
    let path = cli
        .dataset
        .clone()
        .or_else(|| settings.dataset.as_ref().map(PathBuf::from))
        .ok_or_else(|| DapError::Config("no dataset given (use --dataset or set `dataset')".into()))?;
    let mut dds = dataset::load_file(&path)?;
    let name = dds.filename().to_string();
    dds.parse_constraint(&cli.constraint)?;

    let mut out = String::new();
    if dds.functional_expression() {
        if let Some(result) = dds.eval_function(&name)? {
            if let Some(var) = dds.variable(&result) {
                print::write_value(&mut out, var, None);
            }
        }
        return Ok(out);
    }
    if cli.dds || settings.print_dds {
        out.push_str(&dds.print_declarations(true));
    }
    out.push_str(&dds.print_values(&name)?);
    info!(dataset = %name, "request complete");
    Ok(out)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings, cli.verbose);
    match run(&cli, &settings) {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            warn!(kind = ?e.kind(), "request failed");
            eprintln!("{:?}: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}
