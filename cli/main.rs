#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use hospcast::evaluate::config::RunConfig;
use hospcast::evaluate::data::load_state_series;
use hospcast::evaluate::report::write_reports;
use hospcast::evaluate::runner::run_states;
use hospcast::forecast::pipeline::ModelFamily;

#[derive(Args)]
pub struct RunArgs {
    /// Path to the weekly TSV with state, date, hospitalization and optional wastewater columns
    pub input: PathBuf,

    /// Run configuration (.toml); defaults are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory receiving errors_<family>.tsv and exclusions.tsv
    #[arg(long, default_value = "hospcast_out")]
    pub output_dir: PathBuf,

    /// Model families to evaluate (hosp, hosp_ww, naive); all when omitted
    #[arg(long = "family", value_name = "FAMILY")]
    pub families: Vec<ModelFamily>,
}

#[derive(Parser)]
#[command(
    name = "hospcast",
    about = "Rolling-origin evaluation of wastewater-informed hospitalization forecasts",
    long_about = "Trains rolling-origin quantile regressions per state, forecasts a few weeks \
                 ahead, and compares one-step errors of hospitalization-only, \
                 hospitalization-plus-wastewater and naive forecasts."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every state in the input table
    Run(RunArgs),

    /// Write the default configuration to a TOML file
    InitConfig {
        /// Destination path for the configuration file
        path: PathBuf,
    },
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from '{}'", path.display());
            RunConfig::load(path)?
        }
        None => RunConfig::default(),
    };
    let families = if args.families.is_empty() {
        ModelFamily::ALL.to_vec()
    } else {
        args.families
    };

    let states = load_state_series(&args.input)?;
    let runs = run_states(&states, &families, &config)?;
    write_reports(&runs, &args.output_dir)?;
    Ok(())
}

fn init_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    RunConfig::default().save(&path)?;
    log::info!("Wrote default configuration to '{}'", path.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::InitConfig { path }) => init_config(path),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
