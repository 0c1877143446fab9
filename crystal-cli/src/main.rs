use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use crystal_core::{TierOutcome, run_database};

mod config;

use config::{ConfigLoader, RawDurations, RawExtractConfig};

#[derive(Parser)]
#[command(
    name = "crystal",
    about = "Extract stratified clause-usefulness training data from a solver database"
)]
#[command(version)]
struct Cli {
    /// SQLite database written by an instrumented solver run
    files: Vec<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log every SQL statement
    #[arg(long)]
    sql: bool,

    /// Also write CSV files
    #[arg(long)]
    csv: bool,

    /// Rows per tier; -1 takes every row
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Top percentage of non-zero labels forming the upper stratum
    #[arg(long)]
    cut1: Option<f64>,

    /// Top percentage of non-zero labels where the middle stratum ends
    #[arg(long)]
    cut2: Option<f64>,

    /// Keep existing indexes instead of recreating them
    #[arg(long)]
    noind: bool,

    /// Window of the short tier, in conflicts
    #[arg(long)]
    short: Option<u64>,

    /// Window of the long tier, in conflicts
    #[arg(long)]
    long: Option<u64>,

    /// Seed of the random row order
    #[arg(long)]
    seed: Option<u64>,

    /// Extra TOML config file, applied after user and project config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the written datasets
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

impl Cli {
    /// Flags as a config layer; unset flags leave lower layers alone.
    fn overrides(&self) -> RawExtractConfig {
        RawExtractConfig {
            limit: self.limit,
            cut1: self.cut1,
            cut2: self.cut2,
            seed: self.seed,
            csv: self.csv.then_some(true),
            dump_sql: self.sql.then_some(true),
            recreate_indexes: self.noind.then_some(false),
            output_dir: self.out_dir.clone(),
            durations: RawDurations {
                short: self.short,
                long: self.long,
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let [file] = cli.files.as_slice() else {
        eprintln!("ERROR: You must give exactly one file");
        std::process::exit(-1);
    };

    let config = ConfigLoader::load(cli.config.as_deref(), cli.overrides())?;
    config.validate()?;

    let outcomes = run_database(file, &config)?;
    for outcome in &outcomes {
        match outcome {
            TierOutcome::Written { tier, dat, rows, .. } => {
                println!("{:<12} {:>8} rows  {}", tier, rows, dat.display());
            }
            TierOutcome::Skipped { tier, reason } => {
                println!("{:<12} skipped  {}", tier, reason);
            }
        }
    }
    Ok(())
}
