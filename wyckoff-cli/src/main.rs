//! Wyckoff CLI: structural event detection over OHLCV partitions.
//!
//! Commands:
//! - `detect`: run the detector over one Parquet/CSV file or one symbol and print events
//! - `run`: process every symbol under the data directory and save the tables
//! - `validate`: run serially and in parallel and check the outputs match
//! - `config`: print the default run config as TOML
//!
//! Logging goes through `env_logger`; set `RUST_LOG=info` (or `debug`) to see it.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use wyckoff_core::domain::{normalize, Bar};
use wyckoff_runner::data_loader::BarSource;
use wyckoff_runner::{
    check_equivalence, process_symbol, run_parallel, run_serial, save_outputs, summarize,
    DataFormat, RunConfig, RunOutput, SymbolResult, SyntheticSource, SUMMARY_WINDOW,
};

#[derive(Parser)]
#[command(
    name = "wyckoff",
    about = "Wyckoff CLI: incremental structural event detector"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detector over a single series and print its events.
    Detect {
        /// A single .parquet or .csv file (date, open, high, low, close, volume).
        #[arg(long, conflicts_with = "symbol")]
        file: Option<PathBuf>,

        /// A symbol partition under --data-dir.
        #[arg(long)]
        symbol: Option<String>,

        /// Path to a TOML run config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory holding symbol=<SYM>/ partitions.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Partitions hold CSV files instead of Parquet.
        #[arg(long, default_value_t = false)]
        csv: bool,

        /// Print the full result as JSON instead of tables.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Process every symbol and save CSV tables plus a manifest.
    Run {
        #[command(flatten)]
        overrides: RunOverrides,

        /// Output directory. Overrides the config file.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Run on the calling thread instead of the worker pool.
        #[arg(long, default_value_t = false)]
        serial: bool,
    },
    /// Run serially and in parallel and check both produce the same tables.
    Validate {
        #[command(flatten)]
        overrides: RunOverrides,

        /// Use N deterministic synthetic symbols instead of the data directory.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Bars per synthetic symbol.
        #[arg(long, default_value_t = 1500)]
        bars: usize,
    },
    /// Print the default run config as TOML.
    Config,
}

#[derive(clap::Args)]
struct RunOverrides {
    /// Path to a TOML run config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory holding symbol=<SYM>/ partitions.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Partitions hold CSV files instead of Parquet.
    #[arg(long, default_value_t = false)]
    csv: bool,

    /// Worker threads for the parallel run.
    #[arg(long)]
    workers: Option<usize>,

    /// Keep only the trailing window of this many days per symbol.
    #[arg(long)]
    lookback_days: Option<u32>,

    /// Process only the first N symbols.
    #[arg(long)]
    limit: Option<usize>,
}

impl RunOverrides {
    fn resolve(&self) -> Result<RunConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if self.csv {
            config.data_format = DataFormat::Csv;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(days) = self.lookback_days {
            config.lookback_days = days;
        }
        if let Some(limit) = self.limit {
            config.symbol_limit = limit;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            file,
            symbol,
            config,
            data_dir,
            csv,
            json,
        } => run_detect(file, symbol, config, data_dir, csv, json),
        Commands::Run {
            overrides,
            output_dir,
            serial,
        } => run_cmd(&overrides, output_dir, serial),
        Commands::Validate {
            overrides,
            synthetic,
            bars,
        } => run_validate(&overrides, synthetic, bars),
        Commands::Config => {
            print!("{}", RunConfig::default().to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(p) => RunConfig::from_file(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(RunConfig::default()),
    }
}

fn run_detect(
    file: Option<PathBuf>,
    symbol: Option<String>,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    csv: bool,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if csv {
        config.data_format = DataFormat::Csv;
    }

    let (name, bars): (String, Vec<Bar>) = match (file, symbol) {
        (Some(path), _) => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "series".into());
            let format = DataFormat::from_path(&path)
                .with_context(|| format!("{} is neither .parquet nor .csv", path.display()))?;
            (name, normalize(format.read_file(&path)?)?)
        }
        (None, Some(sym)) => {
            let bars = config.source().load(&sym)?;
            (sym, bars)
        }
        (None, None) => bail!("one of --file or --symbol is required"),
    };

    let result = process_symbol(&name, &bars, &config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_symbol(&result);
    }
    Ok(())
}

fn run_cmd(overrides: &RunOverrides, output_dir: Option<PathBuf>, serial: bool) -> Result<()> {
    let mut config = overrides.resolve()?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }

    let source = config.source();
    let output = if serial {
        run_serial(&source, &config)?
    } else {
        run_parallel(&source, &config)?
    };
    if output.results.is_empty() {
        bail!("no symbols processed under {}", config.data_dir.display());
    }

    print_run(&output);
    let run_dir = save_outputs(&output, &config, &config.output_dir)?;
    println!("Outputs saved to: {}", run_dir.display());
    Ok(())
}

fn run_validate(overrides: &RunOverrides, synthetic: Option<usize>, bars: usize) -> Result<()> {
    let config = overrides.resolve()?;

    let source: Box<dyn BarSource> = match synthetic {
        Some(n) => Box::new(SyntheticSource {
            symbols: (0..n).map(|i| format!("SYN{i:04}")).collect(),
            start: NaiveDate::from_ymd_opt(2010, 1, 4).context("invalid start date")?,
            bars,
        }),
        None => Box::new(config.source()),
    };

    let serial = run_serial(source.as_ref(), &config)?;
    let parallel = run_parallel(source.as_ref(), &config)?;
    let report = check_equivalence(&serial, &parallel)?;

    println!("Symbols:         {}", report.symbols);
    println!("Events:          {}", report.events);
    println!("Serial digest:   {}", report.serial_digest);
    println!("Parallel digest: {}", report.parallel_digest);
    println!("OK: serial and parallel outputs are identical");
    Ok(())
}

fn print_symbol(result: &SymbolResult) {
    println!();
    println!("=== {} ===", result.symbol);
    println!("Bars:     {}", result.bar_count);
    println!("Coverage: {:.2} years", result.coverage_years);
    println!("Events:   {}", result.events.len());
    println!();
    println!("{:<12} {:<8} {:>10}", "Date", "Event", "Score");
    println!("{}", "-".repeat(32));
    for e in &result.events {
        println!("{:<12} {:<8} {:>10.3}", e.date, e.label.as_str(), e.score);
    }
    if !result.sequences.is_empty() {
        println!();
        println!("{:<12} {:<22}", "Date", "Sequence");
        println!("{}", "-".repeat(35));
        for s in &result.sequences {
            println!("{:<12} {:<22}", s.date, s.sequence.as_str());
        }
    }
    if !result.transitions.is_empty() {
        println!();
        println!("{:<12} {:<28}", "Date", "Transition");
        println!("{}", "-".repeat(41));
        for t in &result.transitions {
            println!("{:<12} {:<28}", t.date, t.label());
        }
    }
    if !result.phases.is_empty() {
        println!();
        println!("{:<14} {:<12} {:<12} {:>6}", "Phase", "Start", "End", "Bars");
        println!("{}", "-".repeat(47));
        for p in &result.phases {
            println!(
                "{:<14} {:<12} {:<12} {:>6}",
                p.regime.as_str(),
                p.start,
                p.end,
                p.bars
            );
        }
    }
    println!();
}

fn print_run(output: &RunOutput) {
    let rows: Vec<_> = output.forward_rows().cloned().collect();
    let summary = summarize(&rows, output.coverage_years());

    println!();
    println!("=== Run Summary ===");
    println!("Symbols:   {}", output.results.len());
    println!("Skipped:   {}", output.skipped.len());
    println!("Bars:      {}", output.bar_count());
    println!("Events:    {}", output.event_count());
    println!("Coverage:  {:.1} symbol-years", output.coverage_years());
    println!();
    println!(
        "{:<8} {:>7} {:>9} {:>10} {:>8} {:>9}",
        "Event", "Count", "Per yr", "Med fwd20", "Win %", "P5 fwd20"
    );
    println!("{}", "-".repeat(56));
    let pct = |v: Option<f64>| v.map_or("-".to_string(), |x| format!("{:.2}", x * 100.0));
    for s in &summary {
        println!(
            "{:<8} {:>7} {:>9} {:>10} {:>8} {:>9}",
            s.event.as_str(),
            s.event_count,
            s.density.map_or("-".to_string(), |d| format!("{d:.3}")),
            pct(s.median_fwd_20),
            pct(s.win_rate_20),
            pct(s.p5_fwd_20),
        );
    }
    println!();
    println!(
        "{:<14} {:>9} {:>10} {:>8} {:>9}",
        "Regime", "Bars", "Med fwd20", "Win %", "P5 fwd20"
    );
    println!("{}", "-".repeat(54));
    for r in output.regime_summary(&[SUMMARY_WINDOW]) {
        println!(
            "{:<14} {:>9} {:>10} {:>8} {:>9}",
            r.regime.as_str(),
            r.count,
            pct(r.median),
            pct(r.win_rate),
            pct(r.p5),
        );
    }
    for skipped in &output.skipped {
        println!("WARNING: skipped {}: {}", skipped.symbol, skipped.reason);
    }
    println!();
}
