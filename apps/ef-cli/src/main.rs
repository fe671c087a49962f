use clap::{Parser, Subcommand};
use ef_app::{
    combine_batches, derive_catchment_inflow, download_record, load_settings, predict_inflows,
    save_settings, simulate, summarize_file, AppResult, Settings, StageSummary, SummaryOptions,
    ZenodoClient, DEFAULT_REALIZATIONS,
};
use ef_batch::{CombineReport, RunSummary};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "ef-cli")]
#[command(about = "Ensemble streamflow pipeline: inflow preparation, batched simulation, summaries", long_about = None)]
struct Cli {
    /// Settings YAML file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the published ensemble data record
    Download,
    /// Derive catchment inflow from gauge flow for the first N realizations
    CatchmentInflow {
        #[arg(default_value_t = DEFAULT_REALIZATIONS)]
        n: usize,
    },
    /// Predict 1-4 day ahead inflows for the first N realizations
    PredictInflows {
        #[arg(default_value_t = DEFAULT_REALIZATIONS)]
        n: usize,
    },
    /// Simulate the first N realizations in parallel batches
    Simulate {
        #[arg(default_value_t = DEFAULT_REALIZATIONS)]
        n: usize,
        /// Worker count (defaults to the settings, then the CPU count)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Combine batch files left behind by an interrupted run
    Combine,
    /// Summarize simulation output as a date,mean,q10,q90 CSV
    Summarize {
        /// Columns summed into one series per realization
        #[arg(short, long, required = true, num_args = 1..)]
        columns: Vec<String>,
        /// Rolling mean window in days
        #[arg(long, default_value_t = 7)]
        window: usize,
        /// Scale to percent of the ensemble maximum
        #[arg(long)]
        percent: bool,
        /// Container to summarize (defaults to the combined output)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the effective settings to a YAML file
    Settings {
        /// Output YAML file path
        output: PathBuf,
    },
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        match (cli.verbose, cli.quiet) {
            (true, _) => "debug",
            (_, true) => "error",
            _ => "info",
        }
        .to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.settings {
        Some(path) => {
            info!(path = %path.display(), "loading settings");
            load_settings(path)?
        }
        None => {
            let settings = Settings::default();
            settings.validate()?;
            settings
        }
    };

    match cli.command {
        Commands::Download => cmd_download(&settings),
        Commands::CatchmentInflow { n } => {
            println!("Deriving catchment inflow for {} realizations", n);
            print_stage(&derive_catchment_inflow(&settings, n)?);
            Ok(())
        }
        Commands::PredictInflows { n } => {
            println!("Predicting inflows for {} realizations", n);
            print_stage(&predict_inflows(&settings, n)?);
            Ok(())
        }
        Commands::Simulate { n, workers } => cmd_simulate(&settings, n, workers),
        Commands::Combine => {
            let report = combine_batches(&settings)?;
            print_combine(&report);
            Ok(())
        }
        Commands::Summarize {
            columns,
            window,
            percent,
            input,
            output,
        } => {
            let options = SummaryOptions {
                columns,
                window,
                percent,
            };
            let input = input.unwrap_or_else(|| settings.output_path());
            cmd_summarize(&input, &options, output.as_deref())
        }
        Commands::Settings { output } => {
            save_settings(&output, &settings)?;
            println!("✓ Settings written to {}", output.display());
            Ok(())
        }
    }
}

fn cmd_download(settings: &Settings) -> AppResult<()> {
    let client = ZenodoClient::new(&settings.download)?;
    let paths = download_record(&client, &settings.download)?;
    for path in paths {
        println!("✓ Downloaded {}", path.display());
    }
    Ok(())
}

fn cmd_simulate(settings: &Settings, n: usize, workers: Option<usize>) -> AppResult<()> {
    println!(
        "Simulating {} realizations of {} ({} per batch)",
        n, settings.ensemble, settings.realizations_per_batch
    );
    let summary = simulate(settings, n, workers)?;
    print_run_summary(&summary);
    Ok(())
}

fn cmd_summarize(input: &Path, options: &SummaryOptions, output: Option<&Path>) -> AppResult<()> {
    let summary = summarize_file(input, options)?;
    let csv = summary.to_csv();
    match output {
        Some(path) => {
            std::fs::write(path, csv)?;
            println!(
                "✓ Summarized {} realizations over {} days to {}",
                summary.realizations,
                summary.dates.len(),
                path.display()
            );
        }
        None => print!("{}", csv),
    }
    Ok(())
}

fn print_stage(stage: &StageSummary) {
    println!("✓ Wrote {}", stage.output.display());
    println!(
        "  Realizations: {} of {} available",
        stage.realizations, stage.available
    );
    println!("  Groups: {}", stage.groups);
    println!("  Elapsed: {:.3}s", stage.elapsed_s);
}

fn print_run_summary(summary: &RunSummary) {
    if summary.is_complete() {
        println!("✓ Simulation completed");
    } else {
        println!("✗ Simulation finished with missing batches");
    }
    println!("  Plan: {}", summary.plan_fingerprint);
    if summary.stale_removed > 0 {
        println!("  Stale files removed: {}", summary.stale_removed);
    }
    println!(
        "  Batches: {} succeeded, {} failed",
        summary.num_successful(),
        summary.num_failed()
    );
    for failure in summary.shards.iter().flat_map(|s| &s.failures) {
        println!("    {}: {}", failure.key, failure.message);
    }
    print_combine(&summary.combine);
    let totals = summary.stage_totals();
    if totals.build.count > 0 {
        println!("\nBatch timing (sum over workers, average per batch):");
        println!(
            "  Build: {:.3}s ({:.3}s)",
            totals.build.total_s,
            totals.build.average_s()
        );
        println!("  Run:   {:.3}s ({:.3}s)", totals.run.total_s, totals.run.average_s());
        println!(
            "  Save:  {:.3}s ({:.3}s)",
            totals.save.total_s,
            totals.save.average_s()
        );
    }
    println!("  Total: {:.3}s", summary.elapsed_s);
}

fn print_combine(report: &CombineReport) {
    println!(
        "  Combined {} realizations from {}/{} batches into {}",
        report.realizations,
        report.found,
        report.expected,
        report.output.display()
    );
    if !report.missing.is_empty() {
        let missing: Vec<String> = report.missing.iter().map(|k| k.to_string()).collect();
        println!("  Missing batches: {}", missing.join(", "));
    }
}
