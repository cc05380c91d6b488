//! dakar-fm command line entry point.
//!
//! ```bash
//! # Ingest samples and export the unified table
//! dakar-fm combine
//!
//! # After labelling top/bottom in the exported table
//! dakar-fm background
//! dakar-fm compare --before BeforeDetach --after AfterDetach
//!
//! # Everything in one go
//! dakar-fm --config inspection.toml run
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use dakar_fm::config::Settings;
use dakar_fm::engine::{Analysis, AnalysisError, RunSummary};

#[derive(Parser)]
#[command(name = "dakar-fm")]
#[command(about = "Track foreign-material defects across foil inspection states")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML or JSON). Defaults to dakar.toml or dakar.json
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every sample and export the unified table
    Combine,

    /// Crop white and red images around each defect
    Crop {
        /// First table row (0-based, in table order)
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// One past the last table row
        #[arg(long)]
        end: Option<usize>,
    },

    /// Crop the same spot across every foil of a state
    Background,

    /// Plot defect positions per sample
    Plot,

    /// Classify added, removed and stayed defects between two states
    Compare {
        /// Overrides compare.before_state
        #[arg(long)]
        before: Option<String>,

        /// Overrides compare.after_state
        #[arg(long)]
        after: Option<String>,
    },

    /// Combine, crop, background, plot and compare in one pass
    Run,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    match execute(args) {
        Ok(summary) => {
            summary.log();
            ExitCode::SUCCESS
        }
        Err(e) if e.is_configuration() => {
            log::error!("Configuration error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(args: Args) -> Result<RunSummary, AnalysisError> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };

    if let Commands::Compare { before, after } = &args.command {
        if let Some(before) = before {
            settings.compare.before_state = Some(before.clone());
        }
        if let Some(after) = after {
            settings.compare.after_state = Some(after.clone());
        }
    }

    let analysis = Analysis::new(settings)?;
    log::info!("dakar-fm starting");
    log::info!(
        "  Data: {} -> {}",
        analysis.settings().data.root.display(),
        analysis.settings().data.analysis_dir().display()
    );
    log::info!(
        "  Matching: tolerance {} over {:?}",
        analysis.settings().matching.distance_tolerance,
        analysis.settings().matching.partition_keys
    );

    match args.command {
        Commands::Combine => Ok(analysis.combine()?.summary),
        Commands::Crop { start, end } => {
            let table = analysis.load_table()?;
            analysis.crop_white_red(&table, start, end)
        }
        Commands::Background => {
            let table = analysis.load_table()?;
            analysis.crop_background(&table)
        }
        Commands::Plot => {
            let table = analysis.load_table()?;
            analysis.plot_positions(&table)
        }
        Commands::Compare { .. } => {
            let table = analysis.load_table()?;
            Ok(analysis.compare(&table)?.summary)
        }
        Commands::Run => analysis.run(),
    }
}
