//! Gridlens - spreadsheet risk analysis from the command line

mod report;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gridlens_core::diff::{DiffConfig, DiffEngine};
use gridlens_core::storage::{load_workbook, write_changes_json, write_risks_csv, write_risks_json};
use gridlens_core::{AnalysisConfig, Analyzer, ModelAnalysis, load_config};

#[derive(Parser)]
#[command(name = "gridlens")]
#[command(about = "Find, rank and diff the risks hiding in spreadsheet models")]
#[command(version)]
struct Cli {
    /// Configuration file (default: <config dir>/gridlens/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse one workbook and report its risks
    #[command(after_help = "\
Examples:
  gridlens analyze model.xlsx
  gridlens analyze model.xlsx --format csv -o risks.csv
  gridlens analyze model.grd --format json")]
    Analyze {
        /// Workbook (.xlsx, .xlsm, .xlsb, .xls, .ods, .grd)
        file: PathBuf,

        #[arg(long, short = 'f', value_enum, default_value_t = AnalyzeFormat::Table)]
        format: AnalyzeFormat,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Compare two versions of a workbook, matching rows by key columns
    #[command(after_help = "\
Examples:
  gridlens diff v1.xlsx v2.xlsx --sheet Data --keys A
  gridlens diff v1.xlsx v2.xlsx --sheet Data --keys A,C --format json")]
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Sheet whose rows are matched
        #[arg(long)]
        sheet: String,

        /// Key column letters, comma separated (e.g. A,C)
        #[arg(long, value_name = "COLS")]
        keys: String,

        #[arg(long, short = 'f', value_enum, default_value_t = DiffFormat::Table)]
        format: DiffFormat,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AnalyzeFormat {
    Table,
    Csv,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DiffFormat {
    Table,
    Json,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("gridlens={level},gridlens_core={level},gridlens_engine={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn default_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridlens")?;
    Some(proj.config_dir().join("config.toml"))
}

fn resolve_config(explicit: Option<&Path>) -> AnalysisConfig {
    let (config, warnings) = match explicit {
        Some(path) => load_config(Some(path), true),
        None => load_config(default_config_path().as_deref(), false),
    };
    for warning in warnings {
        warn!("{}", warning);
    }
    config
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn analyse_file(analyzer: &Analyzer, path: &Path) -> Result<ModelAnalysis> {
    let store = load_workbook(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(analyzer.analyze(path.display().to_string(), store))
}

fn run(cli: Cli) -> Result<()> {
    let analyzer = Analyzer::new(resolve_config(cli.config.as_deref()));

    match cli.command {
        Commands::Analyze { file, format, output } => {
            let analysis = analyse_file(&analyzer, &file)?;
            let mut out = open_output(output.as_deref())?;
            match format {
                AnalyzeFormat::Table => report::write_analysis(&mut out, &analysis)?,
                AnalyzeFormat::Csv => write_risks_csv(&mut out, &analysis)?,
                AnalyzeFormat::Json => {
                    write_risks_json(&mut out, &analysis)?;
                    writeln!(out)?;
                }
            }
            out.flush()?;
            if let Some(path) = output {
                info!(path = %path.display(), alerts = analysis.alerts.len(), "report written");
            }
        }
        Commands::Diff {
            old,
            new,
            sheet,
            keys,
            format,
            output,
        } => {
            let before = analyse_file(&analyzer, &old)?;
            let after = analyse_file(&analyzer, &new)?;
            let config = DiffConfig {
                sheet,
                key_columns: DiffConfig::parse_key_list(&keys),
            };
            let changes = DiffEngine::new(&before, &after, config)?.run();
            let mut out = open_output(output.as_deref())?;
            match format {
                DiffFormat::Table => report::write_changes(&mut out, &changes)?,
                DiffFormat::Json => {
                    write_changes_json(&mut out, &changes)?;
                    writeln!(out)?;
                }
            }
            out.flush()?;
        }
    }
    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
