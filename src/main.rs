use anyhow::{Context, Result};
use clap::{ArgMatches, Command};
use merra2_rust::{
    analysis::run_analysis,
    config::{AnalysisConfig, ExtractConfig},
    data_io::{NetCDFArchiveStore, NetCDFDayLoader},
    naming::{FileNamer, Merra2Naming},
    pipeline::Pipeline,
    time_utils::sample_dates,
};
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    let matches = build_cli().get_matches();

    let verbose = matches
        .subcommand()
        .map(|(_, sub)| sub.get_flag("verbose"))
        .unwrap_or(false);
    init_logging(verbose);

    match matches.subcommand() {
        Some(("extract", sub_matches)) => {
            if let Err(e) = run_extract(sub_matches) {
                eprintln!("Extraction error: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(("names", sub_matches)) => {
            if let Err(e) = run_names(sub_matches) {
                eprintln!("Naming error: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(("analyze", sub_matches)) => {
            if let Err(e) = run_analyze(sub_matches) {
                eprintln!("Analysis error: {:#}", e);
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn run_extract(matches: &ArgMatches) -> Result<()> {
    let config = ExtractConfig::from_matches(matches).context("invalid extract arguments")?;
    let output_dir = config.output_dir.clone();

    println!(
        "Extracting {} to {} from {} ({} regridding, {}° grid)",
        config.start_date,
        config.end_date,
        config.input_dir.display(),
        config.method,
        config.resolution
    );

    let store = NetCDFArchiveStore::new(&output_dir);
    let mut pipeline = Pipeline::new(config, NetCDFDayLoader::new(), store)?;
    let summary = pipeline.run()?;

    println!("\n=== Extraction Summary ===");
    for year in &summary.years {
        println!(
            "{}: {} of {} days written",
            year.year, year.written_days, year.requested_days
        );
    }
    if !summary.skipped_years.is_empty() {
        println!("Years without data: {:?}", summary.skipped_years);
    }
    println!("Missing source files: {}", summary.missing_files.len());
    println!(
        "{} archives written to {}",
        summary.archives_written(),
        output_dir.display()
    );
    Ok(())
}

fn run_names(matches: &ArgMatches) -> Result<()> {
    let config = ExtractConfig::from_matches(matches).context("invalid date arguments")?;
    let namer = Merra2Naming::default();
    let dates = sample_dates(config.start_date, config.end_date, config.sampling)?;

    for date in dates {
        let path = merra2_rust::naming::source_path(&config.input_dir, &namer, date);
        let marker = if path.is_file() { "" } else { "  (missing)" };
        println!("{}  {}{}", date, namer.file_name(date), marker);
    }
    Ok(())
}

fn run_analyze(matches: &ArgMatches) -> Result<()> {
    let config = AnalysisConfig::from_matches(matches).context("invalid analysis arguments")?;
    let store = NetCDFArchiveStore::new(&config.archive_dir);

    let report = run_analysis(&store, &config)
        .with_context(|| format!("analysing archives in {}", config.archive_dir.display()))?;
    let written = report.write(&config.output_dir)?;

    println!("\n=== Analysis Summary ===");
    println!(
        "{}: {}-{} vs baseline {}-{}, band {}..{}°N",
        report.variable,
        report.target.0,
        report.target.1,
        report.baseline.0,
        report.baseline.1,
        report.band.0,
        report.band.1
    );
    println!(
        "Band series relative to the {}-{} mean",
        report.reference.0, report.reference.1
    );
    for (year, series) in &report.band_series {
        let finite: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
        let mean = if finite.is_empty() {
            f64::NAN
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        println!("{}: band-mean anomaly {:.4e}", year, mean);
    }
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn build_cli() -> Command {
    Command::new("merra2_rust")
        .version(env!("CARGO_PKG_VERSION"))
        .about("MERRA-2 dust aerosol extraction, regridding and multi-year analysis")
        .subcommand_required(true)
        .subcommand(ExtractConfig::command())
        .subcommand(
            ExtractConfig::date_args(Command::new("names"))
                .about("List the source file resolved for each date without reading anything")
                .arg(
                    clap::Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .help("Enable debug logging")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(AnalysisConfig::command())
}
