use crate::grid::{GridError, GridSpec};
use crate::math::{InterpError, InterpMethod};
use crate::time_utils::{parse_date, DateRangeError, DateSampling};
use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error(transparent)]
    Date(#[from] DateRangeError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Interp(#[from] InterpError),

    #[error("Invalid year span: {start} to {end}")]
    InvalidSpan { start: i32, end: i32 },

    #[error("Invalid latitude band: {lat_min} to {lat_max}")]
    InvalidBand { lat_min: f64, lat_max: f64 },
}

/// Settings for the extract-regrid-aggregate run
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractConfig {
    /// First date to process (inclusive)
    pub start_date: NaiveDate,
    /// Last date to process (inclusive)
    pub end_date: NaiveDate,
    /// Root of the `<year>/` source directories
    pub input_dir: PathBuf,
    /// Destination of the yearly archives
    pub output_dir: PathBuf,
    /// Target latitude range, half-open `[start, stop)`
    pub lat_range: (f64, f64),
    /// Target longitude range, half-open `[start, stop)`
    pub lon_range: (f64, f64),
    /// Target grid spacing in degrees
    pub resolution: f64,
    pub method: InterpMethod,
    /// Variables to extract; `None` takes every `[time, lat, lon]` variable
    pub variables: Option<Vec<String>>,
    pub sampling: DateSampling,
    /// Written as the archives' global `description`
    pub description: Option<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap_or(NaiveDate::MIN),
            input_dir: PathBuf::from("./merra2"),
            output_dir: PathBuf::from("./output"),
            lat_range: (-90.0, 90.0),
            lon_range: (-180.0, 180.0),
            resolution: 1.0,
            method: InterpMethod::Cubic,
            variables: None,
            sampling: DateSampling::Daily,
            description: None,
        }
    }
}

impl ExtractConfig {
    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_grid(mut self, lat_range: (f64, f64), lon_range: (f64, f64), resolution: f64) -> Self {
        self.lat_range = lat_range;
        self.lon_range = lon_range;
        self.resolution = resolution;
        self
    }

    pub fn with_method(mut self, method: InterpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(variables.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_sampling(mut self, sampling: DateSampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Target grid described by the ranges and resolution
    pub fn grid(&self) -> Result<GridSpec, GridError> {
        GridSpec::regular(self.lat_range, self.lon_range, self.resolution)
    }

    /// Check the settings without touching the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end_date < self.start_date {
            return Err(DateRangeError::InvalidRange {
                start: self.start_date,
                end: self.end_date,
            }
            .into());
        }
        self.grid()?;
        if let Some(variables) = &self.variables {
            if variables.is_empty() || variables.iter().any(|v| v.trim().is_empty()) {
                return Err(ConfigError::InvalidArgument {
                    name: "variables",
                    value: variables.join(","),
                });
            }
        }
        if let DateSampling::LeadingDaysOfMonth(days) = self.sampling {
            if !(1..=31).contains(&days) {
                return Err(ConfigError::InvalidArgument {
                    name: "sampling",
                    value: days.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Arguments shared by the `extract` and `names` subcommands
    pub fn date_args(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("start-date")
                .short('s')
                .long("start-date")
                .value_name("DATE")
                .help("First date to process (YYYY-MM-DD)")
                .default_value("2010-01-01"),
        )
        .arg(
            Arg::new("end-date")
                .short('e')
                .long("end-date")
                .value_name("DATE")
                .help("Last date to process, inclusive (YYYY-MM-DD)")
                .default_value("2020-12-31"),
        )
        .arg(
            Arg::new("input-dir")
                .short('i')
                .long("input-dir")
                .value_name("DIR")
                .help("Directory holding <year>/ subdirectories of MERRA-2 granules")
                .default_value("./merra2"),
        )
        .arg(
            Arg::new("sampling")
                .long("sampling")
                .value_name("MODE")
                .help("Date sampling: 'daily' or 'first-N' (first N days of each month)")
                .default_value("daily"),
        )
    }

    pub fn command() -> Command {
        Self::date_args(Command::new("extract"))
            .about("Regrid MERRA-2 aerosol granules and write yearly daily-mean archives")
            .arg(
                Arg::new("output-dir")
                    .short('o')
                    .long("output-dir")
                    .value_name("DIR")
                    .help("Output directory for merra_2_daily_<year>.nc files")
                    .default_value("./output"),
            )
            .arg(
                Arg::new("lat-range")
                    .long("lat-range")
                    .value_name("START,STOP")
                    .help("Target latitude range [start, stop)")
                    .allow_hyphen_values(true)
                    .default_value("-90,90"),
            )
            .arg(
                Arg::new("lon-range")
                    .long("lon-range")
                    .value_name("START,STOP")
                    .help("Target longitude range [start, stop)")
                    .allow_hyphen_values(true)
                    .default_value("-180,180"),
            )
            .arg(
                Arg::new("resolution")
                    .short('r')
                    .long("resolution")
                    .value_name("DEGREES")
                    .help("Target grid spacing")
                    .default_value("1.0")
                    .value_parser(value_parser!(f64)),
            )
            .arg(
                Arg::new("method")
                    .short('m')
                    .long("method")
                    .value_name("METHOD")
                    .help("Interpolation method")
                    .value_parser(["nearest", "linear", "cubic"])
                    .default_value("cubic"),
            )
            .arg(
                Arg::new("variables")
                    .long("variables")
                    .value_name("NAMES")
                    .help("Comma-separated variables to extract (default: all [time, lat, lon] fields)"),
            )
            .arg(
                Arg::new("description")
                    .long("description")
                    .value_name("TEXT")
                    .help("Description stored in each archive"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Enable debug logging")
                    .action(ArgAction::SetTrue),
            )
    }

    /// Build from parsed `extract` (or `names`) arguments
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut config = Self {
            start_date: parse_date(required(matches, "start-date")?)?,
            end_date: parse_date(required(matches, "end-date")?)?,
            input_dir: PathBuf::from(required(matches, "input-dir")?),
            sampling: parse_sampling(required(matches, "sampling")?)?,
            ..defaults
        };

        if let Ok(Some(dir)) = matches.try_get_one::<String>("output-dir") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(Some(range)) = matches.try_get_one::<String>("lat-range") {
            config.lat_range = parse_pair("lat-range", range)?;
        }
        if let Ok(Some(range)) = matches.try_get_one::<String>("lon-range") {
            config.lon_range = parse_pair("lon-range", range)?;
        }
        if let Ok(Some(resolution)) = matches.try_get_one::<f64>("resolution") {
            config.resolution = *resolution;
        }
        if let Ok(Some(method)) = matches.try_get_one::<String>("method") {
            config.method = method.parse()?;
        }
        if let Ok(Some(list)) = matches.try_get_one::<String>("variables") {
            config.variables = Some(
                list.split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect(),
            );
        }
        if let Ok(Some(description)) = matches.try_get_one::<String>("description") {
            config.description = Some(description.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

/// Settings for the multi-year analysis
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    /// Directory holding `merra_2_daily_<year>.nc` archives
    pub archive_dir: PathBuf,
    pub variable: String,
    /// Period subtracted in the difference map, inclusive years
    pub baseline: (i32, i32),
    /// Period compared against the baseline, inclusive years
    pub target: (i32, i32),
    /// Years whose mean is subtracted before band series are taken.
    /// `None` uses every year of the dataset.
    pub reference: Option<(i32, i32)>,
    /// Latitude window for band series, inclusive
    pub band: (f64, f64),
    pub output_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("./output"),
            variable: "DUEXTT25".to_string(),
            baseline: (2010, 2019),
            target: (2020, 2020),
            reference: None,
            band: (20.0, 50.0),
            output_dir: PathBuf::from("./analysis"),
        }
    }
}

impl AnalysisConfig {
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = variable.into();
        self
    }

    pub fn with_baseline(mut self, start: i32, end: i32) -> Self {
        self.baseline = (start, end);
        self
    }

    pub fn with_target(mut self, start: i32, end: i32) -> Self {
        self.target = (start, end);
        self
    }

    pub fn with_reference(mut self, start: i32, end: i32) -> Self {
        self.reference = Some((start, end));
        self
    }

    pub fn with_band(mut self, lat_min: f64, lat_max: f64) -> Self {
        self.band = (lat_min, lat_max);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let spans = [Some(self.baseline), Some(self.target), self.reference];
        for &(start, end) in spans.iter().flatten() {
            if end < start {
                return Err(ConfigError::InvalidSpan { start, end });
            }
        }
        let (lat_min, lat_max) = self.band;
        if !(lat_min <= lat_max) {
            return Err(ConfigError::InvalidBand { lat_min, lat_max });
        }
        if self.variable.trim().is_empty() {
            return Err(ConfigError::InvalidArgument {
                name: "variable",
                value: self.variable.clone(),
            });
        }
        Ok(())
    }

    pub fn command() -> Command {
        Command::new("analyze")
            .about("Compute period means, anomalies and latitude-band series from yearly archives")
            .arg(
                Arg::new("archive-dir")
                    .short('a')
                    .long("archive-dir")
                    .value_name("DIR")
                    .help("Directory holding merra_2_daily_<year>.nc archives")
                    .default_value("./output"),
            )
            .arg(
                Arg::new("variable")
                    .long("variable")
                    .value_name("NAME")
                    .help("Variable to analyse")
                    .default_value("DUEXTT25"),
            )
            .arg(
                Arg::new("baseline")
                    .long("baseline")
                    .value_name("START,END")
                    .help("Period subtracted in the difference map (inclusive years)")
                    .default_value("2010,2019"),
            )
            .arg(
                Arg::new("target")
                    .long("target")
                    .value_name("START,END")
                    .help("Compared period (inclusive years)")
                    .default_value("2020,2020"),
            )
            .arg(
                Arg::new("reference")
                    .long("reference")
                    .value_name("START,END")
                    .help("Years averaged into the anomaly reference [default: every archived year]"),
            )
            .arg(
                Arg::new("band")
                    .long("band")
                    .value_name("LAT_MIN,LAT_MAX")
                    .help("Latitude window for band series (inclusive)")
                    .allow_hyphen_values(true)
                    .default_value("20,50"),
            )
            .arg(
                Arg::new("output-dir")
                    .short('o')
                    .long("output-dir")
                    .value_name("DIR")
                    .help("Directory for analysis outputs")
                    .default_value("./analysis"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Enable debug logging")
                    .action(ArgAction::SetTrue),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let reference = match matches.get_one::<String>("reference") {
            Some(value) => Some(parse_pair("reference", value)?),
            None => None,
        };
        let config = Self {
            archive_dir: PathBuf::from(required(matches, "archive-dir")?),
            variable: required(matches, "variable")?.to_string(),
            baseline: parse_pair("baseline", required(matches, "baseline")?)?,
            target: parse_pair("target", required(matches, "target")?)?,
            reference,
            band: parse_pair("band", required(matches, "band")?)?,
            output_dir: PathBuf::from(required(matches, "output-dir")?),
        };
        config.validate()?;
        Ok(config)
    }
}

fn required<'m>(matches: &'m ArgMatches, name: &'static str) -> Result<&'m str, ConfigError> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or(ConfigError::MissingArgument(name))
}

/// Parse a `a,b` pair
fn parse_pair<T: FromStr>(name: &'static str, value: &str) -> Result<(T, T), ConfigError> {
    let invalid = || ConfigError::InvalidArgument {
        name,
        value: value.to_string(),
    };
    let (first, second) = value.split_once(',').ok_or_else(invalid)?;
    let first = first.trim().parse().map_err(|_| invalid())?;
    let second = second.trim().parse().map_err(|_| invalid())?;
    Ok((first, second))
}

/// `daily` or `first-N`
pub fn parse_sampling(value: &str) -> Result<DateSampling, ConfigError> {
    let value = value.trim().to_ascii_lowercase();
    if value == "daily" {
        return Ok(DateSampling::Daily);
    }
    value
        .strip_prefix("first-")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| (1..=31).contains(n))
        .map(DateSampling::LeadingDaysOfMonth)
        .ok_or_else(|| ConfigError::InvalidArgument {
            name: "sampling",
            value: value.clone(),
        })
}
