//! Multi-year reductions over stored yearly archives.

use crate::config::AnalysisConfig;
use crate::data_io::ascii_writer::write_band_series;
use crate::data_io::{write_field_map, ArchiveStore, ArchiveVariable, ReaderError, WriteError};
use crate::math::MeanAccumulator;
use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2, Array3, Axis, Zip};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("No archive for year {0}")]
    ArchiveNotFound(i32),

    #[error("Year {0} is not part of the dataset")]
    YearNotInDataset(i32),

    #[error("Empty selection: {0}")]
    EmptySelection(String),

    #[error("Invalid year span: {start} to {end}")]
    InvalidSpan { start: i32, end: i32 },

    #[error("Invalid latitude band: {lat_min} to {lat_max}")]
    InvalidBand { lat_min: f64, lat_max: f64 },

    #[error("Archive for {year} is on a different grid than earlier years")]
    GridMismatch { year: i32 },

    #[error("Reference field shape {got:?} does not match grid {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// Read-only view over a set of yearly archives.
///
/// Archives are loaded one year and one variable at a time on demand.
pub struct MultiYearDataset<'a, S: ArchiveStore> {
    store: &'a S,
    years: Vec<i32>,
}

impl<'a, S: ArchiveStore> MultiYearDataset<'a, S> {
    /// Use the given years; each must have an archive in `store`
    pub fn open(store: &'a S, years: &[i32]) -> Result<Self, AnalysisError> {
        let mut years = years.to_vec();
        years.sort_unstable();
        years.dedup();
        if years.is_empty() {
            return Err(AnalysisError::EmptySelection("no years requested".into()));
        }
        if let Some(&missing) = years.iter().find(|&&year| !store.contains(year)) {
            return Err(AnalysisError::ArchiveNotFound(missing));
        }
        Ok(Self { store, years })
    }

    /// Use every year present in `store`
    pub fn open_all(store: &'a S) -> Result<Self, AnalysisError> {
        let years = store.years()?;
        Self::open(store, &years)
    }

    /// Years of the dataset, ascending
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    fn load(&self, year: i32, variable: &str) -> Result<ArchiveVariable, AnalysisError> {
        debug!(year, variable, "loading archive variable");
        Ok(self.store.load_variable(year, variable)?)
    }

    /// Grid of `variable`, taken from the first year
    pub fn coordinates(&self, variable: &str) -> Result<(Array1<f64>, Array1<f64>), AnalysisError> {
        let first = self.years[0];
        let data = self.load(first, variable)?;
        Ok((data.latitudes, data.longitudes))
    }

    /// Per-cell mean of every time step dated within `[start_year, end_year]`,
    /// ignoring NaN. Cells without any finite sample are NaN.
    pub fn mean_over(
        &self,
        variable: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Array2<f64>, AnalysisError> {
        if end_year < start_year {
            return Err(AnalysisError::InvalidSpan {
                start: start_year,
                end: end_year,
            });
        }

        let span = start_year..=end_year;
        let mut grid: Option<(Array1<f64>, Array1<f64>)> = None;
        let mut acc: Option<MeanAccumulator> = None;
        let mut steps = 0usize;

        for &year in self.years.iter().filter(|year| span.contains(*year)) {
            let data = self.load(year, variable)?;
            if let Some((lat, lon)) = &grid {
                if *lat != data.latitudes || *lon != data.longitudes {
                    return Err(AnalysisError::GridMismatch { year });
                }
            } else {
                grid = Some((data.latitudes.clone(), data.longitudes.clone()));
            }
            let (_, nlat, nlon) = data.data.dim();
            let acc = acc.get_or_insert_with(|| MeanAccumulator::new(nlat, nlon));
            for (date, slice) in data.dates.iter().zip(data.data.axis_iter(Axis(0))) {
                if span.contains(&date.year()) {
                    acc.add_f32(slice);
                    steps += 1;
                }
            }
        }

        match acc {
            Some(acc) if steps > 0 => Ok(acc.mean()),
            _ => Err(AnalysisError::EmptySelection(format!(
                "no time steps of {} between {} and {}",
                variable, start_year, end_year
            ))),
        }
    }

    /// Lazy `field - reference` for every year of the dataset
    pub fn anomaly(
        &self,
        variable: &str,
        reference: &Array2<f64>,
    ) -> AnomalyField<'a, S> {
        AnomalyField {
            store: self.store,
            years: self.years.clone(),
            variable: variable.to_string(),
            reference: reference.clone(),
        }
    }

    /// Mean of `target` years minus mean of `baseline` years
    pub fn mean_difference(
        &self,
        variable: &str,
        target: (i32, i32),
        baseline: (i32, i32),
    ) -> Result<Array2<f64>, AnalysisError> {
        let baseline_mean = self.mean_over(variable, baseline.0, baseline.1)?;
        self.difference_from(variable, target, &baseline_mean)
    }

    /// Mean of `target` years minus an already computed baseline mean
    pub fn difference_from(
        &self,
        variable: &str,
        target: (i32, i32),
        baseline_mean: &Array2<f64>,
    ) -> Result<Array2<f64>, AnalysisError> {
        let target_mean = self.mean_over(variable, target.0, target.1)?;
        if target_mean.dim() != baseline_mean.dim() {
            return Err(AnalysisError::ShapeMismatch {
                expected: baseline_mean.dim(),
                got: target_mean.dim(),
            });
        }
        Ok(target_mean - baseline_mean)
    }
}

/// Anomaly of one variable relative to a reference map, computed per year
pub struct AnomalyField<'a, S: ArchiveStore> {
    store: &'a S,
    years: Vec<i32>,
    variable: String,
    reference: Array2<f64>,
}

/// One year of anomaly values
#[derive(Debug, Clone, PartialEq)]
pub struct YearAnomaly {
    pub year: i32,
    pub dates: Vec<NaiveDate>,
    pub latitudes: Array1<f64>,
    pub longitudes: Array1<f64>,
    /// Layout [time, lat, lon]
    pub values: Array3<f64>,
}

impl<S: ArchiveStore> AnomalyField<'_, S> {
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn reference(&self) -> &Array2<f64> {
        &self.reference
    }

    /// Load `year` and subtract the reference from every time step
    pub fn year(&self, year: i32) -> Result<YearAnomaly, AnalysisError> {
        if !self.years.contains(&year) {
            return Err(AnalysisError::YearNotInDataset(year));
        }
        let data = self.store.load_variable(year, &self.variable)?;
        let (_, nlat, nlon) = data.data.dim();
        if self.reference.dim() != (nlat, nlon) {
            return Err(AnalysisError::ShapeMismatch {
                expected: (nlat, nlon),
                got: self.reference.dim(),
            });
        }

        let mut values = data.data.mapv(f64::from);
        for mut slice in values.axis_iter_mut(Axis(0)) {
            slice -= &self.reference;
        }

        Ok(YearAnomaly {
            year,
            dates: data.dates,
            latitudes: data.latitudes,
            longitudes: data.longitudes,
            values,
        })
    }
}

/// Per-longitude mean anomaly over the latitudes inside `[lat_min, lat_max]`
/// and all days of `year`, skipping NaN. Longitude order is preserved.
pub fn latitude_band_series<S: ArchiveStore>(
    anomaly: &AnomalyField<'_, S>,
    lat_min: f64,
    lat_max: f64,
    year: i32,
) -> Result<Array1<f64>, AnalysisError> {
    if !(lat_min <= lat_max) {
        return Err(AnalysisError::InvalidBand { lat_min, lat_max });
    }
    let field = anomaly.year(year)?;
    let rows: Vec<usize> = field
        .latitudes
        .iter()
        .enumerate()
        .filter(|&(_, &lat)| lat >= lat_min && lat <= lat_max)
        .map(|(i, _)| i)
        .collect();
    if rows.is_empty() {
        return Err(AnalysisError::EmptySelection(format!(
            "no latitudes between {} and {}",
            lat_min, lat_max
        )));
    }

    let band = field.values.select(Axis(1), &rows);
    let nlon = field.longitudes.len();
    let mut sum = Array1::<f64>::zeros(nlon);
    let mut count = Array1::<u32>::zeros(nlon);
    for day in band.axis_iter(Axis(0)) {
        for row in day.axis_iter(Axis(0)) {
            Zip::from(&mut sum)
                .and(&mut count)
                .and(row)
                .for_each(|s, c, &v| {
                    if !v.is_nan() {
                        *s += v;
                        *c += 1;
                    }
                });
        }
    }

    Ok(Zip::from(&sum)
        .and(&count)
        .map_collect(|&s, &c| if c == 0 { f64::NAN } else { s / c as f64 }))
}

/// Band series for every year of the anomaly field, ascending by year
pub fn latitude_band_series_by_year<S: ArchiveStore>(
    anomaly: &AnomalyField<'_, S>,
    lat_min: f64,
    lat_max: f64,
) -> Result<Vec<(i32, Array1<f64>)>, AnalysisError> {
    anomaly
        .years()
        .iter()
        .map(|&year| latitude_band_series(anomaly, lat_min, lat_max, year).map(|s| (year, s)))
        .collect()
}

/// Results of a full analysis run
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub variable: String,
    pub latitudes: Array1<f64>,
    pub longitudes: Array1<f64>,
    pub baseline: (i32, i32),
    pub target: (i32, i32),
    /// Years whose mean was subtracted before the band series
    pub reference: (i32, i32),
    pub band: (f64, f64),
    /// Target-period mean minus baseline mean, layout [lat, lon]
    pub difference: Array2<f64>,
    /// Band series of the anomaly against the reference mean, per year
    pub band_series: Vec<(i32, Array1<f64>)>,
}

impl AnalysisReport {
    pub fn band_series_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("band_series_{}.txt", self.variable))
    }

    pub fn difference_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!(
            "mean_difference_{}_{}-{}_vs_{}-{}.nc",
            self.variable, self.target.0, self.target.1, self.baseline.0, self.baseline.1
        ))
    }

    /// Write the band-series table and the difference map into `dir`
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>, WriteError> {
        std::fs::create_dir_all(dir)?;

        let series_path = self.band_series_path(dir);
        write_band_series(
            &series_path,
            &self.variable,
            self.band,
            &self.longitudes,
            &self.band_series,
        )?;

        let map_path = self.difference_path(dir);
        let description = format!(
            "Mean {} for {}-{} minus mean for {}-{}",
            self.variable, self.target.0, self.target.1, self.baseline.0, self.baseline.1
        );
        write_field_map(
            &map_path,
            &self.variable,
            &self.latitudes,
            &self.longitudes,
            &self.difference,
            Some(&description),
        )?;

        info!(
            series = %series_path.display(),
            map = %map_path.display(),
            "wrote analysis outputs"
        );
        Ok(vec![series_path, map_path])
    }
}

/// Target-minus-baseline map and per-year band series of the anomaly
/// against the reference mean, over every archive in `store`.
///
/// Without an explicit reference span the whole archived record is the
/// reference.
pub fn run_analysis<S: ArchiveStore>(
    store: &S,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    let dataset = MultiYearDataset::open_all(store)?;
    let variable = config.variable.as_str();
    info!(years = ?dataset.years(), variable, "opened multi-year dataset");

    let baseline_mean = dataset.mean_over(variable, config.baseline.0, config.baseline.1)?;
    let difference = dataset.difference_from(variable, config.target, &baseline_mean)?;

    let years = dataset.years();
    let reference = config
        .reference
        .unwrap_or((years[0], years[years.len() - 1]));
    let reference_mean = if reference == config.baseline {
        baseline_mean
    } else {
        dataset.mean_over(variable, reference.0, reference.1)?
    };
    debug!(reference = ?reference, "anomaly reference span");
    let anomaly = dataset.anomaly(variable, &reference_mean);
    let band_series = latitude_band_series_by_year(&anomaly, config.band.0, config.band.1)?;
    let (latitudes, longitudes) = dataset.coordinates(variable)?;

    Ok(AnalysisReport {
        variable: config.variable.clone(),
        latitudes,
        longitudes,
        baseline: config.baseline,
        target: config.target,
        reference,
        band: config.band,
        difference,
        band_series,
    })
}
