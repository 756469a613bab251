//! Extract, regrid and aggregate MERRA-2 granules into yearly archives.
//!
//! A run walks the requested dates one calendar year at a time. Each day's
//! granule is loaded, optionally transformed, regridded onto the target grid
//! and reduced to a daily mean. At every year boundary the accumulated days
//! are stacked into a [`YearlyArchive`] and handed to the [`ArchiveStore`],
//! so at most one year of daily fields is held in memory.

use crate::config::{ConfigError, ExtractConfig};
use crate::data_io::{
    ArchiveStore, DailyField, DayLoader, RawDay, ReaderError, WriteError, YearlyArchive,
};
use crate::grid::{GridError, GridSpec, Regridder};
use crate::math::nanmean_time;
use crate::naming::{source_path, FileNamer, Merra2Naming};
use crate::time_utils::{year_groups, DateRangeError};
use chrono::NaiveDate;
use ndarray::{Array1, Array3, Axis};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Date(#[from] DateRangeError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Variables on {date} ({got:?}) differ from earlier days of the year ({expected:?})")]
    InconsistentVariables {
        date: NaiveDate,
        expected: Vec<String>,
        got: Vec<String>,
    },
}

/// Hook applied to each raw granule before regridding
pub trait FieldTransform {
    fn apply(&self, day: RawDay) -> Result<RawDay, PipelineError>;
}

impl<F> FieldTransform for F
where
    F: Fn(RawDay) -> Result<RawDay, PipelineError>,
{
    fn apply(&self, day: RawDay) -> Result<RawDay, PipelineError> {
        self(day)
    }
}

/// Hook applied to each yearly archive before it is stored
pub trait ArchiveTransform {
    fn apply(&self, archive: YearlyArchive) -> Result<YearlyArchive, PipelineError>;
}

impl<F> ArchiveTransform for F
where
    F: Fn(YearlyArchive) -> Result<YearlyArchive, PipelineError>,
{
    fn apply(&self, archive: YearlyArchive) -> Result<YearlyArchive, PipelineError> {
        self(archive)
    }
}

/// Per-date visitor with a flush at every year boundary
pub trait YearFold {
    type Error;

    fn visit_date(&mut self, year: i32, date: NaiveDate) -> Result<(), Self::Error>;

    /// Called once after the last date of `year`
    fn flush_year(&mut self, year: i32) -> Result<(), Self::Error>;
}

/// Drive `folder` over ordered year groups
pub fn fold_year_groups<I, F>(groups: I, folder: &mut F) -> Result<(), F::Error>
where
    I: IntoIterator<Item = (i32, Vec<NaiveDate>)>,
    F: YearFold,
{
    for (year, dates) in groups {
        for date in dates {
            folder.visit_date(year, date)?;
        }
        folder.flush_year(year)?;
    }
    Ok(())
}

/// Days requested and written for one year
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearSummary {
    pub year: i32,
    pub requested_days: usize,
    pub written_days: usize,
}

/// Outcome of [`Pipeline::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Years that produced an archive, ascending
    pub years: Vec<YearSummary>,
    /// Years with no available day
    pub skipped_years: Vec<i32>,
    /// Source paths that did not exist
    pub missing_files: Vec<PathBuf>,
}

impl RunSummary {
    pub fn written_days(&self) -> usize {
        self.years.iter().map(|y| y.written_days).sum()
    }

    pub fn archives_written(&self) -> usize {
        self.years.len()
    }
}

struct CachedRegridder {
    latitudes: Array1<f64>,
    longitudes: Array1<f64>,
    regridder: Regridder,
}

impl CachedRegridder {
    fn serves(&self, day: &RawDay) -> bool {
        self.latitudes == day.latitudes && self.longitudes == day.longitudes
    }
}

pub struct Pipeline<L: DayLoader, S: ArchiveStore> {
    config: ExtractConfig,
    grid: GridSpec,
    loader: L,
    store: S,
    namer: Box<dyn FileNamer>,
    pre_transform: Option<Box<dyn FieldTransform>>,
    post_transform: Option<Box<dyn ArchiveTransform>>,
    regridder: Option<CachedRegridder>,
}

impl<L: DayLoader, S: ArchiveStore> Pipeline<L, S> {
    /// Validate `config` and build the target grid. No I/O happens here.
    pub fn new(config: ExtractConfig, loader: L, store: S) -> Result<Self, PipelineError> {
        config.validate()?;
        let grid = config.grid()?;
        Ok(Self {
            config,
            grid,
            loader,
            store,
            namer: Box::new(Merra2Naming::default()),
            pre_transform: None,
            post_transform: None,
            regridder: None,
        })
    }

    /// Replace the built-in naming rule for every date of the run
    pub fn with_namer<N: FileNamer + 'static>(mut self, namer: N) -> Self {
        self.namer = Box::new(namer);
        self
    }

    pub fn with_pre_transform<T: FieldTransform + 'static>(mut self, transform: T) -> Self {
        self.pre_transform = Some(Box::new(transform));
        self
    }

    pub fn with_post_transform<T: ArchiveTransform + 'static>(mut self, transform: T) -> Self {
        self.post_transform = Some(Box::new(transform));
        self
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn source_path(&self, date: NaiveDate) -> PathBuf {
        source_path(&self.config.input_dir, self.namer.as_ref(), date)
    }

    /// Produce one day's mean fields on the target grid.
    ///
    /// Returns `Ok(None)` when the day's source file does not exist.
    pub fn process_day(&mut self, date: NaiveDate) -> Result<Option<DailyField>, PipelineError> {
        let path = self.source_path(date);
        if !self.loader.exists(&path) {
            debug!(date = %date, path = %path.display(), "source file missing, skipping day");
            return Ok(None);
        }

        let raw = self
            .loader
            .load(&path, date, self.config.variables.as_deref())?;
        let raw = match &self.pre_transform {
            Some(transform) => transform.apply(raw)?,
            None => raw,
        };

        let cached = match self.regridder.take() {
            Some(cached) if cached.serves(&raw) => cached,
            _ => {
                debug!(
                    date = %date,
                    nlat = raw.latitudes.len(),
                    nlon = raw.longitudes.len(),
                    "building regridder for native grid"
                );
                CachedRegridder {
                    regridder: Regridder::new(
                        &raw.latitudes.to_vec(),
                        &raw.longitudes.to_vec(),
                        &self.grid,
                        self.config.method,
                    )?,
                    latitudes: raw.latitudes.clone(),
                    longitudes: raw.longitudes.clone(),
                }
            }
        };

        let mut variables = BTreeMap::new();
        for (name, data) in &raw.variables {
            let regridded = cached.regridder.regrid(data.view())?;
            let mean = nanmean_time(regridded.view());
            if mean.iter().all(|v| v.is_nan()) {
                warn!(date = %date, variable = %name, "daily mean is entirely NaN");
            }
            variables.insert(name.clone(), mean);
        }
        self.regridder = Some(cached);

        Ok(Some(DailyField {
            date,
            variables,
            attrs: raw.attrs,
        }))
    }

    /// Stack a year's daily fields and persist them.
    ///
    /// Returns `Ok(None)` without writing anything when `days` is empty.
    pub fn aggregate_year(
        &mut self,
        year: i32,
        days: Vec<DailyField>,
    ) -> Result<Option<YearlyArchive>, PipelineError> {
        let Some(first) = days.first() else {
            info!(year, "no source data for year, nothing written");
            return Ok(None);
        };

        let names: Vec<String> = first.variables.keys().cloned().collect();
        for day in &days[1..] {
            let got: Vec<String> = day.variables.keys().cloned().collect();
            if got != names {
                return Err(PipelineError::InconsistentVariables {
                    date: day.date,
                    expected: names,
                    got,
                });
            }
        }

        let shape = (days.len(), self.grid.nlat(), self.grid.nlon());
        let mut variables = BTreeMap::new();
        for name in &names {
            let mut stacked = Array3::<f32>::zeros(shape);
            for (mut slot, day) in stacked.axis_iter_mut(Axis(0)).zip(&days) {
                let field = &day.variables[name];
                if field.dim() != (shape.1, shape.2) {
                    return Err(GridError::ShapeMismatch {
                        expected: (shape.1, shape.2),
                        got: field.dim(),
                    }
                    .into());
                }
                slot.assign(field);
            }
            variables.insert(name.clone(), stacked);
        }

        let mut archive = YearlyArchive {
            year,
            dates: days.iter().map(|d| d.date).collect(),
            latitudes: self.grid.latitudes.clone(),
            longitudes: self.grid.longitudes.clone(),
            variables,
            attrs: first.attrs.clone(),
            description: self.config.description.clone(),
        };
        if let Some(transform) = &self.post_transform {
            archive = transform.apply(archive)?;
        }

        self.store.save(&archive)?;
        Ok(Some(archive))
    }

    /// Process every requested date, writing one archive per year with data
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let groups = year_groups(
            self.config.start_date,
            self.config.end_date,
            self.config.sampling,
        )?;
        info!(
            start = %self.config.start_date,
            end = %self.config.end_date,
            method = %self.config.method,
            nlat = self.grid.nlat(),
            nlon = self.grid.nlon(),
            "starting extraction"
        );

        let mut run = YearRun {
            pipeline: self,
            pending: Vec::new(),
            requested: 0,
            summary: RunSummary::default(),
        };
        fold_year_groups(groups, &mut run)?;
        Ok(run.summary)
    }
}

/// Fold state of one [`Pipeline::run`]
struct YearRun<'p, L: DayLoader, S: ArchiveStore> {
    pipeline: &'p mut Pipeline<L, S>,
    pending: Vec<DailyField>,
    requested: usize,
    summary: RunSummary,
}

impl<L: DayLoader, S: ArchiveStore> YearFold for YearRun<'_, L, S> {
    type Error = PipelineError;

    fn visit_date(&mut self, _year: i32, date: NaiveDate) -> Result<(), PipelineError> {
        self.requested += 1;
        match self.pipeline.process_day(date)? {
            Some(field) => self.pending.push(field),
            None => self
                .summary
                .missing_files
                .push(self.pipeline.source_path(date)),
        }
        Ok(())
    }

    fn flush_year(&mut self, year: i32) -> Result<(), PipelineError> {
        let days = std::mem::take(&mut self.pending);
        let requested = std::mem::take(&mut self.requested);
        match self.pipeline.aggregate_year(year, days)? {
            Some(archive) => self.summary.years.push(YearSummary {
                year,
                requested_days: requested,
                written_days: archive.time_steps(),
            }),
            None => self.summary.skipped_years.push(year),
        }
        Ok(())
    }
}
