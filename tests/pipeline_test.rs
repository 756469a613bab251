use chrono::{Datelike, NaiveDate};
use merra2_rust::config::{ConfigError, ExtractConfig};
use merra2_rust::data_io::{
    ArchiveStore, DayLoader, MemoryArchiveStore, RawDay, ReaderError, VariableAttrs, YearlyArchive,
};
use merra2_rust::math::InterpMethod;
use merra2_rust::naming::{source_path, Merra2Naming};
use merra2_rust::pipeline::{Pipeline, PipelineError};
use merra2_rust::time_utils::DateRangeError;
use ndarray::{Array1, Array3};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

const INPUT_DIR: &str = "/fake/merra2";
const STEPS: usize = 24;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// In-memory granule source. Each variable is spatially constant with
/// value `scale * day_of_year + hour`.
struct FakeLoader {
    available: HashSet<PathBuf>,
    variables: Vec<(String, f32)>,
    unreadable: HashSet<PathBuf>,
    loads: RefCell<Vec<PathBuf>>,
    exists_calls: RefCell<usize>,
}

impl FakeLoader {
    fn with_dates(dates: &[NaiveDate]) -> Self {
        let naming = Merra2Naming::default();
        Self {
            available: dates
                .iter()
                .map(|d| source_path(Path::new(INPUT_DIR), &naming, *d))
                .collect(),
            variables: vec![("DUEXTT25".to_string(), 1.0), ("DUSMASS".to_string(), 10.0)],
            unreadable: HashSet::new(),
            loads: RefCell::new(Vec::new()),
            exists_calls: RefCell::new(0),
        }
    }

    fn with_paths(paths: &[PathBuf]) -> Self {
        let mut loader = Self::with_dates(&[]);
        loader.available = paths.iter().cloned().collect();
        loader
    }

    /// Present on disk but failing to decode
    fn with_unreadable(mut self, date: NaiveDate) -> Self {
        let path = source_path(Path::new(INPUT_DIR), &Merra2Naming::default(), date);
        self.available.insert(path.clone());
        self.unreadable.insert(path);
        self
    }

    fn load_count(&self) -> usize {
        self.loads.borrow().len()
    }
}

impl DayLoader for FakeLoader {
    fn exists(&self, path: &Path) -> bool {
        *self.exists_calls.borrow_mut() += 1;
        self.available.contains(path)
    }

    fn load(
        &self,
        path: &Path,
        date: NaiveDate,
        variables: Option<&[String]>,
    ) -> Result<RawDay, ReaderError> {
        self.loads.borrow_mut().push(path.to_path_buf());
        if self.unreadable.contains(path) {
            return Err(ReaderError::Layout {
                path: path.to_path_buf(),
                details: "truncated HDF5 header".to_string(),
            });
        }

        let wanted: Vec<(String, f32)> = match variables {
            None => self.variables.clone(),
            Some(list) => list
                .iter()
                .map(|name| {
                    self.variables
                        .iter()
                        .find(|(v, _)| v == name)
                        .cloned()
                        .ok_or_else(|| ReaderError::MissingVariable {
                            path: path.to_path_buf(),
                            name: name.clone(),
                        })
                })
                .collect::<Result<_, _>>()?,
        };

        let latitudes = Array1::range(-12.0, 12.5, 0.5);
        let longitudes = Array1::range(-25.0, 25.0, 0.625);
        let (nlat, nlon) = (latitudes.len(), longitudes.len());

        let mut fields = BTreeMap::new();
        let mut attrs = BTreeMap::new();
        for (name, scale) in wanted {
            let base = scale * date.ordinal() as f32;
            fields.insert(
                name.clone(),
                Array3::from_shape_fn((STEPS, nlat, nlon), |(t, _, _)| base + t as f32),
            );
            attrs.insert(
                name,
                VariableAttrs {
                    units: Some("1".to_string()),
                    long_name: None,
                },
            );
        }

        Ok(RawDay {
            date,
            latitudes,
            longitudes,
            variables: fields,
            attrs,
        })
    }
}

fn config(start: NaiveDate, end: NaiveDate) -> ExtractConfig {
    ExtractConfig::default()
        .with_dates(start, end)
        .with_input_dir(INPUT_DIR)
        .with_grid((-10.0, 10.0), (-20.0, 20.0), 1.0)
}

/// Expected daily mean of a variable with the given scale
fn expected_mean(scale: f32, date: NaiveDate) -> f32 {
    scale * date.ordinal() as f32 + (STEPS as f32 - 1.0) / 2.0
}

fn assert_close(a: f32, b: f32) {
    assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
}

#[test]
fn test_three_days_one_archive() {
    let dates = [ymd(2010, 1, 1), ymd(2010, 1, 2), ymd(2010, 1, 3)];
    let mut pipeline = Pipeline::new(
        config(dates[0], dates[2]),
        FakeLoader::with_dates(&dates),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.archives_written(), 1);
    assert_eq!(summary.written_days(), 3);
    assert!(summary.missing_files.is_empty());

    let archive = pipeline.store().get(2010).unwrap();
    assert_eq!(archive.dates, dates.to_vec());
    assert_eq!(archive.latitudes.len(), 20);
    assert_eq!(archive.longitudes.len(), 40);
    let duextt = &archive.variables["DUEXTT25"];
    assert_eq!(duextt.dim(), (3, 20, 40));
    for (t, date) in dates.iter().enumerate() {
        assert_close(duextt[[t, 0, 0]], expected_mean(1.0, *date));
        assert_close(duextt[[t, 19, 39]], expected_mean(1.0, *date));
        assert_close(archive.variables["DUSMASS"][[t, 7, 11]], expected_mean(10.0, *date));
    }

    // 2010 is served by the early-epoch stream
    for path in pipeline.loader().loads.borrow().iter() {
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("MERRA2_300.tavg1_2d_aer_Nx.201001"));
    }
}

#[test]
fn test_missing_day_is_skipped() {
    let present = [ymd(2010, 1, 1), ymd(2010, 1, 3)];
    let mut pipeline = Pipeline::new(
        config(ymd(2010, 1, 1), ymd(2010, 1, 3)),
        FakeLoader::with_dates(&present),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.missing_files.len(), 1);
    assert!(summary.missing_files[0].ends_with("2010/MERRA2_300.tavg1_2d_aer_Nx.20100102.nc4"));
    assert_eq!(summary.years[0].requested_days, 3);
    assert_eq!(summary.years[0].written_days, 2);

    let archive = pipeline.store().get(2010).unwrap();
    assert_eq!(archive.dates, present.to_vec());
    assert_eq!(archive.variables["DUEXTT25"].dim().0, 2);
    assert_close(
        archive.variables["DUEXTT25"][[1, 3, 3]],
        expected_mean(1.0, present[1]),
    );
}

#[test]
fn test_year_without_files_writes_nothing() {
    let present = [ymd(2012, 1, 1)];
    let mut pipeline = Pipeline::new(
        config(ymd(2011, 12, 30), ymd(2012, 1, 1)),
        FakeLoader::with_dates(&present),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.skipped_years, vec![2011]);
    assert!(!pipeline.store().contains(2011));
    assert!(pipeline.store().contains(2012));
    assert_eq!(pipeline.store().save_count(), 1);
}

#[test]
fn test_no_files_at_all() {
    let mut pipeline = Pipeline::new(
        config(ymd(2015, 3, 1), ymd(2015, 3, 5)),
        FakeLoader::with_dates(&[]),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    let summary = pipeline.run().unwrap();
    assert_eq!(summary.archives_written(), 0);
    assert_eq!(summary.missing_files.len(), 5);
    assert_eq!(pipeline.store().years().unwrap(), Vec::<i32>::new());
}

#[test]
fn test_reprocessed_month_naming() {
    let date = ymd(2020, 9, 1);
    let mut pipeline = Pipeline::new(
        config(date, date),
        FakeLoader::with_dates(&[date]),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    assert!(pipeline
        .source_path(date)
        .ends_with("2020/MERRA2_401.tavg1_2d_aer_Nx.20200901.nc4"));
    pipeline.run().unwrap();
    assert_eq!(pipeline.loader().load_count(), 1);
    assert_eq!(pipeline.store().get(2020).unwrap().dates, vec![date]);
}

#[test]
fn test_full_years_have_one_step_per_day() {
    let start = ymd(2019, 12, 1);
    let end = ymd(2020, 1, 31);
    let dates = merra2_rust::time_utils::date_range(start, end).unwrap();
    let mut pipeline = Pipeline::new(
        config(start, end).with_method(InterpMethod::Linear),
        FakeLoader::with_dates(&dates),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.years.len(), 2);
    for year in &summary.years {
        assert_eq!(year.requested_days, 31);
        assert_eq!(year.written_days, 31);
        let archive = pipeline.store().get(year.year).unwrap();
        assert_eq!(archive.time_steps(), 31);
        assert!(archive.dates.iter().all(|d| d.year() == year.year));
        assert!(archive.dates.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_invalid_range_fails_before_io() {
    let result = Pipeline::new(
        config(ymd(2012, 1, 1), ymd(2011, 1, 1)),
        FakeLoader::with_dates(&[]),
        MemoryArchiveStore::new(),
    );
    assert!(matches!(
        result,
        Err(PipelineError::Config(ConfigError::Date(DateRangeError::InvalidRange { .. })))
    ));
}

#[test]
fn test_variable_allow_list() {
    let date = ymd(2016, 5, 5);
    let mut pipeline = Pipeline::new(
        config(date, date).with_variables(["DUSMASS"]),
        FakeLoader::with_dates(&[date]),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    pipeline.run().unwrap();
    let archive = pipeline.store().get(2016).unwrap();
    assert_eq!(archive.variables.keys().collect::<Vec<_>>(), vec!["DUSMASS"]);
    assert_eq!(archive.attrs["DUSMASS"].units.as_deref(), Some("1"));
}

#[test]
fn test_listed_variable_absent_is_fatal() {
    let date = ymd(2016, 5, 5);
    let mut pipeline = Pipeline::new(
        config(date, date).with_variables(["DUEXTT25", "BCEXTTAU"]),
        FakeLoader::with_dates(&[date]),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    let err = pipeline.run().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Reader(ReaderError::MissingVariable { ref name, .. }) if name == "BCEXTTAU"
    ));
    assert!(!pipeline.store().contains(2016));
}

#[test]
fn test_unreadable_source_is_fatal_for_its_year() {
    let loader = FakeLoader::with_dates(&[ymd(2015, 12, 30), ymd(2015, 12, 31), ymd(2016, 1, 1)])
        .with_unreadable(ymd(2016, 1, 2));
    let mut pipeline = Pipeline::new(
        config(ymd(2015, 12, 30), ymd(2016, 1, 3)),
        loader,
        MemoryArchiveStore::new(),
    )
    .unwrap();

    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::Reader(ReaderError::Layout { .. })));

    // The finished year survives, the failing year is never written
    assert!(pipeline.store().contains(2015));
    assert!(!pipeline.store().contains(2016));
    assert_eq!(pipeline.store().get(2015).unwrap().time_steps(), 2);
    // Nothing after the failing day is read
    assert_eq!(pipeline.loader().load_count(), 4);
}

fn drop_dusmass_on_odd_days(mut day: RawDay) -> Result<RawDay, PipelineError> {
    if day.date.day() % 2 == 1 {
        day.variables.remove("DUSMASS");
    }
    Ok(day)
}

#[test]
fn test_inconsistent_variables_within_year() {
    let dates = [ymd(2016, 5, 4), ymd(2016, 5, 5)];
    let mut pipeline = Pipeline::new(
        config(dates[0], dates[1]),
        FakeLoader::with_dates(&dates),
        MemoryArchiveStore::new(),
    )
    .unwrap()
    .with_pre_transform(drop_dusmass_on_odd_days);
    let err = pipeline.run().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InconsistentVariables { date, .. } if date == dates[1]
    ));
    assert_eq!(pipeline.store().save_count(), 0);
}

fn double_fields(mut day: RawDay) -> Result<RawDay, PipelineError> {
    for field in day.variables.values_mut() {
        field.mapv_inplace(|v| v * 2.0);
    }
    Ok(day)
}

fn tag_archive(mut archive: YearlyArchive) -> Result<YearlyArchive, PipelineError> {
    archive.description = Some(format!("tagged {}", archive.year));
    Ok(archive)
}

#[test]
fn test_pre_and_post_transforms() {
    let date = ymd(2014, 2, 10);
    let mut pipeline = Pipeline::new(
        config(date, date),
        FakeLoader::with_dates(&[date]),
        MemoryArchiveStore::new(),
    )
    .unwrap()
    .with_pre_transform(double_fields)
    .with_post_transform(tag_archive);
    pipeline.run().unwrap();

    let archive = pipeline.store().get(2014).unwrap();
    assert_eq!(archive.description.as_deref(), Some("tagged 2014"));
    assert_close(
        archive.variables["DUEXTT25"][[0, 5, 5]],
        2.0 * expected_mean(1.0, date),
    );
}

#[test]
fn test_custom_namer_used_for_every_date() {
    let start = ymd(2020, 8, 31);
    let end = ymd(2020, 9, 2);
    let paths: Vec<PathBuf> = merra2_rust::time_utils::date_range(start, end)
        .unwrap()
        .iter()
        .map(|d| Path::new(INPUT_DIR).join("2020").join(format!("dust_{}.nc", d.format("%j"))))
        .collect();
    let mut pipeline = Pipeline::new(
        config(start, end),
        FakeLoader::with_paths(&paths),
        MemoryArchiveStore::new(),
    )
    .unwrap()
    .with_namer(|date: NaiveDate| format!("dust_{}.nc", date.format("%j")));
    let summary = pipeline.run().unwrap();

    assert!(summary.missing_files.is_empty());
    assert_eq!(*pipeline.loader().loads.borrow(), paths);
}

#[test]
fn test_rerun_overwrites_with_identical_content() {
    let dates = [ymd(2013, 7, 1), ymd(2013, 7, 2)];
    let mut pipeline = Pipeline::new(
        config(dates[0], dates[1]).with_description("dust test"),
        FakeLoader::with_dates(&dates),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    pipeline.run().unwrap();
    let first = pipeline.store().get(2013).unwrap().clone();
    pipeline.run().unwrap();

    assert_eq!(pipeline.store().save_count(), 2);
    assert_eq!(pipeline.store().years().unwrap(), vec![2013]);
    assert_eq!(pipeline.store().get(2013).unwrap(), &first);
    assert_eq!(first.description.as_deref(), Some("dust test"));
}

#[test]
fn test_leading_days_sampling() {
    let start = ymd(2018, 1, 1);
    let end = ymd(2018, 2, 28);
    let dates = merra2_rust::time_utils::date_range(start, end).unwrap();
    let mut pipeline = Pipeline::new(
        config(start, end).with_sampling(merra2_rust::time_utils::DateSampling::LeadingDaysOfMonth(3)),
        FakeLoader::with_dates(&dates),
        MemoryArchiveStore::new(),
    )
    .unwrap();
    pipeline.run().unwrap();
    let archive = pipeline.store().get(2018).unwrap();
    assert_eq!(
        archive.dates,
        vec![
            ymd(2018, 1, 1),
            ymd(2018, 1, 2),
            ymd(2018, 1, 3),
            ymd(2018, 2, 1),
            ymd(2018, 2, 2),
            ymd(2018, 2, 3)
        ]
    );
}
