use super::utils::{
    global_string_attr, read_axis, string_attr, variable_attrs, Unpacking, LAT_ALIASES,
    LON_ALIASES, TIME_DIM,
};
use super::{ArchiveVariable, RawDay, VariableAttrs, YearlyArchive};
use crate::time_utils::{decode_time_values, DateRangeError};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array3};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error in {path}: {source}")]
    Netcdf {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("Variable not found in {path}: {name}")]
    MissingVariable { path: PathBuf, name: String },

    #[error("Coordinate not found in {path}: tried {tried:?}")]
    MissingCoordinate {
        path: PathBuf,
        tried: &'static [&'static str],
    },

    #[error("Unexpected layout in {path}: {details}")]
    Layout { path: PathBuf, details: String },

    #[error("Invalid time coordinate in {path}: {source}")]
    Time {
        path: PathBuf,
        #[source]
        source: DateRangeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No archive for year {0}")]
    ArchiveNotFound(i32),
}

impl ReaderError {
    fn netcdf(path: &Path) -> impl FnOnce(netcdf::Error) -> Self + '_ {
        move |source| ReaderError::Netcdf {
            path: path.to_path_buf(),
            source,
        }
    }

    fn layout(path: &Path, details: impl Into<String>) -> Self {
        ReaderError::Layout {
            path: path.to_path_buf(),
            details: details.into(),
        }
    }
}

/// Source of per-day raw granules
pub trait DayLoader {
    /// Whether a source file is present
    fn exists(&self, path: &Path) -> bool;

    /// Load one granule, optionally restricted to `variables`.
    ///
    /// Any file handle is released before returning, on success or failure.
    fn load(
        &self,
        path: &Path,
        date: NaiveDate,
        variables: Option<&[String]>,
    ) -> Result<RawDay, ReaderError>;
}

/// Reader for MERRA-2 granules stored as NetCDF-4
#[derive(Debug, Clone, Default)]
pub struct NetCDFDayLoader;

impl NetCDFDayLoader {
    pub fn new() -> Self {
        Self
    }
}

impl DayLoader for NetCDFDayLoader {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn load(
        &self,
        path: &Path,
        date: NaiveDate,
        variables: Option<&[String]>,
    ) -> Result<RawDay, ReaderError> {
        // The handle is dropped, and the file closed, when this scope ends
        let file = netcdf::open(path).map_err(ReaderError::netcdf(path))?;

        let (lat_name, latitudes) = read_coordinate(&file, path, LAT_ALIASES)?;
        let (lon_name, longitudes) = read_coordinate(&file, path, LON_ALIASES)?;

        let names: Vec<String> = match variables {
            Some(list) => list.to_vec(),
            None => file
                .variables()
                .filter(|var| {
                    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
                    dims == [TIME_DIM, lat_name.as_str(), lon_name.as_str()]
                })
                .map(|var| var.name())
                .collect(),
        };
        if names.is_empty() {
            return Err(ReaderError::layout(path, "no [time, lat, lon] variables"));
        }

        let mut fields = BTreeMap::new();
        let mut attrs = BTreeMap::new();
        for name in names {
            let var = file
                .variable(&name)
                .ok_or_else(|| ReaderError::MissingVariable {
                    path: path.to_path_buf(),
                    name: name.clone(),
                })?;
            let data = read_field(&var, path, &lat_name, &lon_name)?;
            if data.iter().all(|v| v.is_nan()) {
                warn!(path = %path.display(), variable = %name, "variable is entirely missing");
            }
            attrs.insert(name.clone(), variable_attrs(&var));
            fields.insert(name, data);
        }

        let day = RawDay {
            date,
            latitudes: Array1::from(latitudes),
            longitudes: Array1::from(longitudes),
            variables: fields,
            attrs,
        };
        debug!(
            path = %path.display(),
            variables = day.variables.len(),
            time_steps = day.time_steps(),
            nlat = day.latitudes.len(),
            nlon = day.longitudes.len(),
            "loaded granule"
        );
        Ok(day)
    }
}

fn read_coordinate(
    file: &netcdf::File,
    path: &Path,
    aliases: &'static [&'static str],
) -> Result<(String, Vec<f64>), ReaderError> {
    for name in aliases {
        if let Some(var) = file.variable(name) {
            let values = read_axis(&var).map_err(ReaderError::netcdf(path))?;
            return Ok((name.to_string(), values));
        }
    }
    Err(ReaderError::MissingCoordinate {
        path: path.to_path_buf(),
        tried: aliases,
    })
}

/// Read a `[time, lat, lon]` variable with fill values mapped to NaN
fn read_field(
    var: &netcdf::Variable,
    path: &Path,
    lat_name: &str,
    lon_name: &str,
) -> Result<Array3<f32>, ReaderError> {
    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|d| (d.name(), d.len()))
        .collect();
    let layout_ok = dims.len() == 3
        && dims[0].0 == TIME_DIM
        && dims[1].0 == lat_name
        && dims[2].0 == lon_name;
    if !layout_ok {
        return Err(ReaderError::layout(
            path,
            format!(
                "variable {} has dimensions {:?}, expected [{}, {}, {}]",
                var.name(),
                dims.iter().map(|d| d.0.as_str()).collect::<Vec<_>>(),
                TIME_DIM,
                lat_name,
                lon_name
            ),
        ));
    }

    let unpacking = Unpacking::from_variable(var);
    let raw: Vec<f32> = var.get_values(..).map_err(ReaderError::netcdf(path))?;
    let values: Vec<f32> = raw.into_iter().map(|v| unpacking.apply(v)).collect();

    Array3::from_shape_vec((dims[0].1, dims[1].1, dims[2].1), values)
        .map_err(|e| ReaderError::layout(path, e.to_string()))
}

/// Read one variable of a yearly archive
pub fn read_archive_variable(
    path: &Path,
    year: i32,
    variable: &str,
) -> Result<ArchiveVariable, ReaderError> {
    let file = netcdf::open(path).map_err(ReaderError::netcdf(path))?;
    let (lat_name, latitudes) = read_coordinate(&file, path, LAT_ALIASES)?;
    let (lon_name, longitudes) = read_coordinate(&file, path, LON_ALIASES)?;
    let dates = read_archive_dates(&file, path)?;

    let var = file
        .variable(variable)
        .ok_or_else(|| ReaderError::MissingVariable {
            path: path.to_path_buf(),
            name: variable.to_string(),
        })?;
    let data = read_field(&var, path, &lat_name, &lon_name)?;
    if data.dim().0 != dates.len() {
        return Err(ReaderError::layout(
            path,
            format!(
                "time coordinate has {} entries but {} has {}",
                dates.len(),
                variable,
                data.dim().0
            ),
        ));
    }

    Ok(ArchiveVariable {
        year,
        dates,
        latitudes: Array1::from(latitudes),
        longitudes: Array1::from(longitudes),
        data,
    })
}

/// Read every variable of a yearly archive
pub fn read_yearly_archive(path: &Path, year: i32) -> Result<YearlyArchive, ReaderError> {
    let file = netcdf::open(path).map_err(ReaderError::netcdf(path))?;
    let (lat_name, latitudes) = read_coordinate(&file, path, LAT_ALIASES)?;
    let (lon_name, longitudes) = read_coordinate(&file, path, LON_ALIASES)?;
    let dates = read_archive_dates(&file, path)?;

    let mut variables = BTreeMap::new();
    let mut attrs: BTreeMap<String, VariableAttrs> = BTreeMap::new();
    for var in file.variables() {
        let is_field = var.dimensions().len() == 3;
        if !is_field {
            continue;
        }
        let name = var.name();
        variables.insert(name.clone(), read_field(&var, path, &lat_name, &lon_name)?);
        attrs.insert(name, variable_attrs(&var));
    }

    Ok(YearlyArchive {
        year,
        dates,
        latitudes: Array1::from(latitudes),
        longitudes: Array1::from(longitudes),
        variables,
        attrs,
        description: global_string_attr(&file, "description"),
    })
}

fn read_archive_dates(file: &netcdf::File, path: &Path) -> Result<Vec<NaiveDate>, ReaderError> {
    let time = file
        .variable(TIME_DIM)
        .ok_or_else(|| ReaderError::MissingVariable {
            path: path.to_path_buf(),
            name: TIME_DIM.to_string(),
        })?;
    let units = string_attr(&time, "units")
        .ok_or_else(|| ReaderError::layout(path, "time variable has no units"))?;
    let values = read_axis(&time).map_err(ReaderError::netcdf(path))?;
    let stamps = decode_time_values(&values, &units).map_err(|source| ReaderError::Time {
        path: path.to_path_buf(),
        source,
    })?;

    let dates: Vec<NaiveDate> = stamps.into_iter().map(|dt| dt.date()).collect();
    if dates.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ReaderError::layout(path, "time coordinate is not strictly increasing"));
    }
    if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
        if first.year() != last.year() {
            warn!(path = %path.display(), "archive spans more than one calendar year");
        }
    }
    Ok(dates)
}
