use super::utils::TIME_DIM;
use super::{VariableAttrs, YearlyArchive};
use crate::time_utils::{days_since_epoch, ARCHIVE_TIME_UNITS};
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("NetCDF error writing {path}: {source}")]
    Netcdf {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl WriteError {
    fn netcdf(path: &Path) -> impl FnOnce(netcdf::Error) -> Self + '_ {
        move |source| WriteError::Netcdf {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write a yearly archive as NetCDF, replacing any existing file.
///
/// Layout: dimensions `time`, `lat`, `lon`; `time` in days since 1970-01-01;
/// each field stored as f32 `[time, lat, lon]`. No creation timestamp is
/// written, so identical archives produce identical files.
pub fn write_yearly_archive(path: &Path, archive: &YearlyArchive) -> Result<(), WriteError> {
    let nt = archive.dates.len();
    let (nlat, nlon) = (archive.latitudes.len(), archive.longitudes.len());
    if nt == 0 {
        return Err(WriteError::InvalidData(format!(
            "archive for {} has no time steps",
            archive.year
        )));
    }
    for (name, data) in &archive.variables {
        if data.dim() != (nt, nlat, nlon) {
            return Err(WriteError::InvalidData(format!(
                "variable {} has shape {:?}, expected {:?}",
                name,
                data.dim(),
                (nt, nlat, nlon)
            )));
        }
    }

    replace_existing(path)?;
    let mut file = netcdf::create(path).map_err(WriteError::netcdf(path))?;

    file.add_dimension(TIME_DIM, nt).map_err(WriteError::netcdf(path))?;
    file.add_dimension("lat", nlat).map_err(WriteError::netcdf(path))?;
    file.add_dimension("lon", nlon).map_err(WriteError::netcdf(path))?;

    file.add_attribute("Conventions", "CF-1.6")
        .map_err(WriteError::netcdf(path))?;
    file.add_attribute("source", "MERRA-2 tavg1_2d_aer_Nx daily means")
        .map_err(WriteError::netcdf(path))?;
    if let Some(description) = &archive.description {
        file.add_attribute("description", description.as_str())
            .map_err(WriteError::netcdf(path))?;
    }

    {
        let mut time_var = file
            .add_variable::<f64>(TIME_DIM, &[TIME_DIM])
            .map_err(WriteError::netcdf(path))?;
        time_var
            .put_attribute("units", ARCHIVE_TIME_UNITS)
            .map_err(WriteError::netcdf(path))?;
        time_var
            .put_attribute("calendar", "standard")
            .map_err(WriteError::netcdf(path))?;
        let times: Vec<f64> = archive.dates.iter().map(|d| days_since_epoch(*d)).collect();
        time_var
            .put_values(&times, ..)
            .map_err(WriteError::netcdf(path))?;
    }

    put_axis(&mut file, path, "lat", &archive.latitudes, "degrees_north")?;
    put_axis(&mut file, path, "lon", &archive.longitudes, "degrees_east")?;

    for (name, data) in &archive.variables {
        let mut var = file
            .add_variable::<f32>(name, &[TIME_DIM, "lat", "lon"])
            .map_err(WriteError::netcdf(path))?;
        let attrs = archive.attrs.get(name).cloned().unwrap_or_default();
        put_variable_attrs(&mut var, path, &attrs)?;
        let values: Vec<f32> = data.iter().copied().collect();
        var.put_values(&values, ..).map_err(WriteError::netcdf(path))?;
    }

    info!(
        path = %path.display(),
        year = archive.year,
        time_steps = nt,
        variables = archive.variables.len(),
        "wrote yearly archive"
    );
    Ok(())
}

/// Write a 2-D `[lat, lon]` map, e.g. a difference of period means
pub fn write_field_map(
    path: &Path,
    variable: &str,
    latitudes: &Array1<f64>,
    longitudes: &Array1<f64>,
    values: &Array2<f64>,
    description: Option<&str>,
) -> Result<(), WriteError> {
    if values.dim() != (latitudes.len(), longitudes.len()) {
        return Err(WriteError::InvalidData(format!(
            "map shape {:?} does not match grid ({}, {})",
            values.dim(),
            latitudes.len(),
            longitudes.len()
        )));
    }

    replace_existing(path)?;
    let mut file = netcdf::create(path).map_err(WriteError::netcdf(path))?;
    file.add_dimension("lat", latitudes.len())
        .map_err(WriteError::netcdf(path))?;
    file.add_dimension("lon", longitudes.len())
        .map_err(WriteError::netcdf(path))?;
    if let Some(description) = description {
        file.add_attribute("description", description)
            .map_err(WriteError::netcdf(path))?;
    }

    put_axis(&mut file, path, "lat", latitudes, "degrees_north")?;
    put_axis(&mut file, path, "lon", longitudes, "degrees_east")?;

    let mut var = file
        .add_variable::<f64>(variable, &["lat", "lon"])
        .map_err(WriteError::netcdf(path))?;
    let flat: Vec<f64> = values.iter().copied().collect();
    var.put_values(&flat, ..).map_err(WriteError::netcdf(path))?;
    Ok(())
}

fn put_axis(
    file: &mut netcdf::FileMut,
    path: &Path,
    name: &str,
    values: &Array1<f64>,
    units: &str,
) -> Result<(), WriteError> {
    let mut var = file
        .add_variable::<f64>(name, &[name])
        .map_err(WriteError::netcdf(path))?;
    var.put_attribute("units", units)
        .map_err(WriteError::netcdf(path))?;
    let values: Vec<f64> = values.to_vec();
    var.put_values(&values, ..).map_err(WriteError::netcdf(path))?;
    Ok(())
}

fn put_variable_attrs(
    var: &mut netcdf::VariableMut,
    path: &Path,
    attrs: &VariableAttrs,
) -> Result<(), WriteError> {
    if let Some(units) = &attrs.units {
        var.put_attribute("units", units.as_str())
            .map_err(WriteError::netcdf(path))?;
    }
    if let Some(long_name) = &attrs.long_name {
        var.put_attribute("long_name", long_name.as_str())
            .map_err(WriteError::netcdf(path))?;
    }
    Ok(())
}

fn replace_existing(path: &Path) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
