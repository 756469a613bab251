use crate::math::interpolate::{AxisInterpolator, InterpError, InterpMethod};
use ndarray::{Array1, Array3, ArrayView3, Axis};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid resolution must be positive, got {0}")]
    InvalidResolution(f64),

    #[error("Empty {axis} range [{start}, {stop})")]
    EmptyRange { axis: &'static str, start: f64, stop: f64 },

    #[error("Field shape {got:?} does not match native grid {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Interpolation error: {0}")]
    Interp(#[from] InterpError),
}

/// Regular latitude/longitude target grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    /// Latitude coordinates (degrees north), ascending
    pub latitudes: Array1<f64>,
    /// Longitude coordinates (degrees east), ascending
    pub longitudes: Array1<f64>,
}

impl GridSpec {
    /// Build a grid from half-open ranges `[start, stop)` stepped by `resolution`
    pub fn regular(
        lat_range: (f64, f64),
        lon_range: (f64, f64),
        resolution: f64,
    ) -> Result<Self, GridError> {
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(GridError::InvalidResolution(resolution));
        }
        Ok(Self {
            latitudes: arange("latitude", lat_range, resolution)?,
            longitudes: arange("longitude", lon_range, resolution)?,
        })
    }

    /// Full globe at the given resolution: latitude [-90, 90), longitude [-180, 180)
    pub fn global(resolution: f64) -> Result<Self, GridError> {
        Self::regular((-90.0, 90.0), (-180.0, 180.0), resolution)
    }

    pub fn nlat(&self) -> usize {
        self.latitudes.len()
    }

    pub fn nlon(&self) -> usize {
        self.longitudes.len()
    }
}

fn arange(axis: &'static str, (start, stop): (f64, f64), step: f64) -> Result<Array1<f64>, GridError> {
    let steps = ((stop - start) / step - 1e-9).ceil();
    if !(steps >= 1.0) {
        return Err(GridError::EmptyRange { axis, start, stop });
    }
    Ok(Array1::from_iter((0..steps as usize).map(|i| start + i as f64 * step)))
}

/// Separable lat/lon regridder from one native grid onto a target grid.
///
/// Longitude is interpolated first, then latitude. The leading time axis is
/// carried through untouched.
#[derive(Debug, Clone)]
pub struct Regridder {
    lat: AxisInterpolator,
    lon: AxisInterpolator,
}

impl Regridder {
    pub fn new(
        native_lat: &[f64],
        native_lon: &[f64],
        target: &GridSpec,
        method: InterpMethod,
    ) -> Result<Self, GridError> {
        let target_lat = target.latitudes.to_vec();
        let target_lon = target.longitudes.to_vec();
        Ok(Self {
            lat: AxisInterpolator::new(native_lat, &target_lat, method)?,
            lon: AxisInterpolator::new(native_lon, &target_lon, method)?,
        })
    }

    /// Regrid a `[time, lat, lon]` field
    pub fn regrid(&self, data: ArrayView3<f32>) -> Result<Array3<f32>, GridError> {
        let (nt, nlat, nlon) = data.dim();
        if nlat != self.lat.source_len() || nlon != self.lon.source_len() {
            return Err(GridError::ShapeMismatch {
                expected: (self.lat.source_len(), self.lon.source_len()),
                got: (nlat, nlon),
            });
        }

        let mut along_lon = Array3::<f64>::zeros((nt, nlat, self.lon.target_len()));
        for (src, mut dst) in data
            .axis_iter(Axis(0))
            .zip(along_lon.axis_iter_mut(Axis(0)))
        {
            for (row, out) in src.axis_iter(Axis(0)).zip(dst.axis_iter_mut(Axis(0))) {
                let row = row.mapv(|v| v as f64);
                self.lon.apply(row.view(), out)?;
            }
        }

        let mut regridded = Array3::<f64>::zeros((nt, self.lat.target_len(), self.lon.target_len()));
        for (src, mut dst) in along_lon
            .axis_iter(Axis(0))
            .zip(regridded.axis_iter_mut(Axis(0)))
        {
            for (column, out) in src.axis_iter(Axis(1)).zip(dst.axis_iter_mut(Axis(1))) {
                self.lat.apply(column, out)?;
            }
        }

        Ok(regridded.mapv(|v| v as f32))
    }
}
