pub mod archive;
pub mod ascii_writer;
pub mod reader;
pub mod utils;
pub mod writer;

pub use archive::*;
pub use reader::*;
pub use writer::*;

use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3};
use std::collections::BTreeMap;

/// Descriptive attributes carried alongside a variable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableAttrs {
    pub units: Option<String>,
    pub long_name: Option<String>,
}

/// One day's source granule on its native grid
#[derive(Debug, Clone)]
pub struct RawDay {
    /// Date the granule covers
    pub date: NaiveDate,
    /// Native latitude axis (degrees north)
    pub latitudes: Array1<f64>,
    /// Native longitude axis (degrees east)
    pub longitudes: Array1<f64>,
    /// Fields with layout [time, lat, lon]
    pub variables: BTreeMap<String, Array3<f32>>,
    pub attrs: BTreeMap<String, VariableAttrs>,
}

impl RawDay {
    /// Number of intraday samples, taken from the first variable
    pub fn time_steps(&self) -> usize {
        self.variables
            .values()
            .next()
            .map(|v| v.dim().0)
            .unwrap_or(0)
    }
}

/// Daily-mean fields on the target grid
#[derive(Debug, Clone)]
pub struct DailyField {
    pub date: NaiveDate,
    /// Fields with layout [lat, lon]
    pub variables: BTreeMap<String, Array2<f32>>,
    pub attrs: BTreeMap<String, VariableAttrs>,
}

/// One calendar year of daily fields, persisted as a single archive
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyArchive {
    pub year: i32,
    /// Dates that produced output, strictly increasing
    pub dates: Vec<NaiveDate>,
    pub latitudes: Array1<f64>,
    pub longitudes: Array1<f64>,
    /// Fields with layout [time, lat, lon]
    pub variables: BTreeMap<String, Array3<f32>>,
    pub attrs: BTreeMap<String, VariableAttrs>,
    /// Free-text description written as a global attribute
    pub description: Option<String>,
}

impl YearlyArchive {
    pub fn time_steps(&self) -> usize {
        self.dates.len()
    }

    /// Extract a single variable
    pub fn variable(&self, name: &str) -> Option<ArchiveVariable> {
        self.variables.get(name).map(|data| ArchiveVariable {
            year: self.year,
            dates: self.dates.clone(),
            latitudes: self.latitudes.clone(),
            longitudes: self.longitudes.clone(),
            data: data.clone(),
        })
    }
}

/// A single variable of a yearly archive
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveVariable {
    pub year: i32,
    pub dates: Vec<NaiveDate>,
    pub latitudes: Array1<f64>,
    pub longitudes: Array1<f64>,
    /// Layout [time, lat, lon]
    pub data: Array3<f32>,
}
