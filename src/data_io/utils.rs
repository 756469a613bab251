/// Utility functions for NetCDF attribute and coordinate handling
use super::VariableAttrs;

/// Names tried, in order, when looking up the latitude coordinate
pub const LAT_ALIASES: &[&str] = &["lat", "latitude"];

/// Names tried, in order, when looking up the longitude coordinate
pub const LON_ALIASES: &[&str] = &["lon", "longitude"];

/// Name of the time dimension in source granules and archives
pub const TIME_DIM: &str = "time";

/// Checking before reading avoids HDF5 error output for absent attributes
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// Numeric variable attribute as f64
pub fn f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}

/// String variable attribute
pub fn string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// String global attribute
pub fn global_string_attr(file: &netcdf::File, name: &str) -> Option<String> {
    match file.attribute(name)?.value().ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// `units` and `long_name` of a variable
pub fn variable_attrs(var: &netcdf::Variable) -> VariableAttrs {
    VariableAttrs {
        units: string_attr(var, "units"),
        long_name: string_attr(var, "long_name"),
    }
}

/// Packing and missing-value conventions of a variable
#[derive(Debug, Clone, PartialEq)]
pub struct Unpacking {
    pub scale_factor: f64,
    pub add_offset: f64,
    pub fill_values: Vec<f64>,
}

impl Unpacking {
    pub fn from_variable(var: &netcdf::Variable) -> Self {
        let fill_values = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|name| f64_attr(var, name))
            .collect();
        Self {
            scale_factor: f64_attr(var, "scale_factor").unwrap_or(1.0),
            add_offset: f64_attr(var, "add_offset").unwrap_or(0.0),
            fill_values,
        }
    }

    /// Map fill values to NaN and apply scale/offset
    pub fn apply(&self, raw: f32) -> f32 {
        let raw64 = raw as f64;
        if raw.is_nan() || self.fill_values.iter().any(|&fill| is_fill(raw64, fill)) {
            return f32::NAN;
        }
        if self.scale_factor == 1.0 && self.add_offset == 0.0 {
            raw
        } else {
            (raw64 * self.scale_factor + self.add_offset) as f32
        }
    }
}

/// Fill values are stored at the variable's precision, so compare relatively
fn is_fill(value: f64, fill: f64) -> bool {
    if fill == 0.0 {
        value == 0.0
    } else {
        ((value - fill) / fill).abs() < 1e-6
    }
}

/// Read a coordinate axis as f64, accepting single-precision storage
pub fn read_axis(var: &netcdf::Variable) -> Result<Vec<f64>, netcdf::Error> {
    match var.get_values::<f64, _>(..) {
        Ok(values) => Ok(values),
        Err(_) => Ok(var
            .get_values::<f32, _>(..)?
            .into_iter()
            .map(f64::from)
            .collect()),
    }
}
