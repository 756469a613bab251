//! Source file naming for MERRA-2 `tavg1_2d_aer_Nx` granules.
//!
//! MERRA-2 file names carry a processing-stream id that changes with the
//! production epoch and with reprocessed months, so the name of a day's file
//! is a function of its date. The built-in rule is [`Merra2Naming`]; any
//! [`FileNamer`] (including a plain closure) can replace it for a run.

use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

/// Collection short name of the hourly aerosol diagnostics product
pub const COLLECTION: &str = "tavg1_2d_aer_Nx";

/// File extension of source granules
pub const SOURCE_EXTENSION: &str = "nc4";

/// Compute a source file name from a date
pub trait FileNamer {
    fn file_name(&self, date: NaiveDate) -> String;
}

impl<F> FileNamer for F
where
    F: Fn(NaiveDate) -> String,
{
    fn file_name(&self, date: NaiveDate) -> String {
        self(date)
    }
}

/// Product naming versions, in rule priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductVersion {
    /// Early-epoch stream (version A)
    EarlyEpoch,
    /// Reprocessed month (version B)
    Reprocessed,
    /// Current production stream (version C)
    Current,
}

impl ProductVersion {
    pub fn product_id(&self) -> &'static str {
        match self {
            ProductVersion::EarlyEpoch => "MERRA2_300",
            ProductVersion::Reprocessed => "MERRA2_401",
            ProductVersion::Current => "MERRA2_400",
        }
    }
}

/// Built-in MERRA-2 naming rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merra2Naming {
    /// Year served by the early-epoch stream
    pub early_epoch_year: i32,
    /// Year of the reprocessing window
    pub reprocessed_year: i32,
    /// Month of the reprocessing window (1-12)
    pub reprocessed_month: u32,
}

impl Default for Merra2Naming {
    fn default() -> Self {
        Self {
            early_epoch_year: 2010,
            reprocessed_year: 2020,
            reprocessed_month: 9,
        }
    }
}

impl Merra2Naming {
    /// Select the product version for a date
    pub fn version(&self, date: NaiveDate) -> ProductVersion {
        if date.year() == self.early_epoch_year {
            ProductVersion::EarlyEpoch
        } else if date.year() == self.reprocessed_year && date.month() == self.reprocessed_month {
            ProductVersion::Reprocessed
        } else {
            ProductVersion::Current
        }
    }
}

impl FileNamer for Merra2Naming {
    fn file_name(&self, date: NaiveDate) -> String {
        format!(
            "{}.{}.{}.{}",
            self.version(date).product_id(),
            COLLECTION,
            date.format("%Y%m%d"),
            SOURCE_EXTENSION
        )
    }
}

/// Full path of a day's source file: `<input_dir>/<year>/<file name>`
pub fn source_path(input_dir: &Path, namer: &dyn FileNamer, date: NaiveDate) -> PathBuf {
    input_dir
        .join(date.year().to_string())
        .join(namer.file_name(date))
}
