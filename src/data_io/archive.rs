//! Persistence of yearly archives.
//!
//! The pipeline flushes one [`YearlyArchive`] per year through an
//! [`ArchiveStore`]; the analysis stage reads them back one year and one
//! variable at a time through the same trait.

use super::reader::{read_archive_variable, read_yearly_archive, ReaderError};
use super::writer::{write_yearly_archive, WriteError};
use super::{ArchiveVariable, YearlyArchive};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the archive for `year`
pub fn archive_file_name(year: i32) -> String {
    format!("merra_2_daily_{}.nc", year)
}

/// Year encoded in an archive file name, if it follows the convention
pub fn parse_archive_year(file_name: &str) -> Option<i32> {
    file_name
        .strip_prefix("merra_2_daily_")?
        .strip_suffix(".nc")?
        .parse()
        .ok()
}

/// Storage for yearly archives keyed by year
pub trait ArchiveStore {
    /// Persist an archive, replacing any earlier one for the same year
    fn save(&mut self, archive: &YearlyArchive) -> Result<(), WriteError>;

    fn contains(&self, year: i32) -> bool;

    /// Years with a stored archive, ascending
    fn years(&self) -> Result<Vec<i32>, ReaderError>;

    fn load(&self, year: i32) -> Result<YearlyArchive, ReaderError>;

    fn load_variable(&self, year: i32, variable: &str) -> Result<ArchiveVariable, ReaderError>;
}

/// Archives stored as `merra_2_daily_<year>.nc` files in one directory
#[derive(Debug, Clone)]
pub struct NetCDFArchiveStore {
    dir: PathBuf,
}

impl NetCDFArchiveStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, year: i32) -> PathBuf {
        self.dir.join(archive_file_name(year))
    }
}

impl ArchiveStore for NetCDFArchiveStore {
    fn save(&mut self, archive: &YearlyArchive) -> Result<(), WriteError> {
        write_yearly_archive(&self.path_for(archive.year), archive)
    }

    fn contains(&self, year: i32) -> bool {
        self.path_for(year).is_file()
    }

    fn years(&self) -> Result<Vec<i32>, ReaderError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut years = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(year) = entry.file_name().to_str().and_then(parse_archive_year) {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    fn load(&self, year: i32) -> Result<YearlyArchive, ReaderError> {
        let path = self.path_for(year);
        if !path.is_file() {
            return Err(ReaderError::ArchiveNotFound(year));
        }
        read_yearly_archive(&path, year)
    }

    fn load_variable(&self, year: i32, variable: &str) -> Result<ArchiveVariable, ReaderError> {
        let path = self.path_for(year);
        if !path.is_file() {
            return Err(ReaderError::ArchiveNotFound(year));
        }
        read_archive_variable(&path, year, variable)
    }
}

/// In-memory archive store
#[derive(Debug, Clone, Default)]
pub struct MemoryArchiveStore {
    archives: BTreeMap<i32, YearlyArchive>,
    saves: usize,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, year: i32) -> Option<&YearlyArchive> {
        self.archives.get(&year)
    }

    /// Number of `save` calls, including overwrites
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn save(&mut self, archive: &YearlyArchive) -> Result<(), WriteError> {
        self.archives.insert(archive.year, archive.clone());
        self.saves += 1;
        Ok(())
    }

    fn contains(&self, year: i32) -> bool {
        self.archives.contains_key(&year)
    }

    fn years(&self) -> Result<Vec<i32>, ReaderError> {
        Ok(self.archives.keys().copied().collect())
    }

    fn load(&self, year: i32) -> Result<YearlyArchive, ReaderError> {
        self.archives
            .get(&year)
            .cloned()
            .ok_or(ReaderError::ArchiveNotFound(year))
    }

    fn load_variable(&self, year: i32, variable: &str) -> Result<ArchiveVariable, ReaderError> {
        let archive = self
            .archives
            .get(&year)
            .ok_or(ReaderError::ArchiveNotFound(year))?;
        archive
            .variable(variable)
            .ok_or_else(|| ReaderError::MissingVariable {
                path: PathBuf::from(archive_file_name(year)),
                name: variable.to_string(),
            })
    }
}
