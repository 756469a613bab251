use super::writer::WriteError;
use ndarray::Array1;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write latitude-band series as a whitespace-separated table.
///
/// One row per longitude; the first column is longitude, followed by one
/// column per year in the order given.
pub fn write_band_series(
    file_path: impl AsRef<Path>,
    variable: &str,
    lat_window: (f64, f64),
    longitudes: &Array1<f64>,
    series: &[(i32, Array1<f64>)],
) -> Result<(), WriteError> {
    for (year, values) in series {
        if values.len() != longitudes.len() {
            return Err(WriteError::InvalidData(format!(
                "series for {} has {} values but the grid has {} longitudes",
                year,
                values.len(),
                longitudes.len()
            )));
        }
    }

    let mut file = BufWriter::new(File::create(file_path)?);

    writeln!(file, "# Latitude-band mean anomaly of {}", variable)?;
    writeln!(
        file,
        "# Latitude window: {:.2} to {:.2} degrees north",
        lat_window.0, lat_window.1
    )?;
    write!(file, "# lon")?;
    for (year, _) in series {
        write!(file, " {}", year)?;
    }
    writeln!(file)?;

    for (i, lon) in longitudes.iter().enumerate() {
        write!(file, "{:.4}", lon)?;
        for (_, values) in series {
            write!(file, " {:.6e}", values[i])?;
        }
        writeln!(file)?;
    }

    file.flush()?;
    Ok(())
}
