//! CSV table ingest.
//!
//! Two tables feed the pipeline:
//!
//! - the exposure lookup table (`catalogid,bluefiles,redfiles`), one row per
//!   exposure, mapping a catalog id to its blue/red arm files
//! - the reference white-dwarf catalog (GCNS photometry) used as the CMD
//!   background
//!
//! Both readers accept extra columns, strip a UTF-8 BOM and match headers
//! case-insensitively. Rows that fail to parse are collected as `RowError`s
//! rather than aborting the whole load.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::Serialize;

use crate::error::AppError;

/// A row that could not be used, with its 1-based line number in the file.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// One exposure's arm files, resolved against the data root.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureFiles {
    pub blue: PathBuf,
    pub red: PathBuf,
}

/// Rows of the lookup table matching one catalog id.
#[derive(Debug, Clone)]
pub struct LookupMatch {
    pub catalog_id: u64,
    pub files: Vec<ExposureFiles>,
    pub row_errors: Vec<RowError>,
}

/// Find every exposure of `catalog_id` in the lookup table.
///
/// Catalog ids are compared as integers, so zero-padded ids in the table
/// (`04592943353`) match the plain id given on the command line.
pub fn load_exposure_files(table: &Path, data_root: &Path, catalog_id: u64) -> Result<LookupMatch, AppError> {
    let (mut reader, header_map) = open_table(table, "lookup table")?;
    for col in ["catalogid", "bluefiles", "redfiles"] {
        if !header_map.contains_key(col) {
            return Err(AppError::input(format!(
                "Lookup table '{}' is missing required column `{col}`.",
                table.display()
            )));
        }
    }

    let mut files = Vec::new();
    let mut row_errors = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError { line, message: format!("CSV parse error: {e}") });
                continue;
            }
        };
        let parsed = get_required(&record, &header_map, "catalogid").and_then(|raw| {
            raw.parse::<u64>()
                .map_err(|_| format!("Invalid catalogid '{raw}'"))
        });
        match parsed {
            Ok(id) if id == catalog_id => {}
            Ok(_) => continue,
            Err(message) => {
                row_errors.push(RowError { line, message });
                continue;
            }
        }
        let arms = get_required(&record, &header_map, "bluefiles")
            .and_then(|b| get_required(&record, &header_map, "redfiles").map(|r| (b, r)));
        match arms {
            Ok((blue, red)) => files.push(ExposureFiles {
                blue: data_root.join(blue),
                red: data_root.join(red),
            }),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if files.is_empty() {
        return Err(AppError::input(format!(
            "Catalog id {catalog_id} has no exposures in lookup table '{}'.",
            table.display()
        )));
    }

    Ok(LookupMatch { catalog_id, files, row_errors })
}

/// A cleaned reference-catalog star in the colour–magnitude plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceStar {
    pub bp_rp: f64,
    pub g_abs: f64,
}

#[derive(Debug, Clone)]
pub struct ReferenceCatalog {
    pub stars: Vec<ReferenceStar>,
    pub rows_read: usize,
    pub row_errors: Vec<RowError>,
}

/// Minimum parallax signal-to-noise for a reference star to be plotted.
const MIN_PARALLAX_SNR: f64 = 10.0;
/// Maximum parallax error (mas).
const MAX_PARALLAX_ERROR: f64 = 0.1;

/// Load the reference white-dwarf catalog and keep stars with precise parallaxes.
///
/// Absolute magnitude is `G - 5 log10(1000 / parallax) + 5` (parallax in mas),
/// colour is `BP - RP`.
pub fn load_reference_catalog(path: &Path) -> Result<ReferenceCatalog, AppError> {
    let (mut reader, header_map) = open_table(path, "reference catalog")?;
    for col in REFERENCE_COLUMNS {
        if !header_map.contains_key(col) {
            return Err(AppError::input(format!(
                "Reference catalog '{}' is missing required column `{col}`.",
                path.display()
            )));
        }
    }

    let mut stars = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError { line, message: format!("CSV parse error: {e}") });
                continue;
            }
        };
        let row = REFERENCE_COLUMNS.map(|col| parse_opt_f64(get_optional(&record, &header_map, col)));
        let [Some(parallax), Some(parallax_error), Some(g), Some(bp), Some(rp)] = row else {
            // Missing photometry is common in the catalog; such rows simply fail the cut.
            continue;
        };
        if let Some(star) = clean_reference_star(parallax, parallax_error, g, bp, rp) {
            stars.push(star);
        }
    }

    log::debug!(
        "Reference catalog: kept {}/{} stars ({} unreadable rows).",
        stars.len(),
        rows_read,
        row_errors.len()
    );

    Ok(ReferenceCatalog { stars, rows_read, row_errors })
}

const REFERENCE_COLUMNS: [&str; 5] = [
    "parallax",
    "parallax_error",
    "phot_g_mean_mag",
    "phot_bp_mean_mag",
    "phot_rp_mean_mag",
];

fn clean_reference_star(parallax: f64, parallax_error: f64, g: f64, bp: f64, rp: f64) -> Option<ReferenceStar> {
    if !(parallax > 0.0 && parallax_error > 0.0) {
        return None;
    }
    if parallax / parallax_error <= MIN_PARALLAX_SNR || parallax_error >= MAX_PARALLAX_ERROR {
        return None;
    }
    let g_abs = g - 5.0 * (1000.0 / parallax).log10() + 5.0;
    let bp_rp = bp - rp;
    (g_abs.is_finite() && bp_rp.is_finite()).then_some(ReferenceStar { bp_rp, g_abs })
}

fn open_table(path: &Path, what: &str) -> Result<(csv::Reader<File>, HashMap<String, usize>), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open {what} '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read {what} headers: {e}")))?
        .clone();
    Ok((reader, build_header_map(&headers)))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let v = s?.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wdrv-ingest-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn lookup_matches_zero_padded_ids() {
        let path = write_temp(
            "lookup.csv",
            "\u{feff}CatalogID,bluefiles,redfiles\n\
             04592943353,b1.fits,r1.fits\n\
             123,bx.fits,rx.fits\n\
             4592943353,b2.fits,r2.fits\n\
             oops,b3.fits,r3.fits\n",
        );
        let found = load_exposure_files(&path, Path::new("/data"), 4_592_943_353).unwrap();
        assert_eq!(found.files.len(), 2);
        assert_eq!(found.files[0].blue, Path::new("/data/b1.fits"));
        assert_eq!(found.files[1].red, Path::new("/data/r2.fits"));
        assert_eq!(found.row_errors.len(), 1);
        assert_eq!(found.row_errors[0].line, 5);
    }

    #[test]
    fn unknown_catalog_id_is_an_input_error() {
        let path = write_temp("lookup-miss.csv", "catalogid,bluefiles,redfiles\n1,b,r\n");
        let err = load_exposure_files(&path, Path::new("."), 2).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn reference_catalog_applies_parallax_cuts() {
        let path = write_temp(
            "gcns.csv",
            "PARALLAX,PARALLAX_ERROR,PHOT_G_MEAN_MAG,PHOT_BP_MEAN_MAG,PHOT_RP_MEAN_MAG\n\
             10.0,0.05,15.0,15.1,14.9\n\
             10.0,0.5,15.0,15.1,14.9\n\
             0.5,0.08,15.0,15.1,14.9\n\
             10.0,0.05,,15.1,14.9\n",
        );
        let cat = load_reference_catalog(&path).unwrap();
        assert_eq!(cat.rows_read, 4);
        assert_eq!(cat.stars.len(), 1);
        // 100 pc: distance modulus 5.
        assert!((cat.stars[0].g_abs - 10.0).abs() < 1e-12);
        assert!((cat.stars[0].bp_rp - 0.2).abs() < 1e-12);
    }
}
