//! Gaia archive integration (TAP, synchronous ADQL queries).
//!
//! The CMD stage needs two rows per target: the EDR3 astrometry/photometry row
//! and the Bailer-Jones geometric distance. Both come from the ESA archive's
//! TAP endpoint as JSON (`{"metadata": [...], "data": [[...]]}`).

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_TAP_URL: &str = "https://gea.esac.esa.int/tap-server/tap/sync";

const SOURCE_TABLE: &str = "gaiaedr3.gaia_source";
const DISTANCE_TABLE: &str = "external.gaiaedr3_distance";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaiaSource {
    pub source_id: i64,
    pub ra: f64,
    pub dec: f64,
    pub parallax: Option<f64>,
    pub phot_g_mean_mag: f64,
    pub bp_rp: f64,
}

/// Geometric distance percentiles (pc).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeometricDistance {
    pub r_med_geo: f64,
    pub r_lo_geo: f64,
    pub r_hi_geo: f64,
}

/// Astrometric catalog lookups needed by the CMD stage.
pub trait CatalogService {
    fn source(&self, source_id: i64) -> Result<GaiaSource, AppError>;
    fn distance(&self, source_id: i64) -> Result<GeometricDistance, AppError>;
}

pub struct GaiaTapClient {
    client: Client,
    url: String,
}

impl GaiaTapClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    /// Endpoint from `WDRV_GAIA_TAP_URL` (`.env` honoured), else the ESA archive.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let url = std::env::var("WDRV_GAIA_TAP_URL").unwrap_or_else(|_| DEFAULT_TAP_URL.to_string());
        Self::new(url)
    }

    fn query(&self, adql: &str) -> Result<TapTable, AppError> {
        log::debug!("TAP query: {adql}");
        let resp = self
            .client
            .post(&self.url)
            .form(&[
                ("REQUEST", "doQuery"),
                ("LANG", "ADQL"),
                ("FORMAT", "json"),
                ("QUERY", adql),
            ])
            .send()
            .map_err(|e| AppError::data(format!("Gaia TAP request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::data(format!(
                "Gaia TAP request failed with status {}.",
                resp.status()
            )));
        }

        resp.json()
            .map_err(|e| AppError::data(format!("Failed to parse Gaia TAP response: {e}")))
    }
}

impl CatalogService for GaiaTapClient {
    fn source(&self, source_id: i64) -> Result<GaiaSource, AppError> {
        let table = self.query(&format!(
            "SELECT source_id, ra, dec, parallax, phot_g_mean_mag, bp_rp \
             FROM {SOURCE_TABLE} WHERE source_id = {source_id}"
        ))?;
        parse_source(&table, source_id)
    }

    fn distance(&self, source_id: i64) -> Result<GeometricDistance, AppError> {
        let table = self.query(&format!(
            "SELECT source_id, r_med_geo, r_lo_geo, r_hi_geo \
             FROM {DISTANCE_TABLE} WHERE source_id = {source_id}"
        ))?;
        parse_distance(&table, source_id)
    }
}

#[derive(Debug, Deserialize)]
struct TapTable {
    metadata: Vec<TapColumn>,
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct TapColumn {
    name: String,
}

impl TapTable {
    fn first_row(&self, what: &str, source_id: i64) -> Result<&[serde_json::Value], AppError> {
        self.data
            .first()
            .map(Vec::as_slice)
            .ok_or_else(|| AppError::data(format!("Gaia returned no {what} row for source {source_id}.")))
    }

    fn number(&self, row: &[serde_json::Value], column: &str) -> Option<f64> {
        let idx = self
            .metadata
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))?;
        let v = row.get(idx)?.as_f64()?;
        v.is_finite().then_some(v)
    }

    fn required(&self, row: &[serde_json::Value], column: &str) -> Result<f64, AppError> {
        self.number(row, column)
            .ok_or_else(|| AppError::data(format!("Gaia row has no usable `{column}`.")))
    }
}

fn parse_source(table: &TapTable, source_id: i64) -> Result<GaiaSource, AppError> {
    let row = table.first_row("source", source_id)?;
    Ok(GaiaSource {
        source_id,
        ra: table.required(row, "ra")?,
        dec: table.required(row, "dec")?,
        parallax: table.number(row, "parallax"),
        phot_g_mean_mag: table.required(row, "phot_g_mean_mag")?,
        bp_rp: table.required(row, "bp_rp")?,
    })
}

fn parse_distance(table: &TapTable, source_id: i64) -> Result<GeometricDistance, AppError> {
    let row = table.first_row("distance", source_id)?;
    let d = GeometricDistance {
        r_med_geo: table.required(row, "r_med_geo")?,
        r_lo_geo: table.required(row, "r_lo_geo")?,
        r_hi_geo: table.required(row, "r_hi_geo")?,
    };
    if !(d.r_lo_geo > 0.0 && d.r_med_geo > 0.0 && d.r_hi_geo > 0.0) {
        return Err(AppError::data(format!("Non-positive geometric distance for source {source_id}.")));
    }
    Ok(d)
}

/// Fixed answers for offline runs and tests.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    pub source: GaiaSource,
    pub distance: GeometricDistance,
}

impl CatalogService for StaticCatalog {
    fn source(&self, source_id: i64) -> Result<GaiaSource, AppError> {
        Ok(GaiaSource { source_id, ..self.source.clone() })
    }

    fn distance(&self, _source_id: i64) -> Result<GeometricDistance, AppError> {
        Ok(self.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(json: &str) -> TapTable {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_source_row_by_column_name() {
        let t = table(
            r#"{"metadata":[{"name":"source_id"},{"name":"ra"},{"name":"dec"},{"name":"parallax"},
                {"name":"phot_g_mean_mag"},{"name":"bp_rp"}],
                "data":[[123,150.5,2.25,null,17.1,-0.3]]}"#,
        );
        let s = parse_source(&t, 123).unwrap();
        assert_eq!(s.ra, 150.5);
        assert_eq!(s.parallax, None);
        assert_eq!(s.bp_rp, -0.3);
    }

    #[test]
    fn empty_result_is_a_data_error() {
        let t = table(r#"{"metadata":[{"name":"r_med_geo"}],"data":[]}"#);
        assert_eq!(parse_distance(&t, 1).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn distance_row_is_validated() {
        let t = table(
            r#"{"metadata":[{"name":"r_med_geo"},{"name":"r_lo_geo"},{"name":"r_hi_geo"}],
                "data":[[100.0,95.0,105.0]]}"#,
        );
        let d = parse_distance(&t, 1).unwrap();
        assert_eq!(d.r_lo_geo, 95.0);
        let t = table(
            r#"{"metadata":[{"name":"r_med_geo"},{"name":"r_lo_geo"},{"name":"r_hi_geo"}],
                "data":[[100.0,-1.0,105.0]]}"#,
        );
        assert!(parse_distance(&t, 1).is_err());
    }
}
