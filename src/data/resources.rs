//! Read-only resources shared by the pipeline stages.
//!
//! Paths come from CLI flags, falling back to environment variables (a `.env`
//! file in the working directory is honoured). `Resources` is built once in
//! `app` and handed to the pipeline by reference.

use std::path::{Path, PathBuf};

use crate::data::cooling::CoolingGrid;
use crate::data::gaia::{CatalogService, GaiaTapClient};
use crate::error::AppError;
use crate::io::ingest::{ReferenceCatalog, load_reference_catalog};

pub const ENV_DATA_ROOT: &str = "WDRV_DATA_ROOT";
pub const ENV_LOOKUP_TABLE: &str = "WDRV_LOOKUP_TABLE";
pub const ENV_COOLING_GRID: &str = "WDRV_COOLING_GRID";
pub const ENV_REFERENCE_CATALOG: &str = "WDRV_REFERENCE_CATALOG";
pub const ENV_OUTPUT_ROOT: &str = "WDRV_OUTPUT_ROOT";

/// Where the inputs live and where outputs go.
#[derive(Debug, Clone, Default)]
pub struct ResourcePaths {
    /// Exposure file names in the lookup table are relative to this directory.
    pub data_root: PathBuf,
    pub lookup_table: Option<PathBuf>,
    pub cooling_grid: Option<PathBuf>,
    pub reference_catalog: Option<PathBuf>,
    pub output_root: PathBuf,
}

impl ResourcePaths {
    /// Fill any path not given explicitly from the environment.
    pub fn resolve(self) -> Self {
        dotenvy::dotenv().ok();
        let env_path = |key: &str| std::env::var_os(key).map(PathBuf::from);
        Self {
            data_root: non_empty(self.data_root)
                .or_else(|| env_path(ENV_DATA_ROOT))
                .unwrap_or_else(|| PathBuf::from(".")),
            lookup_table: self.lookup_table.or_else(|| env_path(ENV_LOOKUP_TABLE)),
            cooling_grid: self.cooling_grid.or_else(|| env_path(ENV_COOLING_GRID)),
            reference_catalog: self.reference_catalog.or_else(|| env_path(ENV_REFERENCE_CATALOG)),
            output_root: non_empty(self.output_root)
                .or_else(|| env_path(ENV_OUTPUT_ROOT))
                .unwrap_or_else(|| PathBuf::from("output")),
        }
    }

    pub fn lookup_table(&self) -> Result<&Path, AppError> {
        self.lookup_table.as_deref().ok_or_else(|| {
            AppError::input(format!(
                "No exposure lookup table given (use --lookup-table or set {ENV_LOOKUP_TABLE})."
            ))
        })
    }
}

fn non_empty(p: PathBuf) -> Option<PathBuf> {
    (!p.as_os_str().is_empty()).then_some(p)
}

/// Loaded tables and services for one run.
pub struct Resources {
    pub paths: ResourcePaths,
    /// Required for the spectroscopic primary mass unless `--m1` is given.
    pub cooling: Option<CoolingGrid>,
    /// CMD background; the CMD is drawn without it when absent.
    pub reference: Option<ReferenceCatalog>,
    /// `None` in offline runs (the CMD stage is skipped).
    pub catalog: Option<Box<dyn CatalogService>>,
}

impl Resources {
    /// Load every table named in `paths`. A named file that cannot be read is an
    /// input error; an unnamed one is simply absent.
    pub fn load(paths: ResourcePaths, offline: bool) -> Result<Self, AppError> {
        let cooling = paths.cooling_grid.as_deref().map(CoolingGrid::from_csv).transpose()?;
        let reference = paths
            .reference_catalog
            .as_deref()
            .map(load_reference_catalog)
            .transpose()?;
        let catalog: Option<Box<dyn CatalogService>> = if offline {
            None
        } else {
            Some(Box::new(GaiaTapClient::from_env()))
        };

        if cooling.is_none() {
            log::warn!("No cooling grid configured ({ENV_COOLING_GRID}); the primary mass needs --m1 or photometry.");
        }

        Ok(Self {
            paths,
            cooling,
            reference,
            catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_paths_win_over_defaults() {
        let paths = ResourcePaths {
            data_root: PathBuf::from("/spectra"),
            lookup_table: Some(PathBuf::from("/tables/lookup.csv")),
            output_root: PathBuf::from("/out"),
            ..Default::default()
        }
        .resolve();
        assert_eq!(paths.data_root, PathBuf::from("/spectra"));
        assert_eq!(paths.output_root, PathBuf::from("/out"));
        assert_eq!(paths.lookup_table().unwrap(), Path::new("/tables/lookup.csv"));
    }

    #[test]
    fn missing_cooling_grid_file_is_an_input_error() {
        let paths = ResourcePaths {
            cooling_grid: Some(PathBuf::from("/definitely/not/here.csv")),
            ..Default::default()
        };
        let err = Resources::load(paths, true).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
