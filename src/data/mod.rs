//! External data: cooling models, the Gaia archive, run resources, and the
//! synthetic generators used by `demo` and the tests.

pub mod cmd;
pub mod cooling;
pub mod gaia;
pub mod resources;
pub mod synthetic;

pub use cmd::{CmdPosition, CmdStage, CmdTracks, PhotometricEstimate, run_cmd_stage};
pub use cooling::{CmdSolution, CoolingGrid, CoolingPoint, CoolingTrack, toy_cooling_grid};
pub use gaia::{CatalogService, GaiaSource, GaiaTapClient, GeometricDistance, StaticCatalog};
pub use resources::{ResourcePaths, Resources};
