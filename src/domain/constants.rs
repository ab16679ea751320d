//! Physical constants and reference values.

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KMS: f64 = 2.997_924_58e5;

/// Newtonian gravitational constant (m^3 kg^-1 s^-2), CODATA 2018.
pub const GRAVITATIONAL_CONSTANT: f64 = 6.674_30e-11;

/// Solar mass in kg (IAU 2015 nominal GM divided by G).
pub const SOLAR_MASS_KG: f64 = 1.988_409_870_698_051e30;

pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const HOURS_PER_DAY: f64 = 24.0;

/// Primary mass assumed when the spectroscopic solution falls off the cooling
/// grid at low surface gravity (extremely-low-mass white dwarf regime).
pub const DEFAULT_LOW_MASS_PRIMARY: f64 = 0.2;

/// Surface gravity at or below which the low-mass fallback applies.
pub const LOW_MASS_LOGG_THRESHOLD: f64 = 6.5;

/// Total-mass thresholds reported by the mass inference (M☉).
pub const MERGER_MASS_THRESHOLD: f64 = 1.0;
pub const CHANDRASEKHAR_MASS: f64 = 1.4;
