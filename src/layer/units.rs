//! Physical pixel size in microns per pixel.

use std::fmt;

use serde::Serialize;
use tracing::warn;

/// Micrometre as written by OME (`U+00B5 MICRO SIGN`).
pub const MICROMETER: &str = "µm";

/// Same unit spelled with `U+03BC GREEK SMALL LETTER MU`.
const MICROMETER_GREEK: &str = "μm";

pub const MILLIMETER: &str = "mm";

/// Non-fatal conditions collected during conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarning {
    /// A physical size unit other than µm or mm; treated as µm.
    UnknownResolutionUnit { axis: char, unit: String },
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionWarning::UnknownResolutionUnit { axis, .. } => {
                write!(f, "unknown unit for resolution ({})", axis.to_ascii_uppercase())
            }
        }
    }
}

/// Factor converting a length in `unit` to micrometres, if known.
pub fn unit_multiplier(unit: &str) -> Option<f64> {
    match unit {
        MICROMETER | MICROMETER_GREEK => Some(1.0),
        MILLIMETER => Some(1000.0),
        _ => None,
    }
}

/// Microns per pixel along one axis.
///
/// An unknown unit falls back to a multiplier of 1.0 and yields a warning;
/// a missing physical size yields `None`.
pub fn resolve_mpp(
    axis: char,
    physical_size: Option<f64>,
    unit: &str,
) -> (Option<f64>, Option<ConversionWarning>) {
    let (multiplier, warning) = match unit_multiplier(unit) {
        Some(multiplier) => (multiplier, None),
        None => {
            let warning = ConversionWarning::UnknownResolutionUnit {
                axis: axis.to_ascii_uppercase(),
                unit: unit.to_string(),
            };
            warn!(unit, "{}", warning);
            (1.0, Some(warning))
        }
    };
    (physical_size.map(|size| size * multiplier), warning)
}
