//! Checks that image directories use a layout this reader can decode.
//!
//! Unsupported files are rejected when the reader is built rather than on
//! the first chunk read, so callers get one clear error up front.
//!
//! # Supported Subset
//!
//! - **Organization**: tiles or strips, interleaved samples only
//! - **Compression**: none, Deflate, JPEG (8-bit, 1 or 3 samples)
//! - **Predictor**: none, or horizontal differencing on integer samples
//! - **Pyramid**: every level shares the base level's sample layout

use crate::error::TiffError;

use super::directory::{ImageDirectory, PLANAR_CHUNKY};
use super::tags::{Compression, PREDICTOR_HORIZONTAL, PREDICTOR_NONE};
use crate::format::pixel::PixelType;

/// Chunks wider or taller than this trigger a memory warning
const LARGE_CHUNK_DIMENSION: u32 = 4096;

// =============================================================================
// Validation Result
// =============================================================================

/// Result of validating one or more directories.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,

    /// Validation errors (empty if valid)
    pub errors: Vec<ValidationError>,

    /// Non-fatal issues
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        for error in other.errors {
            self.add_error(error);
        }
        self.warnings.extend(other.warnings);
    }

    /// The first error as a TiffError, or `Ok(())` if valid.
    pub fn into_result(self) -> Result<(), TiffError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

/// A specific validation error. `directory` is the IFD offset.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    UnsupportedCompression {
        directory: u64,
        compression: u16,
        compression_name: String,
    },

    /// Samples stored in separate planes (PlanarConfiguration = 2)
    SeparatePlanes { directory: u64 },

    UnsupportedPredictor { directory: u64, predictor: u16 },

    /// JPEG chunks with a layout the JPEG decoder cannot produce
    UnsupportedJpegLayout {
        directory: u64,
        pixel_type: PixelType,
        samples_per_pixel: u16,
    },

    /// A reduced level differs from the base in sample layout
    LevelMismatch { level: usize, message: String },
}

impl From<ValidationError> for TiffError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::UnsupportedCompression {
                compression_name, ..
            } => TiffError::UnsupportedCompression(compression_name),
            ValidationError::SeparatePlanes { directory } => TiffError::InvalidTagValue {
                tag: "PlanarConfiguration",
                message: format!("IFD at {} stores samples in separate planes", directory),
            },
            ValidationError::UnsupportedPredictor {
                directory,
                predictor,
            } => TiffError::InvalidTagValue {
                tag: "Predictor",
                message: format!("predictor {} in IFD at {} is not supported", predictor, directory),
            },
            ValidationError::UnsupportedJpegLayout {
                pixel_type,
                samples_per_pixel,
                ..
            } => TiffError::UnsupportedCompression(format!(
                "JPEG with {} x {} samples",
                pixel_type, samples_per_pixel
            )),
            ValidationError::LevelMismatch { level, message } => TiffError::InvalidTagValue {
                tag: "SubIFDs",
                message: format!("level {}: {}", level, message),
            },
        }
    }
}

// =============================================================================
// Directory Validation
// =============================================================================

/// Validate a single directory.
pub fn validate_directory(dir: &ImageDirectory) -> ValidationResult {
    let mut result = ValidationResult::ok();

    match Compression::from_u16(dir.compression) {
        Some(compression) if compression.is_supported() => {
            if compression == Compression::Jpeg
                && (dir.pixel_type != PixelType::Uint8
                    || !matches!(dir.samples_per_pixel, 1 | 3))
            {
                result.add_error(ValidationError::UnsupportedJpegLayout {
                    directory: dir.offset,
                    pixel_type: dir.pixel_type,
                    samples_per_pixel: dir.samples_per_pixel,
                });
            }
        }
        Some(compression) => result.add_error(ValidationError::UnsupportedCompression {
            directory: dir.offset,
            compression: dir.compression,
            compression_name: compression.name().to_string(),
        }),
        None => result.add_error(ValidationError::UnsupportedCompression {
            directory: dir.offset,
            compression: dir.compression,
            compression_name: format!("Unknown ({})", dir.compression),
        }),
    }

    if dir.samples_per_pixel > 1 && dir.planar_configuration != PLANAR_CHUNKY {
        result.add_error(ValidationError::SeparatePlanes {
            directory: dir.offset,
        });
    }

    let predictor_ok = dir.predictor == PREDICTOR_NONE
        || (dir.predictor == PREDICTOR_HORIZONTAL && dir.pixel_type.is_integer());
    if !predictor_ok {
        result.add_error(ValidationError::UnsupportedPredictor {
            directory: dir.offset,
            predictor: dir.predictor,
        });
    }

    let (chunk_width, chunk_height) = dir.chunk_size();
    if chunk_width > LARGE_CHUNK_DIMENSION || chunk_height > LARGE_CHUNK_DIMENSION {
        result.add_warning(format!(
            "IFD at {}: large chunks ({}x{}) are decoded whole",
            dir.offset, chunk_width, chunk_height
        ));
    }

    result
}

/// Validate the directories of one plane across all pyramid levels.
///
/// `levels[0]` is the full-resolution directory.
pub fn validate_levels(levels: &[&ImageDirectory]) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let Some(base) = levels.first() else {
        return result;
    };

    for (index, dir) in levels.iter().enumerate() {
        result.merge(validate_directory(dir));

        if index == 0 {
            continue;
        }
        if dir.pixel_type != base.pixel_type {
            result.add_error(ValidationError::LevelMismatch {
                level: index,
                message: format!("pixel type {} differs from base {}", dir.pixel_type, base.pixel_type),
            });
        }
        if dir.samples_per_pixel != base.samples_per_pixel {
            result.add_error(ValidationError::LevelMismatch {
                level: index,
                message: format!(
                    "{} samples per pixel, base has {}",
                    dir.samples_per_pixel, base.samples_per_pixel
                ),
            });
        }

        let previous = levels[index - 1];
        if dir.width > previous.width || dir.height > previous.height {
            result.add_warning(format!(
                "level {} ({}x{}) is larger than level {} ({}x{})",
                index,
                dir.width,
                dir.height,
                index - 1,
                previous.width,
                previous.height
            ));
        }
    }

    result
}

// =============================================================================
// Tests
// =============================================================================
