//! TIFF parser for OME-TIFF pyramids.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: Metadata and pointers to image data. An OME-TIFF
//!   stores one full-resolution plane per IFD of the main chain; reduced resolutions
//!   of a plane are child IFDs listed in its SubIFDs tag.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod directory;
mod parser;
mod tags;
mod validation;
mod values;

pub use directory::{ChunkLayout, ImageDirectory, TiffFile, MAX_IFDS, PLANAR_CHUNKY};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{Compression, FieldType, TiffTag, PREDICTOR_HORIZONTAL, PREDICTOR_NONE};
pub use validation::{validate_directory, validate_levels, ValidationError, ValidationResult};
pub use values::ValueReader;
