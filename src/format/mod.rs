//! OME-TIFF file format support.
//!
//! - [`detect`]: path-based format detection
//! - [`tiff`]: TIFF/BigTIFF structure parsing
//! - [`ome_xml`]: OME-XML metadata extraction
//! - [`ome_tiff`]: plane mapping and SubIFD pyramids
//! - [`codec`], [`jpeg`]: chunk decompression

pub mod codec;
pub mod detect;
pub mod jpeg;
pub mod ome_tiff;
pub mod ome_xml;
pub mod pixel;
pub mod tiff;

pub use detect::{
    detect_ome_tiff, is_ome_description, is_ome_tiff_path, PathInput,
    OME_TIFF_SUFFIXES,
};
pub use ome_tiff::{LevelLayout, OmePyramid, OmeTiff, PlaneMap, PlaneOrder};
pub use ome_xml::{OmeMetadata, TiffDataBlock};
pub use pixel::PixelType;
