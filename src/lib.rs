//! # ometiff-reader
//!
//! Opens pyramidal OME-TIFF microscopy files as multiscale image layers.
//!
//! A host first asks [`ReaderPlugin::get_reader`] whether a path is handled.
//! Only the file name is checked (`.ome.tif`, `.ome.tiff`, `.ome_tif`,
//! `.ome_tiff`, case-sensitive). The returned [`OmeTiffReader`] then opens
//! the file, checks that it carries OME-XML and a SubIFD pyramid, and returns
//! one image layer: every resolution level as a lazy array ordered
//! (Y, X, C, ...), plus fixed display settings.
//!
//! ## Architecture
//!
//! - [`io`] - positioned reads from local files or memory
//! - [`mod@format`] - TIFF structure, OME-XML metadata, chunk decoding
//! - [`layer`] - lazy level arrays, chunk cache, conversion
//! - [`config`] - CLI configuration for the binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use ometiff_reader::ReaderPlugin;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let plugin = ReaderPlugin::new();
//!     let Some(reader) = plugin.get_reader("slide.ome.tiff") else {
//!         return Ok(());
//!     };
//!
//!     let layers = reader.read("slide.ome.tiff").await?;
//!     for level in &layers[0].data {
//!         println!("level {}: {:?}", level.level(), level.shape());
//!     }
//!     let thumbnail = layers[0].data.last().unwrap().read::<u8>().await?;
//!     println!("{:?}", thumbnail.shape());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod layer;

// Re-export commonly used types
pub use error::{IoError, MetadataError, ReaderError, TiffError};
pub use format::ome_xml::UNMATCHED_TARGET;
pub use format::{
    detect_ome_tiff, is_ome_tiff_path, OmeMetadata, PathInput, PixelType, OME_TIFF_SUFFIXES,
};
pub use io::{LocalFileReader, MemoryReader, RangeReader};
pub use layer::{
    AnyArray, AxesOrder, ChunkCache, ConversionReport, ConversionWarning, DisplayMetadata,
    LayerData, LayerType, LevelArray, OmeTiffReader, ReaderPlugin, Sample,
    DEFAULT_CHUNK_CACHE_CAPACITY,
};
