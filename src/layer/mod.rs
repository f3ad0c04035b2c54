//! Image layers built from OME-TIFF pyramids.

mod array;
mod axes;
mod cache;
mod reader;
mod units;

pub use array::{AnyArray, LevelArray, Sample};
pub use axes::{axes_string, moveaxis_permutation, AxesOrder};
pub use cache::{ChunkCache, ChunkKey, DEFAULT_CHUNK_CACHE_CAPACITY};
pub use reader::{
    ConversionReport, DisplayMetadata, LayerData, LayerType, OmeTiffReader, ReaderPlugin,
};
pub use units::{resolve_mpp, unit_multiplier, ConversionWarning, MICROMETER, MILLIMETER};
