//! Detection and conversion entry points.
//!
//! [`ReaderPlugin::get_reader`] checks a path by name only and hands back an
//! [`OmeTiffReader`] for OME-TIFF files. [`OmeTiffReader::read`] opens the
//! file and turns its pyramid into one image layer whose levels are ordered
//! (Y, X, C, ...).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ReaderError;
use crate::format::{detect_ome_tiff, OmeTiff, PathInput};
use crate::io::{LocalFileReader, RangeReader};

use super::array::{LevelArray, PyramidSource};
use super::axes::{axes_string, AxesOrder};
use super::cache::ChunkCache;
use super::units::{resolve_mpp, ConversionWarning};

// =============================================================================
// Layer Types
// =============================================================================

/// Initial display settings for the host viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayMetadata {
    pub rgb: bool,
    pub contrast_limits: (u32, u32),
    pub multiscale: bool,
}

impl DisplayMetadata {
    /// The settings attached to every layer.
    pub const IMAGE: DisplayMetadata = DisplayMetadata {
        rgb: true,
        contrast_limits: (0, 255),
        multiscale: true,
    };
}

impl Default for DisplayMetadata {
    fn default() -> Self {
        Self::IMAGE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Image,
}

impl LayerType {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerType::Image => "image",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One layer: the pyramid, level 0 first, with its display settings.
#[derive(Debug, Clone)]
pub struct LayerData {
    pub data: Vec<LevelArray>,
    pub metadata: DisplayMetadata,
    pub layer_type: LayerType,
}

/// What conversion found besides the layer itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    /// Non-singleton axes in file order, e.g. `"cyx"`
    pub axes: String,
    pub axes_order: AxesOrder,
    pub image_name: Option<String>,

    /// Microns per pixel, when the file records a physical size
    pub base_mpp_x: Option<f64>,
    pub base_mpp_y: Option<f64>,

    pub warnings: Vec<ConversionWarning>,
}

// =============================================================================
// OmeTiffReader
// =============================================================================

/// Converts OME-TIFF files into image layers.
#[derive(Clone)]
pub struct OmeTiffReader {
    cache: Arc<ChunkCache>,
}

impl OmeTiffReader {
    pub fn new(cache: Arc<ChunkCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ChunkCache> {
        &self.cache
    }

    /// Open the first path of `input` and return its single image layer.
    pub async fn read(&self, input: impl Into<PathInput>) -> Result<Vec<LayerData>, ReaderError> {
        let (layers, _) = self.read_with_report(input).await?;
        Ok(layers)
    }

    /// Like [`OmeTiffReader::read`], also returning the conversion report.
    pub async fn read_with_report(
        &self,
        input: impl Into<PathInput>,
    ) -> Result<(Vec<LayerData>, ConversionReport), ReaderError> {
        let input = input.into();
        let path = input.first().ok_or(ReaderError::EmptyPathList)?;
        let reader = LocalFileReader::open(path).await?;
        self.read_from(Arc::new(reader)).await
    }

    /// Convert an already opened source.
    pub async fn read_from(
        &self,
        reader: Arc<dyn RangeReader>,
    ) -> Result<(Vec<LayerData>, ConversionReport), ReaderError> {
        let file = OmeTiff::open(reader.clone()).await?;
        let meta = file.metadata();

        let axes = axes_string(meta);
        let axes_order = AxesOrder::from_axes(&axes)?;
        debug!(file = reader.identifier(), axes = %axes, ?axes_order, "resolved axes");

        let pyramid = file.pyramid().await?;

        let mut warnings = Vec::new();
        let (base_mpp_x, warning) =
            resolve_mpp('x', meta.physical_size_x, &meta.physical_size_x_unit);
        warnings.extend(warning);
        let (base_mpp_y, warning) =
            resolve_mpp('y', meta.physical_size_y, &meta.physical_size_y_unit);
        warnings.extend(warning);

        let report = ConversionReport {
            axes: axes.clone(),
            axes_order,
            image_name: meta.image_name.clone(),
            base_mpp_x,
            base_mpp_y,
            warnings,
        };

        let level_count = pyramid.level_count();
        let source = Arc::new(PyramidSource::new(reader.clone(), pyramid, self.cache.clone()));
        let data = (0..level_count)
            .map(|level| {
                LevelArray::new(source.clone(), level, &axes).moveaxis(&axes_order.source(), &[0, 1, 2])
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            file = reader.identifier(),
            levels = data.len(),
            shape = ?data.first().map(LevelArray::shape),
            "converted OME-TIFF"
        );

        let layer = LayerData {
            data,
            metadata: DisplayMetadata::IMAGE,
            layer_type: LayerType::Image,
        };
        Ok((vec![layer], report))
    }
}

impl fmt::Debug for OmeTiffReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmeTiffReader")
            .field("cache_capacity", &self.cache.capacity())
            .finish()
    }
}

// =============================================================================
// ReaderPlugin
// =============================================================================

/// Entry point for hosts: owns the chunk cache and hands out readers.
///
/// Every reader from one plugin shares its cache.
#[derive(Debug, Clone)]
pub struct ReaderPlugin {
    reader: OmeTiffReader,
}

impl ReaderPlugin {
    /// Plugin with a fresh cache of the default capacity.
    pub fn new() -> Self {
        Self::with_cache(Arc::new(ChunkCache::new()))
    }

    pub fn with_cache(cache: Arc<ChunkCache>) -> Self {
        Self {
            reader: OmeTiffReader::new(cache),
        }
    }

    pub fn cache(&self) -> &Arc<ChunkCache> {
        self.reader.cache()
    }

    /// A reader for `input` if its first path names an OME-TIFF file.
    ///
    /// Never touches the file system.
    pub fn get_reader(&self, input: impl Into<PathInput>) -> Option<OmeTiffReader> {
        let input = input.into();
        detect_ome_tiff(&input).map(|_| self.reader.clone())
    }
}

impl Default for ReaderPlugin {
    fn default() -> Self {
        Self::new()
    }
}
