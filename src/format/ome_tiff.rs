//! OME-TIFF structure: OME flag, plane-to-IFD mapping and SubIFD pyramids.
//!
//! An OME-TIFF stores every 2D plane (one Z, C, T position) of the full
//! resolution image as an IFD of the main chain. The OME-XML `TiffData`
//! elements say which IFD holds which plane; without them planes are stored
//! sequentially in `DimensionOrder`. Reduced resolutions of each plane are
//! listed in that plane's SubIFDs tag, level 1 first.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ReaderError;
use crate::io::RangeReader;

use super::detect::is_ome_description;
use super::ome_xml::OmeMetadata;
use super::pixel::PixelType;
use super::tiff::{validate_levels, ByteOrder, ImageDirectory, TiffFile};

// =============================================================================
// OmeTiff
// =============================================================================

/// A TIFF file whose first ImageDescription is OME-XML.
pub struct OmeTiff {
    reader: Arc<dyn RangeReader>,
    file: TiffFile,
    metadata: OmeMetadata,
}

impl OmeTiff {
    /// Parse the TIFF structure and the OME-XML metadata.
    ///
    /// Returns `NotOmeFormat` when the file is a TIFF without OME-XML.
    pub async fn open(reader: Arc<dyn RangeReader>) -> Result<Self, ReaderError> {
        let file = TiffFile::open(reader.as_ref()).await?;

        let description = file.description(reader.as_ref()).await?;
        let xml = match description {
            Some(text) if is_ome_description(&text) => text,
            _ => return Err(ReaderError::NotOmeFormat),
        };

        let metadata = OmeMetadata::parse(&xml)?;
        debug!(
            file = reader.identifier(),
            dimension_order = %metadata.dimension_order,
            pixel_type = %metadata.pixel_type,
            "parsed OME-XML metadata"
        );

        Ok(OmeTiff {
            reader,
            file,
            metadata,
        })
    }

    pub fn metadata(&self) -> &OmeMetadata {
        &self.metadata
    }

    pub fn reader(&self) -> &Arc<dyn RangeReader> {
        &self.reader
    }

    /// Samples per pixel as stored in the first IFD.
    fn stored_samples_per_pixel(&self) -> usize {
        self.file
            .first_ifd()
            .and_then(|ifd| ifd.samples_per_pixel(self.file.header.byte_order))
            .unwrap_or(1)
            .max(1) as usize
    }

    /// Load the directories of every plane at every resolution level.
    pub async fn pyramid(&self) -> Result<OmePyramid, ReaderError> {
        let meta = &self.metadata;
        let reader = self.reader.as_ref();
        let header = &self.file.header;

        let samples_per_pixel = self.stored_samples_per_pixel();
        if meta.size_c % samples_per_pixel != 0 {
            return Err(ReaderError::InconsistentPyramid(format!(
                "SizeC {} is not a multiple of {} samples per pixel",
                meta.size_c, samples_per_pixel
            )));
        }
        let order = PlaneOrder::new(meta, samples_per_pixel);

        // Every plane needs its own IFD, so the count is checked before the
        // plane map is sized from it
        let ifd_count = self.file.ifd_count();
        match order.checked_plane_count() {
            None => {
                return Err(ReaderError::InconsistentPyramid(format!(
                    "{}x{}x{} planes overflow the plane count",
                    meta.size_z, meta.size_c, meta.size_t
                )))
            }
            Some(count) if count > ifd_count => {
                let (z, c, t) = order.coordinates(ifd_count);
                return Err(ReaderError::MissingPlane { z, c, t });
            }
            Some(_) => {}
        }
        let plane_map = PlaneMap::build(meta, &order, ifd_count);

        // Main IFD and SubIFD offsets for each plane
        let mut plane_offsets = Vec::with_capacity(order.plane_count());
        for (plane, ifd_index) in plane_map.planes.iter().enumerate() {
            let (z, c, t) = order.coordinates(plane);
            let (offset, ifd) = ifd_index
                .and_then(|index| self.file.ifds.get(index))
                .ok_or(ReaderError::MissingPlane { z, c, t })?;
            let sub_offsets = self.file.sub_ifd_offsets(reader, ifd).await?;
            plane_offsets.push((*offset, ifd, sub_offsets));
        }

        let level_count = 1 + plane_offsets
            .iter()
            .map(|(_, _, subs)| subs.len())
            .min()
            .unwrap_or(0);
        if level_count < 2 {
            return Err(ReaderError::NotPyramidal {
                levels: level_count,
            });
        }

        let mut levels: Vec<Vec<Arc<ImageDirectory>>> = vec![Vec::new(); level_count];
        for (offset, ifd, sub_offsets) in &plane_offsets {
            let base = ImageDirectory::load(reader, header, *offset, ifd).await?;
            levels[0].push(Arc::new(base));

            for (level, &sub_offset) in sub_offsets.iter().take(level_count - 1).enumerate() {
                let sub_ifd = TiffFile::read_ifd(reader, header, sub_offset).await?;
                let dir = ImageDirectory::load(reader, header, sub_offset, &sub_ifd).await?;
                levels[level + 1].push(Arc::new(dir));
            }
        }

        let pyramid = OmePyramid::assemble(
            header.byte_order,
            meta,
            order,
            levels,
        )?;
        debug!(
            file = reader.identifier(),
            levels = pyramid.level_count(),
            planes = pyramid.order.plane_count(),
            "loaded pyramid"
        );
        Ok(pyramid)
    }
}

// =============================================================================
// Plane Ordering
// =============================================================================

/// Linear plane index for (Z, C, T) following the OME `DimensionOrder`.
///
/// C counts stored planes, so interleaved RGB (3 samples per pixel, SizeC 3)
/// has a single C plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneOrder {
    /// The three non-spatial axes, fastest first (e.g. `['Z', 'C', 'T']`)
    axes: [char; 3],
    size_z: usize,
    size_c: usize,
    size_t: usize,
}

impl PlaneOrder {
    pub fn new(meta: &OmeMetadata, samples_per_pixel: usize) -> Self {
        let mut axes = ['Z', 'C', 'T'];
        for (slot, letter) in axes.iter_mut().zip(meta.dimension_order.chars().skip(2)) {
            *slot = letter;
        }
        PlaneOrder {
            axes,
            size_z: meta.size_z,
            size_c: (meta.size_c / samples_per_pixel.max(1)).max(1),
            size_t: meta.size_t,
        }
    }

    fn size(&self, axis: char) -> usize {
        match axis {
            'Z' => self.size_z,
            'C' => self.size_c,
            _ => self.size_t,
        }
    }

    pub fn plane_count(&self) -> usize {
        self.size_z
            .saturating_mul(self.size_c)
            .saturating_mul(self.size_t)
    }

    /// Plane count, or `None` when it does not fit in `usize`.
    pub fn checked_plane_count(&self) -> Option<usize> {
        self.size_z.checked_mul(self.size_c)?.checked_mul(self.size_t)
    }

    /// Plane index of a (Z, C-plane, T) position.
    pub fn index(&self, z: usize, c: usize, t: usize) -> usize {
        let value = |axis: char| match axis {
            'Z' => z,
            'C' => c,
            _ => t,
        };
        let [a0, a1, a2] = self.axes;
        value(a0) + self.size(a0) * (value(a1) + self.size(a1) * value(a2))
    }

    /// Inverse of [`PlaneOrder::index`].
    pub fn coordinates(&self, index: usize) -> (usize, usize, usize) {
        let [a0, a1, _] = self.axes;
        let v0 = index % self.size(a0);
        let rest = index / self.size(a0);
        let v1 = rest % self.size(a1);
        let v2 = rest / self.size(a1);

        let mut zct = [0usize; 3];
        for (axis, value) in self.axes.iter().zip([v0, v1, v2]) {
            let slot = match axis {
                'Z' => 0,
                'C' => 1,
                _ => 2,
            };
            zct[slot] = value;
        }
        (zct[0], zct[1], zct[2])
    }
}

/// Plane index to main-chain IFD index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneMap {
    pub planes: Vec<Option<usize>>,
}

impl PlaneMap {
    /// Resolve the `TiffData` blocks against `ifd_count` available IFDs.
    ///
    /// A block without `IFD` starts at IFD 0. `PlaneCount` defaults to 1
    /// when `IFD` is given and to all remaining planes otherwise. Later
    /// blocks override earlier ones. Without any block, plane `i` is IFD `i`.
    pub fn build(meta: &OmeMetadata, order: &PlaneOrder, ifd_count: usize) -> Self {
        let total = order.plane_count();
        let mut planes = vec![None; total];

        if meta.tiff_data.is_empty() {
            for (plane, slot) in planes.iter_mut().enumerate() {
                *slot = (plane < ifd_count).then_some(plane);
            }
            return PlaneMap { planes };
        }

        for block in &meta.tiff_data {
            if block.first_z >= order.size_z
                || block.first_c >= order.size_c
                || block.first_t >= order.size_t
            {
                warn!(
                    first_z = block.first_z,
                    first_c = block.first_c,
                    first_t = block.first_t,
                    "TiffData starts outside the image, ignored"
                );
                continue;
            }
            let start = order.index(block.first_z, block.first_c, block.first_t);
            let first_ifd = block.ifd.unwrap_or(0);
            let count = match (block.ifd, block.plane_count) {
                (_, Some(count)) => count,
                (Some(_), None) => 1,
                (None, None) => total,
            };

            for k in 0..count.min(total - start) {
                let ifd = first_ifd + k;
                if ifd < ifd_count {
                    planes[start + k] = Some(ifd);
                }
            }
        }

        PlaneMap { planes }
    }
}

// =============================================================================
// OmePyramid
// =============================================================================

/// Directories of every plane at one resolution level.
#[derive(Debug, Clone)]
pub struct LevelLayout {
    pub width: u32,
    pub height: u32,

    /// Indexed by plane index
    pub planes: Vec<Arc<ImageDirectory>>,
}

/// All resolution levels of the first OME image.
#[derive(Debug, Clone)]
pub struct OmePyramid {
    pub byte_order: ByteOrder,

    /// Array axis order, slowest first (`"TCZYX"`)
    pub dim_order: String,

    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub samples_per_pixel: usize,
    pub pixel_type: PixelType,
    pub order: PlaneOrder,

    /// Level 0 is full resolution
    pub levels: Vec<LevelLayout>,
}

impl OmePyramid {
    fn assemble(
        byte_order: ByteOrder,
        meta: &OmeMetadata,
        order: PlaneOrder,
        levels: Vec<Vec<Arc<ImageDirectory>>>,
    ) -> Result<Self, ReaderError> {
        let mut layouts = Vec::with_capacity(levels.len());

        for (index, planes) in levels.into_iter().enumerate() {
            let first = planes.first().ok_or_else(|| {
                ReaderError::InconsistentPyramid(format!("level {} has no planes", index))
            })?;
            let (width, height) = (first.width, first.height);

            if let Some(odd) = planes
                .iter()
                .find(|dir| (dir.width, dir.height) != (width, height))
            {
                return Err(ReaderError::InconsistentPyramid(format!(
                    "level {} mixes {}x{} and {}x{} planes",
                    index, width, height, odd.width, odd.height
                )));
            }
            if first.pixel_type != meta.pixel_type {
                return Err(ReaderError::InconsistentPyramid(format!(
                    "level {} stores {} samples, metadata says {}",
                    index, first.pixel_type, meta.pixel_type
                )));
            }
            if index == 0 && (width as usize, height as usize) != (meta.size_x, meta.size_y) {
                return Err(ReaderError::InconsistentPyramid(format!(
                    "full resolution is {}x{}, metadata says {}x{}",
                    width, height, meta.size_x, meta.size_y
                )));
            }

            layouts.push(LevelLayout {
                width,
                height,
                planes,
            });
        }

        // Per plane, every level must decode with the base level's layout
        let plane_count = layouts.first().map(|l| l.planes.len()).unwrap_or(0);
        for plane in 0..plane_count {
            let chain: Vec<&ImageDirectory> = layouts
                .iter()
                .map(|level| level.planes[plane].as_ref())
                .collect();
            let result = validate_levels(&chain);
            for warning in &result.warnings {
                warn!(plane, "{}", warning);
            }
            result.into_result()?;
        }

        let samples_per_pixel = layouts
            .first()
            .and_then(|l| l.planes.first())
            .map(|dir| dir.samples_per_pixel as usize)
            .unwrap_or(1);

        Ok(OmePyramid {
            byte_order,
            dim_order: meta.dim_order.clone(),
            size_z: meta.size_z,
            size_c: meta.size_c,
            size_t: meta.size_t,
            samples_per_pixel,
            pixel_type: meta.pixel_type,
            order,
            levels: layouts,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Size of an axis (upper-case letter) at a level.
    pub fn axis_size(&self, level: usize, axis: char) -> Option<usize> {
        let layout = self.levels.get(level)?;
        match axis {
            'X' => Some(layout.width as usize),
            'Y' => Some(layout.height as usize),
            'Z' => Some(self.size_z),
            'C' => Some(self.size_c),
            'T' => Some(self.size_t),
            _ => None,
        }
    }

    /// Directory holding logical channel `c` at (z, t), and the sample
    /// within each pixel that carries it.
    pub fn locate(
        &self,
        level: usize,
        z: usize,
        c: usize,
        t: usize,
    ) -> Option<(&Arc<ImageDirectory>, usize)> {
        let spp = self.samples_per_pixel.max(1);
        let plane = self.order.index(z, c / spp, t);
        let dir = self.levels.get(level)?.planes.get(plane)?;
        Some((dir, c % spp))
    }
}

// =============================================================================
// Tests
// =============================================================================
