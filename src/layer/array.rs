//! Lazy pyramid level arrays.
//!
//! A [`LevelArray`] is a view over the chunks of one pyramid level. It holds
//! no pixel data: [`LevelArray::read_region`] works out which chunks a
//! region touches, takes them from the shared [`ChunkCache`] (decoding on a
//! miss) and copies the requested samples into an `ndarray::ArrayD`.
//!
//! Axes are named by their OME letter. Axes of size one in the full
//! resolution metadata are not part of the array; they are read at index 0.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use ndarray::{s, ArrayD, ArrayViewMut2, Axis, Ix2, IxDyn};

use crate::error::ReaderError;
use crate::format::codec::decode_chunk;
use crate::format::tiff::ImageDirectory;
use crate::format::{OmePyramid, PixelType};
use crate::io::RangeReader;

use super::axes::moveaxis_permutation;
use super::cache::{ChunkCache, ChunkKey};

/// Storage axis order used while gathering planes.
const STORAGE_AXES: [char; 5] = ['T', 'Z', 'C', 'Y', 'X'];

// =============================================================================
// Sample Types
// =============================================================================

/// Element types a level can be read into.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    const PIXEL_TYPE: PixelType;

    /// Decode one native-endian sample.
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_sample {
    ($($ty:ty => $pixel:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const PIXEL_TYPE: PixelType = PixelType::$pixel;

                fn from_ne_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_sample! {
    u8 => Uint8,
    i8 => Int8,
    u16 => Uint16,
    i16 => Int16,
    u32 => Uint32,
    i32 => Int32,
    f32 => Float,
    f64 => Double,
}

/// A materialized level in its stored element type.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyArray {
    Uint8(ArrayD<u8>),
    Int8(ArrayD<i8>),
    Uint16(ArrayD<u16>),
    Int16(ArrayD<i16>),
    Uint32(ArrayD<u32>),
    Int32(ArrayD<i32>),
    Float(ArrayD<f32>),
    Double(ArrayD<f64>),
}

macro_rules! any_array_dispatch {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            AnyArray::Uint8($array) => $body,
            AnyArray::Int8($array) => $body,
            AnyArray::Uint16($array) => $body,
            AnyArray::Int16($array) => $body,
            AnyArray::Uint32($array) => $body,
            AnyArray::Int32($array) => $body,
            AnyArray::Float($array) => $body,
            AnyArray::Double($array) => $body,
        }
    };
}

impl AnyArray {
    pub fn shape(&self) -> &[usize] {
        any_array_dispatch!(self, a => a.shape())
    }

    /// Smallest and largest sample, `None` when empty. NaNs are skipped.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        any_array_dispatch!(self, a => a.iter().map(|&v| v as f64).fold(None, |acc, v| {
            if v.is_nan() {
                return acc;
            }
            match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            }
        }))
    }
}

// =============================================================================
// PyramidSource
// =============================================================================

/// State shared by every level of one opened file.
pub(crate) struct PyramidSource {
    pub reader: Arc<dyn RangeReader>,
    pub source_id: Arc<str>,
    pub pyramid: OmePyramid,
    pub cache: Arc<ChunkCache>,
}

impl PyramidSource {
    pub fn new(reader: Arc<dyn RangeReader>, pyramid: OmePyramid, cache: Arc<ChunkCache>) -> Self {
        let source_id = Arc::from(reader.identifier());
        Self {
            reader,
            source_id,
            pyramid,
            cache,
        }
    }

    /// Decoded chunk, from the cache when present.
    async fn chunk(
        &self,
        level: usize,
        dir: &ImageDirectory,
        chunk_y: u32,
        index: u32,
    ) -> Result<Bytes, ReaderError> {
        let key = ChunkKey::new(self.source_id.clone(), dir.offset, index);
        self.cache
            .get_or_load(&key, || self.load_chunk(level, dir, chunk_y, index))
            .await
    }

    async fn load_chunk(
        &self,
        level: usize,
        dir: &ImageDirectory,
        chunk_y: u32,
        index: u32,
    ) -> Result<Bytes, ReaderError> {
        let decode_error = |message: String| ReaderError::Decode {
            level,
            chunk: index,
            message,
        };

        let (offset, byte_count) = dir
            .chunk_location(index)
            .ok_or_else(|| decode_error("chunk index out of range".to_string()))?;

        // Unwritten chunks of sparse files read as zeros
        if byte_count == 0 {
            let (width, height) = dir.stored_chunk_dimensions(chunk_y);
            let len = width as usize * height as usize * dir.bytes_per_pixel();
            return Ok(Bytes::from(vec![0u8; len]));
        }

        let raw = self.reader.read_exact_at(offset, byte_count as usize).await?;
        let data = decode_chunk(dir, self.pyramid.byte_order, chunk_y, &raw).map_err(decode_error)?;
        Ok(Bytes::from(data))
    }
}

// =============================================================================
// LevelArray
// =============================================================================

/// One resolution level as a lazily read N-dimensional array.
#[derive(Clone)]
pub struct LevelArray {
    source: Arc<PyramidSource>,
    level: usize,

    /// Upper-case axis letters in array order
    axes: Vec<char>,
}

impl LevelArray {
    /// View of `level` with the given lower-case axes (e.g. `"cyx"`).
    pub(crate) fn new(source: Arc<PyramidSource>, level: usize, axes: &str) -> Self {
        Self {
            source,
            level,
            axes: axes.chars().map(|a| a.to_ascii_uppercase()).collect(),
        }
    }

    /// Pyramid level index, 0 being full resolution.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Axis letters in array order, lower-case.
    pub fn axes(&self) -> String {
        self.axes.iter().map(|a| a.to_ascii_lowercase()).collect()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes
            .iter()
            .map(|&axis| self.source.pyramid.axis_size(self.level, axis).unwrap_or(1))
            .collect()
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pixel_type(&self) -> PixelType {
        self.source.pyramid.pixel_type
    }

    /// Move axes to new positions, like numpy's `moveaxis`.
    ///
    /// Only the view changes; no pixel data is touched.
    pub fn moveaxis(&self, source: &[usize], destination: &[usize]) -> Result<Self, ReaderError> {
        let perm = moveaxis_permutation(self.ndim(), source, destination)?;
        Ok(Self {
            source: self.source.clone(),
            level: self.level,
            axes: perm.iter().map(|&i| self.axes[i]).collect(),
        })
    }

    /// Materialize the whole level.
    pub async fn read<T: Sample>(&self) -> Result<ArrayD<T>, ReaderError> {
        let region: Vec<Range<usize>> = self.shape().into_iter().map(|n| 0..n).collect();
        self.read_region(&region).await
    }

    /// Materialize the whole level in its stored element type.
    pub async fn read_any(&self) -> Result<AnyArray, ReaderError> {
        Ok(match self.pixel_type() {
            PixelType::Uint8 => AnyArray::Uint8(self.read().await?),
            PixelType::Int8 => AnyArray::Int8(self.read().await?),
            PixelType::Uint16 => AnyArray::Uint16(self.read().await?),
            PixelType::Int16 => AnyArray::Int16(self.read().await?),
            PixelType::Uint32 => AnyArray::Uint32(self.read().await?),
            PixelType::Int32 => AnyArray::Int32(self.read().await?),
            PixelType::Float => AnyArray::Float(self.read().await?),
            PixelType::Double => AnyArray::Double(self.read().await?),
        })
    }

    /// Materialize a rectangular region, one range per array axis.
    pub async fn read_region<T: Sample>(
        &self,
        region: &[Range<usize>],
    ) -> Result<ArrayD<T>, ReaderError> {
        let pixel_type = self.pixel_type();
        if T::PIXEL_TYPE != pixel_type {
            return Err(ReaderError::PixelTypeMismatch {
                actual: pixel_type.name(),
                requested: T::PIXEL_TYPE.name(),
            });
        }

        let shape = self.shape();
        if region.len() != shape.len() {
            return Err(ReaderError::InvalidRequest(format!(
                "{} ranges given for {} axes",
                region.len(),
                shape.len()
            )));
        }
        for ((range, &size), axis) in region.iter().zip(&shape).zip(&self.axes) {
            if range.start > range.end || range.end > size {
                return Err(ReaderError::InvalidRequest(format!(
                    "range {:?} does not fit axis {} of size {}",
                    range, axis, size
                )));
            }
        }

        let ranges: Vec<Range<usize>> = STORAGE_AXES
            .iter()
            .map(|axis| match self.axes.iter().position(|a| a == axis) {
                Some(i) => region[i].clone(),
                None => 0..1,
            })
            .collect();
        let dims: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        let mut stored = ArrayD::from_elem(IxDyn(&dims), T::default());

        let [t_range, z_range, c_range, y_range, x_range] = [
            ranges[0].clone(),
            ranges[1].clone(),
            ranges[2].clone(),
            ranges[3].clone(),
            ranges[4].clone(),
        ];
        if !stored.is_empty() {
            for t in t_range.clone() {
                for z in z_range.clone() {
                    for c in c_range.clone() {
                        let mut plane = stored
                            .slice_mut(s![t - t_range.start, z - z_range.start, c - c_range.start, .., ..])
                            .into_dimensionality::<Ix2>()
                            .map_err(|e| ReaderError::InvalidRequest(e.to_string()))?;
                        self.fill_plane(&mut plane, (z, c, t), &y_range, &x_range)
                            .await?;
                    }
                }
            }
        }

        // Drop the singleton storage axes, then order as this view
        let mut letters = STORAGE_AXES.to_vec();
        for k in (0..letters.len()).rev() {
            if !self.axes.contains(&letters[k]) {
                stored = stored.index_axis_move(Axis(k), 0);
                letters.remove(k);
            }
        }
        let perm = self
            .axes
            .iter()
            .map(|axis| letters.iter().position(|l| l == axis))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| ReaderError::InvalidRequest(format!("unknown axes {:?}", self.axes)))?;

        Ok(stored.permuted_axes(perm).as_standard_layout().into_owned())
    }

    /// Copy the samples of one logical plane covering `rows` x `cols`.
    async fn fill_plane<T: Sample>(
        &self,
        plane: &mut ArrayViewMut2<'_, T>,
        (z, c, t): (usize, usize, usize),
        rows: &Range<usize>,
        cols: &Range<usize>,
    ) -> Result<(), ReaderError> {
        let source = &self.source;
        let (dir, sample) = source
            .pyramid
            .locate(self.level, z, c, t)
            .ok_or(ReaderError::MissingPlane { z, c, t })?;

        let (chunk_w, chunk_h) = dir.chunk_size();
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
        let bytes_per_sample = dir.pixel_type.bytes_per_sample();
        let spp = dir.samples_per_pixel as usize;

        for chunk_y in rows.start / chunk_h..rows.end.div_ceil(chunk_h) {
            for chunk_x in cols.start / chunk_w..cols.end.div_ceil(chunk_w) {
                let index = dir
                    .chunk_index(chunk_x as u32, chunk_y as u32)
                    .ok_or_else(|| {
                        ReaderError::InvalidRequest(format!(
                            "chunk ({}, {}) outside level {}",
                            chunk_x, chunk_y, self.level
                        ))
                    })?;
                let data = source.chunk(self.level, dir, chunk_y as u32, index).await?;
                let (stored_w, _) = dir.stored_chunk_dimensions(chunk_y as u32);

                let (y0, x0) = (chunk_y * chunk_h, chunk_x * chunk_w);
                let y_end = rows.end.min(y0 + chunk_h);
                let x_end = cols.end.min(x0 + chunk_w);

                for y in rows.start.max(y0)..y_end {
                    let row = (y - y0) * stored_w as usize;
                    for x in cols.start.max(x0)..x_end {
                        let at = ((row + x - x0) * spp + sample) * bytes_per_sample;
                        let bytes = data.get(at..at + bytes_per_sample).ok_or_else(|| {
                            ReaderError::Decode {
                                level: self.level,
                                chunk: index,
                                message: format!("sample at byte {} is past the chunk end", at),
                            }
                        })?;
                        plane[[y - rows.start, x - cols.start]] = T::from_ne_slice(bytes);
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for LevelArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelArray")
            .field("source", &self.source.source_id)
            .field("level", &self.level)
            .field("axes", &self.axes())
            .field("shape", &self.shape())
            .field("pixel_type", &self.pixel_type())
            .finish()
    }
}
