//! IFD chain traversal and image directory loading.
//!
//! A [`TiffFile`] is the header plus every IFD of the main chain, in file
//! order. Reduced-resolution images hang off the main IFDs through the
//! SubIFDs tag and are reached with [`TiffFile::sub_ifd_offsets`].
//!
//! An [`ImageDirectory`] is an IFD resolved into everything needed to
//! decode its pixels: geometry, sample layout, compression and the chunk
//! (tile or strip) location tables.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::TiffError;
use crate::format::pixel::{PixelType, SAMPLE_FORMAT_UINT};
use crate::io::RangeReader;

use super::parser::{Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{TiffTag, PREDICTOR_NONE};
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to follow in the main chain (safety limit)
pub const MAX_IFDS: usize = 65_536;

/// Compression value when the tag is absent
const DEFAULT_COMPRESSION: u16 = 1;

/// PlanarConfiguration value for interleaved samples
pub const PLANAR_CHUNKY: u16 = 1;

// =============================================================================
// TiffFile
// =============================================================================

/// Header and main IFD chain of a TIFF file.
#[derive(Debug, Clone)]
pub struct TiffFile {
    pub header: TiffHeader,

    /// `(offset, ifd)` for every directory of the main chain
    pub ifds: Vec<(u64, Ifd)>,
}

impl TiffFile {
    /// Parse the header and walk the main IFD chain.
    ///
    /// The walk stops at a zero next-offset, at a repeated offset, or after
    /// [`MAX_IFDS`] directories.
    pub async fn open<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let mut ifds = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 {
            if ifds.len() >= MAX_IFDS {
                warn!(
                    file = reader.identifier(),
                    "stopping IFD walk after {} directories", MAX_IFDS
                );
                break;
            }
            if !visited.insert(offset) {
                warn!(
                    file = reader.identifier(),
                    offset, "IFD chain loops back on itself"
                );
                break;
            }

            let ifd = Self::read_ifd(reader, &header, offset).await?;
            let next = ifd.next_ifd_offset;
            ifds.push((offset, ifd));
            offset = next;
        }

        debug!(
            file = reader.identifier(),
            bigtiff = header.is_bigtiff,
            ifds = ifds.len(),
            "parsed TIFF structure"
        );

        Ok(TiffFile { header, ifds })
    }

    /// Read and parse the IFD at `offset`.
    pub async fn read_ifd<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Ifd, TiffError> {
        let size = reader.size();
        let count_size = header.ifd_count_size();
        let entries_start = offset
            .checked_add(count_size as u64)
            .filter(|&end| end <= size)
            .ok_or(TiffError::InvalidIfdOffset(offset))?;

        let count_bytes = reader.read_exact_at(offset, count_size).await?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };

        // The entries must fit in what is left of the file
        let max_entries = (size - entries_start) / header.ifd_entry_size() as u64;
        if entry_count > max_entries {
            return Err(TiffError::InvalidIfdOffset(offset));
        }
        let ifd_size = Ifd::calculate_size(entry_count, header)
            .filter(|&len| offset + len as u64 <= size)
            .ok_or(TiffError::InvalidIfdOffset(offset))?;

        let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
        Ifd::parse(&ifd_bytes, header)
    }

    /// Number of directories in the main chain.
    pub fn ifd_count(&self) -> usize {
        self.ifds.len()
    }

    /// The first directory, which carries the file-level description.
    pub fn first_ifd(&self) -> Option<&Ifd> {
        self.ifds.first().map(|(_, ifd)| ifd)
    }

    /// ImageDescription of the first directory, if any.
    pub async fn description<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
    ) -> Result<Option<String>, TiffError> {
        let Some(entry) = self
            .first_ifd()
            .and_then(|ifd| ifd.get_entry_by_tag(TiffTag::ImageDescription))
        else {
            return Ok(None);
        };
        let values = ValueReader::new(reader, &self.header);
        Ok(Some(values.read_string(entry).await?))
    }

    /// Offsets listed in the SubIFDs tag of `ifd`, empty if absent.
    pub async fn sub_ifd_offsets<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        ifd: &Ifd,
    ) -> Result<Vec<u64>, TiffError> {
        match ifd.get_entry_by_tag(TiffTag::SubIfds) {
            Some(entry) => {
                let values = ValueReader::new(reader, &self.header);
                values.read_u64_array(entry).await
            }
            None => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// ImageDirectory
// =============================================================================

/// How pixel data is split into independently compressed chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLayout {
    /// Fixed-size tiles; edge tiles are padded to the full tile size
    Tiles { width: u32, height: u32 },

    /// Full-width strips; the last strip holds only the remaining rows
    Strips { rows_per_strip: u32 },
}

/// An IFD resolved into decodable image geometry.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    /// Offset of the IFD in the file, unique per directory
    pub offset: u64,

    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u16,
    pub pixel_type: PixelType,
    pub compression: u16,
    pub predictor: u16,
    pub planar_configuration: u16,
    pub layout: ChunkLayout,

    /// Chunks in the horizontal direction (1 for strips)
    pub chunks_across: u32,

    /// Chunks in the vertical direction
    pub chunks_down: u32,

    pub chunk_offsets: Vec<u64>,
    pub chunk_byte_counts: Vec<u64>,

    /// Shared JPEG tables for abbreviated JPEG chunks
    pub jpeg_tables: Option<Bytes>,
}

fn invalid(tag: &'static str, message: impl Into<String>) -> TiffError {
    TiffError::InvalidTagValue {
        tag,
        message: message.into(),
    }
}

impl ImageDirectory {
    /// Resolve the IFD at `offset`, reading the out-of-line arrays it needs.
    pub async fn load<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        offset: u64,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let byte_order = header.byte_order;
        let values = ValueReader::new(reader, header);

        let width = ifd
            .image_width(byte_order)
            .ok_or(TiffError::MissingTag("ImageWidth"))?;
        let height = ifd
            .image_height(byte_order)
            .ok_or(TiffError::MissingTag("ImageLength"))?;
        if width == 0 || height == 0 {
            return Err(invalid(
                "ImageWidth/ImageLength",
                format!("empty image {}x{}", width, height),
            ));
        }

        let samples_per_pixel = ifd.samples_per_pixel(byte_order).unwrap_or(1).max(1);

        let bits = match ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            Some(entry) => values.read_u16_array(entry).await?,
            None => vec![1],
        };
        let bits_per_sample = bits.first().copied().unwrap_or(1);
        if bits.iter().any(|&b| b != bits_per_sample) {
            return Err(invalid(
                "BitsPerSample",
                format!("mixed sample sizes {:?}", bits),
            ));
        }

        let sample_format = match ifd.get_entry_by_tag(TiffTag::SampleFormat) {
            Some(entry) => values
                .read_u16_array(entry)
                .await?
                .first()
                .copied()
                .unwrap_or(SAMPLE_FORMAT_UINT),
            None => SAMPLE_FORMAT_UINT,
        };

        let pixel_type = PixelType::from_tiff(bits_per_sample, sample_format).ok_or_else(|| {
            invalid(
                "BitsPerSample",
                format!(
                    "{} bits with sample format {} is not supported",
                    bits_per_sample, sample_format
                ),
            )
        })?;

        let (layout, chunks_across, chunks_down, offsets_tag, counts_tag) = if ifd.is_tiled() {
            let tile_width = ifd
                .tile_width(byte_order)
                .ok_or(TiffError::MissingTag("TileWidth"))?;
            let tile_height = ifd
                .tile_height(byte_order)
                .ok_or(TiffError::MissingTag("TileLength"))?;
            if tile_width == 0 || tile_height == 0 {
                return Err(invalid(
                    "TileWidth/TileLength",
                    format!("zero tile size {}x{}", tile_width, tile_height),
                ));
            }
            (
                ChunkLayout::Tiles {
                    width: tile_width,
                    height: tile_height,
                },
                width.div_ceil(tile_width),
                height.div_ceil(tile_height),
                (TiffTag::TileOffsets, "TileOffsets"),
                (TiffTag::TileByteCounts, "TileByteCounts"),
            )
        } else if ifd.is_stripped() {
            let rows_per_strip = ifd
                .rows_per_strip(byte_order)
                .unwrap_or(height)
                .clamp(1, height);
            (
                ChunkLayout::Strips { rows_per_strip },
                1,
                height.div_ceil(rows_per_strip),
                (TiffTag::StripOffsets, "StripOffsets"),
                (TiffTag::StripByteCounts, "StripByteCounts"),
            )
        } else {
            return Err(TiffError::MissingTag("TileOffsets"));
        };

        let offsets_entry = ifd
            .get_entry_by_tag(offsets_tag.0)
            .ok_or(TiffError::MissingTag(offsets_tag.1))?;
        let counts_entry = ifd
            .get_entry_by_tag(counts_tag.0)
            .ok_or(TiffError::MissingTag(counts_tag.1))?;
        let chunk_offsets = values.read_u64_array(offsets_entry).await?;
        let chunk_byte_counts = values.read_u64_array(counts_entry).await?;

        let expected = chunks_across as usize * chunks_down as usize;
        if chunk_offsets.len() < expected || chunk_byte_counts.len() < expected {
            return Err(invalid(
                offsets_tag.1,
                format!(
                    "expected {} chunks, found {} offsets and {} byte counts",
                    expected,
                    chunk_offsets.len(),
                    chunk_byte_counts.len()
                ),
            ));
        }

        let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_raw_bytes(entry).await?),
            None => None,
        };

        Ok(ImageDirectory {
            offset,
            width,
            height,
            samples_per_pixel,
            pixel_type,
            compression: ifd.compression(byte_order).unwrap_or(DEFAULT_COMPRESSION),
            predictor: ifd.predictor(byte_order).unwrap_or(PREDICTOR_NONE),
            planar_configuration: ifd.planar_configuration(byte_order).unwrap_or(PLANAR_CHUNKY),
            layout,
            chunks_across,
            chunks_down,
            chunk_offsets,
            chunk_byte_counts,
            jpeg_tables,
        })
    }

    /// Total number of chunks.
    pub fn chunk_count(&self) -> u32 {
        self.chunks_across * self.chunks_down
    }

    /// Nominal chunk size `(width, height)`.
    pub fn chunk_size(&self) -> (u32, u32) {
        match self.layout {
            ChunkLayout::Tiles { width, height } => (width, height),
            ChunkLayout::Strips { rows_per_strip } => (self.width, rows_per_strip),
        }
    }

    /// Row-major chunk index for a chunk coordinate.
    pub fn chunk_index(&self, chunk_x: u32, chunk_y: u32) -> Option<u32> {
        if chunk_x >= self.chunks_across || chunk_y >= self.chunks_down {
            return None;
        }
        Some(chunk_y * self.chunks_across + chunk_x)
    }

    /// Dimensions of the decoded buffer for a chunk row.
    ///
    /// Tiles are always stored at full size; only the final strip is short.
    pub fn stored_chunk_dimensions(&self, chunk_y: u32) -> (u32, u32) {
        match self.layout {
            ChunkLayout::Tiles { width, height } => (width, height),
            ChunkLayout::Strips { rows_per_strip } => {
                let start = chunk_y * rows_per_strip;
                (self.width, rows_per_strip.min(self.height.saturating_sub(start)))
            }
        }
    }

    /// `(offset, byte_count)` of a chunk.
    pub fn chunk_location(&self, index: u32) -> Option<(u64, u64)> {
        let idx = index as usize;
        Some((
            *self.chunk_offsets.get(idx)?,
            *self.chunk_byte_counts.get(idx)?,
        ))
    }

    /// Bytes of one decoded pixel (all samples).
    pub fn bytes_per_pixel(&self) -> usize {
        self.pixel_type.bytes_per_sample() * self.samples_per_pixel as usize
    }
}

// =============================================================================
// Tests
// =============================================================================
