//! Test utilities for integration tests.
//!
//! Provides a tracking range reader and a builder that writes complete
//! OME-TIFF files (classic or BigTIFF, either byte order, tiled or stripped,
//! uncompressed / deflate / JPEG) with SubIFD pyramids.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ometiff_reader::error::IoError;
use ometiff_reader::io::RangeReader;

// =============================================================================
// Mock Range Reader with Request Tracking
// =============================================================================

/// An in-memory range reader that counts read requests.
pub struct TrackingMockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
}

impl TrackingMockReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn reset_tracking(&self) {
        self.request_count.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl RangeReader for TrackingMockReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Low-level TIFF Writer
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

/// Tag value to serialize.
enum Value {
    /// Integers of the entry's field type
    Ints(Vec<u64>),
    /// Raw bytes (ASCII, UNDEFINED)
    Bytes(Vec<u8>),
}

struct Entry {
    tag: u16,
    field_type: u16,
    value: Value,
}

fn field_type_size(field_type: u16) -> usize {
    match field_type {
        1 | 2 | 6 | 7 => 1,
        3 | 8 => 2,
        4 | 9 | 11 | 13 => 4,
        _ => 8,
    }
}

struct TiffWriter {
    data: Vec<u8>,
    byte_order: ByteOrderType,
    bigtiff: bool,
}

impl TiffWriter {
    fn new(byte_order: ByteOrderType, bigtiff: bool) -> Self {
        let mut writer = Self {
            data: Vec::new(),
            byte_order,
            bigtiff,
        };
        let magic = match byte_order {
            ByteOrderType::LittleEndian => b"II",
            ByteOrderType::BigEndian => b"MM",
        };
        writer.data.extend_from_slice(magic);
        if bigtiff {
            writer.put(43, 2);
            writer.put(8, 2);
            writer.put(0, 2);
            writer.put(0, 8);
        } else {
            writer.put(42, 2);
            writer.put(0, 4);
        }
        writer
    }

    fn offset_size(&self) -> usize {
        if self.bigtiff {
            8
        } else {
            4
        }
    }

    fn encode(&self, value: u64, size: usize) -> Vec<u8> {
        let bytes = value.to_le_bytes();
        let mut out = bytes[..size].to_vec();
        if self.byte_order == ByteOrderType::BigEndian {
            out.reverse();
        }
        out
    }

    fn put(&mut self, value: u64, size: usize) {
        let bytes = self.encode(value, size);
        self.data.extend_from_slice(&bytes);
    }

    fn patch(&mut self, at: usize, value: u64, size: usize) {
        let bytes = self.encode(value, size);
        self.data[at..at + size].copy_from_slice(&bytes);
    }

    fn align(&mut self) {
        if self.data.len() % 2 == 1 {
            self.data.push(0);
        }
    }

    /// Append raw bytes, returning their offset.
    fn blob(&mut self, bytes: &[u8]) -> u64 {
        self.align();
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Write an IFD followed by its out-of-line values.
    ///
    /// Returns the IFD offset and the position of its next-IFD field.
    fn ifd(&mut self, mut entries: Vec<Entry>) -> (u64, usize) {
        entries.sort_by_key(|e| e.tag);
        self.align();

        let offset = self.data.len() as u64;
        let (count_size, entry_size) = if self.bigtiff { (8, 20) } else { (2, 12) };
        let inline = self.offset_size();
        let ifd_size = count_size + entries.len() * entry_size + inline;

        let mut external = Vec::new();
        let external_start = offset as usize + ifd_size;

        self.put(entries.len() as u64, count_size);
        for entry in &entries {
            let (count, bytes) = match &entry.value {
                Value::Ints(values) => {
                    let size = field_type_size(entry.field_type);
                    let bytes: Vec<u8> = values.iter().flat_map(|&v| self.encode(v, size)).collect();
                    (values.len(), bytes)
                }
                Value::Bytes(bytes) => (bytes.len(), bytes.clone()),
            };

            self.put(entry.tag as u64, 2);
            self.put(entry.field_type as u64, 2);
            self.put(count as u64, inline);
            if bytes.len() <= inline {
                let mut padded = bytes;
                padded.resize(inline, 0);
                self.data.extend_from_slice(&padded);
            } else {
                self.put((external_start + external.len()) as u64, inline);
                external.extend_from_slice(&bytes);
                if external.len() % 2 == 1 {
                    external.push(0);
                }
            }
        }

        let next_field = self.data.len();
        self.put(0, inline);
        self.data.extend_from_slice(&external);
        (offset, next_field)
    }
}

// =============================================================================
// Pixel Data
// =============================================================================

/// Deterministic sample value for a position in the pyramid.
///
/// `c` is the logical channel (for RGB, the sample index).
pub fn sample_value(level: usize, z: usize, c: usize, t: usize, y: usize, x: usize) -> u64 {
    (x + 3 * y + 40 * c + 7 * z + 11 * t + 50 * level) as u64
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Layout {
    Tiles(u32, u32),
    Strips(u32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Codec {
    None,
    Deflate,
    Jpeg,
    Lzw,
}

impl Codec {
    fn tag_value(self) -> u64 {
        match self {
            Codec::None => 1,
            Codec::Deflate => 8,
            Codec::Jpeg => 7,
            Codec::Lzw => 5,
        }
    }
}

// =============================================================================
// OME-TIFF Builder
// =============================================================================

/// Description of a synthetic OME-TIFF file.
#[derive(Clone, Debug)]
pub struct OmeTiffSpec {
    pub byte_order: ByteOrderType,
    pub bigtiff: bool,
    pub dimension_order: &'static str,
    pub width: u32,
    pub height: u32,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    /// 3 stores C as interleaved RGB samples
    pub samples_per_pixel: usize,
    /// "uint8" or "uint16"
    pub pixel_type: &'static str,
    /// Total levels including full resolution
    pub levels: usize,
    pub layout: Layout,
    pub codec: Codec,
    /// Physical size and unit for both X and Y
    pub physical_size: Option<(f64, &'static str)>,
    /// Emit one TiffData per plane
    pub tiff_data: bool,
    /// Store planes in reverse IFD order (requires `tiff_data`)
    pub reverse_ifds: bool,
    /// Replace the OME-XML with this description
    pub description: Option<String>,
}

impl Default for OmeTiffSpec {
    fn default() -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            bigtiff: false,
            dimension_order: "XYZCT",
            width: 40,
            height: 24,
            size_z: 1,
            size_c: 3,
            size_t: 1,
            samples_per_pixel: 3,
            pixel_type: "uint8",
            levels: 3,
            layout: Layout::Tiles(16, 16),
            codec: Codec::None,
            physical_size: Some((0.25, "µm")),
            tiff_data: false,
            reverse_ifds: false,
            description: None,
        }
    }
}

impl OmeTiffSpec {
    pub fn bytes_per_sample(&self) -> usize {
        match self.pixel_type {
            "uint16" => 2,
            _ => 1,
        }
    }

    pub fn level_size(&self, level: usize) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    fn plane_axes(&self) -> Vec<char> {
        self.dimension_order.chars().skip(2).collect()
    }

    fn plane_sizes(&self) -> [usize; 3] {
        let c_planes = self.size_c / self.samples_per_pixel;
        let mut sizes = [0; 3];
        for (slot, axis) in sizes.iter_mut().zip(self.plane_axes()) {
            *slot = match axis {
                'Z' => self.size_z,
                'C' => c_planes,
                _ => self.size_t,
            };
        }
        sizes
    }

    pub fn plane_count(&self) -> usize {
        self.plane_sizes().iter().product()
    }

    /// (z, c-plane, t) of plane `index` in DimensionOrder.
    pub fn plane_coordinates(&self, index: usize) -> (usize, usize, usize) {
        let sizes = self.plane_sizes();
        let values = [
            index % sizes[0],
            (index / sizes[0]) % sizes[1],
            index / (sizes[0] * sizes[1]),
        ];
        let (mut z, mut c, mut t) = (0, 0, 0);
        for (axis, value) in self.plane_axes().into_iter().zip(values) {
            match axis {
                'Z' => z = value,
                'C' => c = value,
                _ => t = value,
            }
        }
        (z, c, t)
    }

    pub fn ome_xml(&self) -> String {
        let mut pixels_attrs = format!(
            r#"ID="Pixels:0" DimensionOrder="{}" Type="{}" SizeX="{}" SizeY="{}" SizeZ="{}" SizeC="{}" SizeT="{}" BigEndian="{}" Interleaved="{}""#,
            self.dimension_order,
            self.pixel_type,
            self.width,
            self.height,
            self.size_z,
            self.size_c,
            self.size_t,
            self.byte_order == ByteOrderType::BigEndian,
            self.samples_per_pixel > 1,
        );
        if let Some((size, unit)) = self.physical_size {
            pixels_attrs.push_str(&format!(
                r#" PhysicalSizeX="{size}" PhysicalSizeXUnit="{unit}" PhysicalSizeY="{size}" PhysicalSizeYUnit="{unit}""#
            ));
        }

        let mut children = String::new();
        for channel in 0..self.size_c / self.samples_per_pixel {
            children.push_str(&format!(
                r#"<Channel ID="Channel:0:{}" SamplesPerPixel="{}"><LightPath/></Channel>"#,
                channel, self.samples_per_pixel
            ));
        }
        if self.tiff_data {
            for plane in 0..self.plane_count() {
                let (z, c, t) = self.plane_coordinates(plane);
                children.push_str(&format!(
                    r#"<TiffData IFD="{}" FirstZ="{}" FirstC="{}" FirstT="{}" PlaneCount="1"/>"#,
                    self.ifd_for_plane(plane),
                    z,
                    c,
                    t
                ));
            }
        }

        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06" Creator="ometiff-reader tests">"#,
                r#"<Instrument ID="Instrument:0"/>"#,
                r#"<Image ID="Image:0" Name="synthetic"><AcquisitionDate>2024-01-01T00:00:00</AcquisitionDate>"#,
                r#"<Pixels {}>{}</Pixels></Image></OME>"#
            ),
            pixels_attrs, children
        )
    }

    fn ifd_for_plane(&self, plane: usize) -> usize {
        if self.reverse_ifds {
            self.plane_count() - 1 - plane
        } else {
            plane
        }
    }

    /// Interleaved samples of one plane at one level, in file byte order.
    fn plane_samples(&self, level: usize, plane: usize) -> Vec<u8> {
        let (width, height) = self.level_size(level);
        let (z, c_plane, t) = self.plane_coordinates(plane);
        let bps = self.bytes_per_sample();
        let mut out = Vec::new();
        for y in 0..height as usize {
            for x in 0..width as usize {
                for s in 0..self.samples_per_pixel {
                    let c = c_plane * self.samples_per_pixel + s;
                    let value = sample_value(level, z, c, t, y, x);
                    let bytes = if bps == 2 {
                        match self.byte_order {
                            ByteOrderType::LittleEndian => (value as u16).to_le_bytes().to_vec(),
                            ByteOrderType::BigEndian => (value as u16).to_be_bytes().to_vec(),
                        }
                    } else {
                        vec![value as u8]
                    };
                    out.extend_from_slice(&bytes);
                }
            }
        }
        out
    }

    /// Split a plane into stored chunks.
    fn chunks(&self, level: usize, plane: usize) -> Vec<Vec<u8>> {
        let (width, height) = self.level_size(level);
        let (width, height) = (width as usize, height as usize);
        let pixel = self.samples_per_pixel * self.bytes_per_sample();
        let samples = self.plane_samples(level, plane);

        let raw: Vec<(Vec<u8>, usize, usize)> = match self.layout {
            Layout::Tiles(tw, th) => {
                let (tw, th) = (tw as usize, th as usize);
                let mut tiles = Vec::new();
                for ty in 0..height.div_ceil(th) {
                    for tx in 0..width.div_ceil(tw) {
                        let mut tile = vec![0u8; tw * th * pixel];
                        for row in 0..th {
                            let y = ty * th + row;
                            if y >= height {
                                break;
                            }
                            let cols = tw.min(width - tx * tw);
                            let src = (y * width + tx * tw) * pixel;
                            let dst = row * tw * pixel;
                            tile[dst..dst + cols * pixel]
                                .copy_from_slice(&samples[src..src + cols * pixel]);
                        }
                        tiles.push((tile, tw, th));
                    }
                }
                tiles
            }
            Layout::Strips(rows) => {
                let rows = rows as usize;
                (0..height.div_ceil(rows))
                    .map(|strip| {
                        let start = strip * rows;
                        let end = (start + rows).min(height);
                        (
                            samples[start * width * pixel..end * width * pixel].to_vec(),
                            width,
                            end - start,
                        )
                    })
                    .collect()
            }
        };

        raw.into_iter()
            .map(|(chunk, w, h)| self.compress(chunk, w as u32, h as u32))
            .collect()
    }

    fn compress(&self, chunk: Vec<u8>, width: u32, height: u32) -> Vec<u8> {
        match self.codec {
            Codec::None => chunk,
            Codec::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&chunk).unwrap();
                encoder.finish().unwrap()
            }
            Codec::Jpeg => {
                let mut buf = Vec::new();
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, 100);
                if self.samples_per_pixel == 3 {
                    let img = RgbImage::from_raw(width, height, chunk).unwrap();
                    encoder.encode_image(&img).unwrap();
                } else {
                    let img = GrayImage::from_raw(width, height, chunk).unwrap();
                    encoder.encode_image(&img).unwrap();
                }
                buf
            }
            Codec::Lzw => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .encode(&chunk)
                .unwrap(),
        }
    }

    fn image_entries(&self, writer: &TiffWriter, level: usize, offsets: Vec<u64>, counts: Vec<u64>) -> Vec<Entry> {
        let (width, height) = self.level_size(level);
        let spp = self.samples_per_pixel;
        let offset_type = if writer.bigtiff { 16 } else { 4 };
        let ints = |values: Vec<u64>| Value::Ints(values);

        let mut entries = vec![
            Entry { tag: 256, field_type: 4, value: ints(vec![width as u64]) },
            Entry { tag: 257, field_type: 4, value: ints(vec![height as u64]) },
            Entry { tag: 258, field_type: 3, value: ints(vec![8 * self.bytes_per_sample() as u64; spp]) },
            Entry { tag: 259, field_type: 3, value: ints(vec![self.codec.tag_value()]) },
            Entry { tag: 262, field_type: 3, value: ints(vec![if spp == 3 { 2 } else { 1 }]) },
            Entry { tag: 277, field_type: 3, value: ints(vec![spp as u64]) },
            Entry { tag: 284, field_type: 3, value: ints(vec![1]) },
            Entry { tag: 339, field_type: 3, value: ints(vec![1; spp]) },
        ];
        if level > 0 {
            entries.push(Entry { tag: 254, field_type: 4, value: ints(vec![1]) });
        }
        match self.layout {
            Layout::Tiles(tw, th) => {
                entries.push(Entry { tag: 322, field_type: 3, value: ints(vec![tw as u64]) });
                entries.push(Entry { tag: 323, field_type: 3, value: ints(vec![th as u64]) });
                entries.push(Entry { tag: 324, field_type: offset_type, value: ints(offsets) });
                entries.push(Entry { tag: 325, field_type: offset_type, value: ints(counts) });
            }
            Layout::Strips(rows) => {
                entries.push(Entry { tag: 278, field_type: 4, value: ints(vec![rows as u64]) });
                entries.push(Entry { tag: 273, field_type: offset_type, value: ints(offsets) });
                entries.push(Entry { tag: 279, field_type: offset_type, value: ints(counts) });
            }
        }
        entries
    }

    /// Serialize the file.
    pub fn build(&self) -> Vec<u8> {
        let mut writer = TiffWriter::new(self.byte_order, self.bigtiff);
        let plane_count = self.plane_count();

        // Pixel data first: chunk offsets per (plane, level)
        let mut locations = vec![Vec::new(); plane_count];
        for (plane, slots) in locations.iter_mut().enumerate() {
            for level in 0..self.levels {
                let (offsets, counts): (Vec<u64>, Vec<u64>) = self
                    .chunks(level, plane)
                    .iter()
                    .map(|chunk| (writer.blob(chunk), chunk.len() as u64))
                    .unzip();
                slots.push((offsets, counts));
            }
        }

        let description = self.description.clone().unwrap_or_else(|| self.ome_xml());
        let header_next = if self.bigtiff { 8 } else { 4 };
        let mut previous_next: Option<usize> = None;

        for ifd_index in 0..plane_count {
            let plane = (0..plane_count)
                .find(|&p| self.ifd_for_plane(p) == ifd_index)
                .unwrap();
            let mut levels = locations[plane].clone().into_iter();
            let Some((base_offsets, base_counts)) = levels.next() else {
                continue;
            };

            let sub_offsets: Vec<u64> = levels
                .enumerate()
                .map(|(i, (offsets, counts))| {
                    let entries = self.image_entries(&writer, i + 1, offsets, counts);
                    writer.ifd(entries).0
                })
                .collect();

            let mut entries = self.image_entries(&writer, 0, base_offsets, base_counts);
            if !sub_offsets.is_empty() {
                let sub_type = if self.bigtiff { 18 } else { 13 };
                entries.push(Entry {
                    tag: 330,
                    field_type: sub_type,
                    value: Value::Ints(sub_offsets),
                });
            }
            if ifd_index == 0 {
                let mut text = description.clone().into_bytes();
                text.push(0);
                entries.push(Entry {
                    tag: 270,
                    field_type: 2,
                    value: Value::Bytes(text),
                });
            }

            let (offset, next_field) = writer.ifd(entries);
            let size = writer.offset_size();
            match previous_next {
                Some(at) => writer.patch(at, offset, size),
                None => writer.patch(header_next, offset, size),
            }
            previous_next = Some(next_field);
        }

        writer.data
    }
}

/// RGB uint8 pyramid with default geometry.
pub fn rgb_pyramid() -> OmeTiffSpec {
    OmeTiffSpec::default()
}

/// Multi-channel uint16 pyramid with separate planes per channel.
pub fn multichannel_pyramid() -> OmeTiffSpec {
    OmeTiffSpec {
        size_c: 2,
        size_z: 3,
        samples_per_pixel: 1,
        pixel_type: "uint16",
        layout: Layout::Strips(5),
        ..OmeTiffSpec::default()
    }
}
