//! JPEG chunk decoding.
//!
//! TIFF writers commonly store JPEG chunks as abbreviated streams: each chunk
//! omits the quantization (DQT) and Huffman (DHT) tables, which are written
//! once to the `JPEGTables` tag instead. Before decoding, the tables are
//! spliced in:
//!
//! ```text
//! tables: SOI DQT.. DHT.. EOI
//! chunk:  SOI SOF SOS <entropy-coded data> EOI
//! merged: SOI DQT.. DHT.. SOF SOS <entropy-coded data> EOI
//! ```

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use image::{ImageFormat, ImageReader};

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
const DHT: u8 = 0xC4;

/// Define Quantization Table marker
const DQT: u8 = 0xDB;

/// Start Of Scan marker
const SOS: u8 = 0xDA;

// =============================================================================
// Stream Analysis
// =============================================================================

/// Marker bytes of the header segments, up to and including SOS.
///
/// Standalone markers (SOI, EOI, RSTn, fill bytes) carry no length field.
fn header_markers(data: &[u8]) -> Vec<u8> {
    let mut markers = Vec::new();
    if data.len() < 4 || data[0..2] != SOI {
        return markers;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        match marker {
            0xFF => pos += 1,
            0x00 | 0x01 | 0xD0..=0xD9 => pos += 2,
            _ => {
                markers.push(marker);
                if marker == SOS || pos + 3 >= data.len() {
                    break;
                }
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
        }
    }
    markers
}

/// Whether the stream defines its own quantization or Huffman tables.
pub fn has_tables(data: &[u8]) -> bool {
    header_markers(data)
        .iter()
        .any(|&m| m == DQT || m == DHT)
}

/// Whether the stream reaches its scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    header_markers(data).last() == Some(&SOS) && !has_tables(data)
}

// =============================================================================
// Tables Merging
// =============================================================================

/// Splice `tables` (SOI..EOI) in front of an abbreviated chunk (SOI..EOI).
pub fn merge_jpeg_tables(tables: &[u8], chunk: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(chunk);
    }
    if chunk.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI[..]).unwrap_or(tables);
    let chunk = chunk.strip_prefix(&SOI[..]).unwrap_or(chunk);

    let mut merged = BytesMut::with_capacity(tables.len() + chunk.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(chunk);
    merged.freeze()
}

/// Complete a chunk stream with the shared tables when it needs them.
pub fn prepare_chunk_jpeg(tables: Option<&[u8]>, chunk: &[u8]) -> Bytes {
    match tables {
        Some(tables) if is_abbreviated_stream(chunk) => merge_jpeg_tables(tables, chunk),
        _ => Bytes::copy_from_slice(chunk),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a JPEG chunk into interleaved 8-bit samples.
///
/// `samples_per_pixel` selects luma (1) or RGB (3) output regardless of the
/// colour model stored in the stream. Returns the decoded dimensions with
/// the samples.
pub fn decode_jpeg_chunk(
    tables: Option<&[u8]>,
    chunk: &[u8],
    samples_per_pixel: u16,
) -> Result<(u32, u32, Vec<u8>), String> {
    let stream = prepare_chunk_jpeg(tables, chunk);
    let reader = ImageReader::with_format(Cursor::new(&stream[..]), ImageFormat::Jpeg);
    let img = reader.decode().map_err(|e| e.to_string())?;

    let (width, height) = (img.width(), img.height());
    let samples = match samples_per_pixel {
        1 => img.into_luma8().into_raw(),
        3 => img.into_rgb8().into_raw(),
        n => return Err(format!("cannot decode JPEG into {} samples per pixel", n)),
    };
    Ok((width, height, samples))
}

// =============================================================================
// Tests
// =============================================================================
