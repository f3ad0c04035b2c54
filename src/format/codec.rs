//! Chunk decompression.
//!
//! Turns the stored bytes of one tile or strip into native-endian,
//! pixel-interleaved samples covering the chunk's stored dimensions.

use std::io::Read;

use flate2::read::ZlibDecoder;

use super::jpeg::decode_jpeg_chunk;
use super::tiff::{ByteOrder, Compression, ImageDirectory, PREDICTOR_HORIZONTAL};

/// Decode one chunk of `dir`.
///
/// `chunk_y` selects the chunk row, which only matters for the short final
/// strip. The result holds exactly `width * height * bytes_per_pixel` bytes
/// of the stored chunk dimensions.
pub fn decode_chunk(
    dir: &ImageDirectory,
    byte_order: ByteOrder,
    chunk_y: u32,
    raw: &[u8],
) -> Result<Vec<u8>, String> {
    let (width, height) = dir.stored_chunk_dimensions(chunk_y);
    let expected = width as usize * height as usize * dir.bytes_per_pixel();

    let mut data = match Compression::from_u16(dir.compression) {
        Some(Compression::None) => raw.to_vec(),
        Some(Compression::Lzw) => unlzw(raw, expected)?,
        Some(Compression::Deflate) | Some(Compression::AdobeDeflate) => inflate(raw, expected)?,
        Some(Compression::Jpeg) => {
            let (_, _, samples) =
                decode_jpeg_chunk(dir.jpeg_tables.as_deref(), raw, dir.samples_per_pixel)?;
            samples
        }
        Some(other) => return Err(format!("{} compression is not supported", other.name())),
        None => return Err(format!("unknown compression {}", dir.compression)),
    };

    if data.len() < expected {
        return Err(format!(
            "chunk holds {} bytes, expected {}",
            data.len(),
            expected
        ));
    }
    data.truncate(expected);

    let sample_size = dir.pixel_type.bytes_per_sample();
    if sample_size > 1 && !byte_order.is_native() {
        swap_sample_bytes(&mut data, sample_size);
    }

    if dir.predictor == PREDICTOR_HORIZONTAL {
        let row_len = width as usize * dir.samples_per_pixel as usize;
        undo_horizontal_predictor(&mut data, sample_size, row_len, dir.samples_per_pixel as usize)?;
    }

    Ok(data)
}

/// Inflate a zlib stream, stopping one byte past `expected`.
fn inflate(raw: &[u8], expected: usize) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(raw)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| format!("deflate: {}", e))?;
    Ok(out)
}

/// Decode a TIFF LZW stream (MSB-first codes with the early size switch).
///
/// Decoding stops at the end-of-information code or once `expected` bytes
/// are out, whichever comes first.
fn unlzw(raw: &[u8], expected: usize) -> Result<Vec<u8>, String> {
    let mut out = vec![0u8; expected];
    let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
    let (mut input, mut filled) = (raw, 0);

    while filled < expected {
        let result = decoder.decode_bytes(input, &mut out[filled..]);
        input = &input[result.consumed_in..];
        filled += result.consumed_out;
        match result.status {
            Ok(weezl::LzwStatus::Ok) if result.consumed_in == 0 && result.consumed_out == 0 => {
                break
            }
            Ok(weezl::LzwStatus::Ok) => {}
            Ok(_) => break,
            Err(e) => return Err(format!("lzw: {}", e)),
        }
    }

    out.truncate(filled);
    Ok(out)
}

/// Reverse the byte order of every `sample_size`-byte sample in place.
fn swap_sample_bytes(data: &mut [u8], sample_size: usize) {
    for sample in data.chunks_exact_mut(sample_size) {
        sample.reverse();
    }
}

/// Undo horizontal differencing on native-endian integer samples.
///
/// Within each row every sample is stored as the difference to the sample
/// of the same component one pixel to the left.
fn undo_horizontal_predictor(
    data: &mut [u8],
    sample_size: usize,
    row_samples: usize,
    samples_per_pixel: usize,
) -> Result<(), String> {
    macro_rules! accumulate {
        ($ty:ty) => {{
            const N: usize = std::mem::size_of::<$ty>();
            for row in data.chunks_exact_mut(row_samples * N) {
                for i in samples_per_pixel..row_samples {
                    let prev_at = (i - samples_per_pixel) * N;
                    let at = i * N;
                    let mut prev = [0u8; N];
                    prev.copy_from_slice(&row[prev_at..prev_at + N]);
                    let mut cur = [0u8; N];
                    cur.copy_from_slice(&row[at..at + N]);
                    let sum = <$ty>::from_ne_bytes(cur).wrapping_add(<$ty>::from_ne_bytes(prev));
                    row[at..at + N].copy_from_slice(&sum.to_ne_bytes());
                }
            }
        }};
    }

    match sample_size {
        1 => accumulate!(u8),
        2 => accumulate!(u16),
        4 => accumulate!(u32),
        8 => accumulate!(u64),
        n => return Err(format!("predictor on {}-byte samples", n)),
    }
    Ok(())
}
