//! TIFF tag value reading.
//!
//! Values can be stored either inline in the IFD entry (for small values)
//! or at an offset in the file (for larger values like arrays). Arrays such
//! as TileOffsets or SubIFDs are fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values respecting the file's byte order and format.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

/// Tag name for error messages.
fn tag_name(entry: &IfdEntry) -> &'static str {
    match TiffTag::from_u16(entry.tag_id) {
        Some(TiffTag::TileOffsets) => "TileOffsets",
        Some(TiffTag::TileByteCounts) => "TileByteCounts",
        Some(TiffTag::StripOffsets) => "StripOffsets",
        Some(TiffTag::StripByteCounts) => "StripByteCounts",
        Some(TiffTag::SubIfds) => "SubIFDs",
        Some(TiffTag::BitsPerSample) => "BitsPerSample",
        Some(TiffTag::SampleFormat) => "SampleFormat",
        Some(TiffTag::ImageDescription) => "ImageDescription",
        Some(TiffTag::JpegTables) => "JPEGTables",
        Some(_) => "tag",
        None => "unknown",
    }
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry.
    /// For offset values, fetches the bytes from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let bytes = self.reader.read_exact_at(offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Read a single unsigned value, converting Short/Long/Long8 as needed.
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected count 1, got {}", entry.count),
            });
        }
        let values = self.read_u64_array(entry).await?;
        values.first().copied().ok_or(TiffError::InvalidTagValue {
            tag: tag_name(entry),
            message: "empty value".to_string(),
        })
    }

    /// Read an array of unsigned integers as u64.
    ///
    /// Used for chunk offsets, byte counts and SubIFD offsets. Accepts the
    /// integer and IFD field types since writers disagree on which to use
    /// for SubIFDs.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if !field_type.is_unsigned_integer() {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected an unsigned integer array, got {:?}", field_type),
            });
        }

        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        Ok(decode_unsigned(&bytes, count, field_type, self.header.byte_order))
    }

    /// Read an array of u16 values (BitsPerSample, SampleFormat).
    pub async fn read_u16_array(&self, entry: &IfdEntry) -> Result<Vec<u16>, TiffError> {
        let values = self.read_u64_array(entry).await?;
        values
            .into_iter()
            .map(|v| {
                u16::try_from(v).map_err(|_| TiffError::InvalidTagValue {
                    tag: tag_name(entry),
                    message: format!("value {} does not fit in 16 bits", v),
                })
            })
            .collect()
    }

    /// Read a string value from an entry (ASCII type).
    ///
    /// Stops at the first NUL. Invalid UTF-8 is replaced rather than
    /// rejected; OME-XML is always UTF-8 but other descriptions may not be.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if !matches!(field_type, FieldType::Ascii | FieldType::Byte | FieldType::Undefined) {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected Ascii type for string, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read opaque bytes (JPEGTables).
    pub async fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        self.read_bytes(entry).await
    }
}

/// Decode `count` unsigned values of `field_type` from `bytes`.
///
/// Stops early if `bytes` is shorter than `count` values.
fn decode_unsigned(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    bytes
        .chunks_exact(width)
        .take(count)
        .map(|chunk| match width {
            1 => chunk[0] as u64,
            2 => byte_order.read_u16(chunk) as u64,
            4 => byte_order.read_u32(chunk) as u64,
            _ => byte_order.read_u64(chunk),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
