//! Pixel sample types shared by the TIFF directories and the OME metadata.

use std::fmt;

/// Sample type of an image, as named by the OME `Pixels/@Type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float,
    Double,
}

/// TIFF SampleFormat values.
pub const SAMPLE_FORMAT_UINT: u16 = 1;
pub const SAMPLE_FORMAT_INT: u16 = 2;
pub const SAMPLE_FORMAT_IEEEFP: u16 = 3;

impl PixelType {
    /// Parse an OME pixel type name (`uint8`, `float`, ...).
    ///
    /// `bit` and the complex types have no array representation here and
    /// return `None`.
    pub fn from_ome(name: &str) -> Option<Self> {
        match name {
            "uint8" => Some(PixelType::Uint8),
            "int8" => Some(PixelType::Int8),
            "uint16" => Some(PixelType::Uint16),
            "int16" => Some(PixelType::Int16),
            "uint32" => Some(PixelType::Uint32),
            "int32" => Some(PixelType::Int32),
            "float" => Some(PixelType::Float),
            "double" => Some(PixelType::Double),
            _ => None,
        }
    }

    /// Derive the type from TIFF BitsPerSample and SampleFormat.
    pub fn from_tiff(bits_per_sample: u16, sample_format: u16) -> Option<Self> {
        match (sample_format, bits_per_sample) {
            (SAMPLE_FORMAT_UINT, 8) => Some(PixelType::Uint8),
            (SAMPLE_FORMAT_UINT, 16) => Some(PixelType::Uint16),
            (SAMPLE_FORMAT_UINT, 32) => Some(PixelType::Uint32),
            (SAMPLE_FORMAT_INT, 8) => Some(PixelType::Int8),
            (SAMPLE_FORMAT_INT, 16) => Some(PixelType::Int16),
            (SAMPLE_FORMAT_INT, 32) => Some(PixelType::Int32),
            (SAMPLE_FORMAT_IEEEFP, 32) => Some(PixelType::Float),
            (SAMPLE_FORMAT_IEEEFP, 64) => Some(PixelType::Double),
            _ => None,
        }
    }

    /// The OME name of this type.
    pub const fn name(self) -> &'static str {
        match self {
            PixelType::Uint8 => "uint8",
            PixelType::Int8 => "int8",
            PixelType::Uint16 => "uint16",
            PixelType::Int16 => "int16",
            PixelType::Uint32 => "uint32",
            PixelType::Int32 => "int32",
            PixelType::Float => "float",
            PixelType::Double => "double",
        }
    }

    /// Size of one sample in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            PixelType::Uint8 | PixelType::Int8 => 1,
            PixelType::Uint16 | PixelType::Int16 => 2,
            PixelType::Uint32 | PixelType::Int32 | PixelType::Float => 4,
            PixelType::Double => 8,
        }
    }

    /// Integer types can use horizontal differencing.
    pub const fn is_integer(self) -> bool {
        !matches!(self, PixelType::Float | PixelType::Double)
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
