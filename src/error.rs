use thiserror::Error;

/// I/O errors that can occur when reading the source file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// File exists but could not be opened or read
    #[error("Read failed for {path}: {message}")]
    Read { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Compression scheme this reader cannot decode
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while extracting OME-XML metadata
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The document is not well-formed XML
    #[error("Malformed OME-XML: {0}")]
    Xml(String),

    /// A required element is absent
    #[error("OME-XML has no <{0}> element")]
    MissingElement(&'static str),

    /// A required attribute is absent
    #[error("<{element}> is missing the {attribute} attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// An attribute value could not be interpreted
    #[error("Invalid value {value:?} for attribute {attribute}")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },

    /// Pixel type this reader cannot represent
    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(String),
}

/// Errors returned by the OME-TIFF conversion stage
#[derive(Debug, Clone, Error)]
pub enum ReaderError {
    /// An empty list of paths was supplied
    #[error("no path given")]
    EmptyPathList,

    /// The source file could not be opened or read
    #[error("open failed: {0}")]
    Io(#[from] IoError),

    /// The TIFF structure could not be parsed
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// The OME-XML metadata could not be parsed
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// The file is a TIFF but carries no OME-XML
    #[error("only OME TIFF files are accepted.")]
    NotOmeFormat,

    /// The image has a single resolution level
    #[error("only pyramidal images are accepted.")]
    NotPyramidal { levels: usize },

    /// One of c, y, x is absent (or duplicated) after dropping singleton axes
    #[error("axis '{axis}' must appear exactly once in non-singleton axes {axes:?}")]
    MetadataAxisMissing { axis: char, axes: String },

    /// The metadata references a plane that is not stored in this file
    #[error("plane (z={z}, c={c}, t={t}) is not stored in this file")]
    MissingPlane { z: usize, c: usize, t: usize },

    /// Pyramid levels disagree with each other or with the metadata
    #[error("inconsistent pyramid: {0}")]
    InconsistentPyramid(String),

    /// A chunk could not be decompressed
    #[error("failed to decode chunk {chunk} at level {level}: {message}")]
    Decode {
        level: usize,
        chunk: u32,
        message: String,
    },

    /// Array was read with an element type different from its pixel type
    #[error("pixel type mismatch: array holds {actual}, requested {requested}")]
    PixelTypeMismatch {
        actual: &'static str,
        requested: &'static str,
    },

    /// Axis permutation or region request does not fit the array
    #[error("invalid array request: {0}")]
    InvalidRequest(String),
}
