//! OME-XML metadata extraction.
//!
//! Only the first `Image` of the document is read: its name, the `Pixels`
//! geometry and physical size, the channel list and the `TiffData` blocks
//! that map planes to IFDs. Everything else in the document is skipped.
//!
//! Keys this parser does not map are reported at TRACE level on
//! [`UNMATCHED_TARGET`] and otherwise ignored. They never fail a parse.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::trace;

use crate::error::MetadataError;
use crate::format::pixel::PixelType;

/// Tracing target for OME-XML keys without a mapping.
pub const UNMATCHED_TARGET: &str = "ometiff_reader::metadata::unmatched";

/// Unit assumed when a PhysicalSize unit attribute is absent.
pub const DEFAULT_PHYSICAL_UNIT: &str = "µm";

/// Dimension letters in OME order.
const OME_DIMENSIONS: [char; 5] = ['X', 'Y', 'Z', 'C', 'T'];

/// Pixels attributes that are understood but not needed.
const PIXELS_IGNORED: &[&str] = &[
    "ID",
    "BigEndian",
    "Interleaved",
    "SignificantBits",
    "PhysicalSizeZ",
    "PhysicalSizeZUnit",
    "TimeIncrement",
    "TimeIncrementUnit",
];

/// Pixels children that are understood but not needed.
const PIXELS_CHILDREN_IGNORED: &[&str] = &["Plane", "BinData", "MetadataOnly"];

// =============================================================================
// Metadata Types
// =============================================================================

/// One `Channel` element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelInfo {
    pub name: Option<String>,
    pub samples_per_pixel: Option<usize>,
}

/// One `TiffData` element: a run of planes stored in consecutive IFDs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TiffDataBlock {
    /// First IFD of the run, `None` when the attribute is absent
    pub ifd: Option<usize>,
    pub first_z: usize,
    pub first_c: usize,
    pub first_t: usize,
    /// Number of planes in the run, `None` when the attribute is absent
    pub plane_count: Option<usize>,
}

/// Metadata of the first image in an OME-XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeMetadata {
    pub image_name: Option<String>,

    /// `DimensionOrder` as written, fastest-varying axis first (`"XYZCT"`)
    pub dimension_order: String,

    /// Axis order of the stored array, slowest first (`"TCZYX"`)
    pub dim_order: String,

    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,

    pub pixel_type: PixelType,

    pub physical_size_x: Option<f64>,
    pub physical_size_x_unit: String,
    pub physical_size_y: Option<f64>,
    pub physical_size_y_unit: String,

    pub channels: Vec<ChannelInfo>,
    pub tiff_data: Vec<TiffDataBlock>,
}

impl OmeMetadata {
    /// Parse the first image of an OME-XML document.
    pub fn parse(xml: &str) -> Result<Self, MetadataError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut builder = Builder::default();
        let mut stack: Vec<String> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = local_name(&e);
                    builder.open(&name, stack.last().map(String::as_str), &e)?;
                    stack.push(name);
                }
                Ok(Event::Empty(e)) => {
                    let name = local_name(&e);
                    builder.open(&name, stack.last().map(String::as_str), &e)?;
                    builder.close(&name);
                }
                Ok(Event::End(_)) => {
                    if let Some(name) = stack.pop() {
                        builder.close(&name);
                    }
                    if builder.done {
                        break;
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(MetadataError::Xml(format!(
                        "at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
            }
            buf.clear();
        }

        builder.finish()
    }

    /// Size of a dimension by its upper-case letter.
    pub fn size_of(&self, axis: char) -> Option<usize> {
        match axis {
            'X' => Some(self.size_x),
            'Y' => Some(self.size_y),
            'Z' => Some(self.size_z),
            'C' => Some(self.size_c),
            'T' => Some(self.size_t),
            _ => None,
        }
    }

    /// Samples stored per pixel of one plane (3 for interleaved RGB).
    ///
    /// Taken from the first channel; 1 when unspecified.
    pub fn samples_per_pixel(&self) -> usize {
        self.channels
            .first()
            .and_then(|c| c.samples_per_pixel)
            .unwrap_or(1)
            .max(1)
    }

    /// Number of channel planes per (Z, T) position.
    pub fn effective_size_c(&self) -> usize {
        (self.size_c / self.samples_per_pixel()).max(1)
    }

    /// Number of 2D planes the image is stored as.
    pub fn plane_count(&self) -> usize {
        self.size_z
            .saturating_mul(self.effective_size_c())
            .saturating_mul(self.size_t)
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

// =============================================================================
// Attribute Handling
// =============================================================================

/// Attributes of one element; taken entries are removed so the rest can be
/// reported as unmatched.
struct Attributes {
    element: &'static str,
    entries: Vec<(String, String)>,
}

impl Attributes {
    fn read(element: &'static str, e: &BytesStart) -> Result<Self, MetadataError> {
        let entries = e
            .attributes()
            .map(|attr| {
                let attr = attr.map_err(|err| MetadataError::Xml(err.to_string()))?;
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map_err(|err| MetadataError::Xml(err.to_string()))?
                    .into_owned();
                Ok((key, value))
            })
            .collect::<Result<Vec<_>, MetadataError>>()?;
        Ok(Attributes { element, entries })
    }

    fn take(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.swap_remove(index).1)
    }

    fn require(&mut self, name: &'static str) -> Result<String, MetadataError> {
        self.take(name).ok_or(MetadataError::MissingAttribute {
            element: self.element,
            attribute: name,
        })
    }

    fn take_usize(&mut self, name: &'static str) -> Result<Option<usize>, MetadataError> {
        self.take(name)
            .map(|value| parse_number(name, &value))
            .transpose()
    }

    fn require_size(&mut self, name: &'static str) -> Result<usize, MetadataError> {
        let value = self.require(name)?;
        let size: usize = parse_number(name, &value)?;
        if size == 0 {
            return Err(MetadataError::InvalidAttribute {
                attribute: name,
                value,
            });
        }
        Ok(size)
    }

    fn take_f64(&mut self, name: &'static str) -> Result<Option<f64>, MetadataError> {
        self.take(name)
            .map(|value| parse_number(name, &value))
            .transpose()
    }

    fn discard(&mut self, names: &[&str]) {
        self.entries
            .retain(|(key, _)| !names.contains(&key.as_str()));
    }

    /// Report whatever was not taken.
    fn report_unmatched(self) {
        for (key, value) in self.entries {
            trace!(
                target: UNMATCHED_TARGET,
                element = self.element,
                key = %key,
                value = %value,
                "unmatched OME-XML attribute"
            );
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    attribute: &'static str,
    value: &str,
) -> Result<T, MetadataError> {
    value
        .trim()
        .parse()
        .map_err(|_| MetadataError::InvalidAttribute {
            attribute,
            value: value.to_string(),
        })
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Scope {
    #[default]
    Document,
    Image,
    Pixels,
}

/// Pixels attributes collected while parsing.
#[derive(Debug)]
struct PixelsAttributes {
    dimension_order: String,
    pixel_type: PixelType,
    sizes: [usize; 5],
    physical_size_x: Option<f64>,
    physical_size_x_unit: String,
    physical_size_y: Option<f64>,
    physical_size_y_unit: String,
}

#[derive(Default)]
struct Builder {
    scope: Scope,
    image_seen: bool,
    done: bool,
    image_name: Option<String>,
    pixels: Option<PixelsAttributes>,
    channels: Vec<ChannelInfo>,
    tiff_data: Vec<TiffDataBlock>,
}

impl Builder {
    fn open(&mut self, name: &str, parent: Option<&str>, e: &BytesStart) -> Result<(), MetadataError> {
        if self.done {
            return Ok(());
        }
        match (self.scope, name, parent) {
            (Scope::Document, "Image", Some("OME")) if !self.image_seen => {
                self.image_seen = true;
                self.scope = Scope::Image;
                let mut attrs = Attributes::read("Image", e)?;
                self.image_name = attrs.take("Name");
                attrs.discard(&["ID"]);
                attrs.report_unmatched();
            }
            (Scope::Image, "Pixels", Some("Image")) => {
                self.scope = Scope::Pixels;
                self.pixels = Some(parse_pixels(Attributes::read("Pixels", e)?)?);
            }
            (Scope::Pixels, "Channel", Some("Pixels")) => {
                let mut attrs = Attributes::read("Channel", e)?;
                let channel = ChannelInfo {
                    name: attrs.take("Name"),
                    samples_per_pixel: attrs.take_usize("SamplesPerPixel")?,
                };
                attrs.discard(&["ID", "Color", "Fluor", "EmissionWavelength", "ExcitationWavelength"]);
                attrs.report_unmatched();
                self.channels.push(channel);
            }
            (Scope::Pixels, "TiffData", Some("Pixels")) => {
                let mut attrs = Attributes::read("TiffData", e)?;
                let block = TiffDataBlock {
                    ifd: attrs.take_usize("IFD")?,
                    first_z: attrs.take_usize("FirstZ")?.unwrap_or(0),
                    first_c: attrs.take_usize("FirstC")?.unwrap_or(0),
                    first_t: attrs.take_usize("FirstT")?.unwrap_or(0),
                    plane_count: attrs.take_usize("PlaneCount")?,
                };
                attrs.report_unmatched();
                self.tiff_data.push(block);
            }
            (Scope::Pixels, other, Some("Pixels")) if !PIXELS_CHILDREN_IGNORED.contains(&other) => {
                trace!(
                    target: UNMATCHED_TARGET,
                    element = other,
                    "unmatched OME-XML element"
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &str) {
        match (self.scope, name) {
            (Scope::Pixels, "Pixels") => self.scope = Scope::Image,
            (Scope::Image, "Image") => {
                self.scope = Scope::Document;
                self.done = true;
            }
            _ => {}
        }
    }

    fn finish(self) -> Result<OmeMetadata, MetadataError> {
        if !self.image_seen {
            return Err(MetadataError::MissingElement("Image"));
        }
        let pixels = self.pixels.ok_or(MetadataError::MissingElement("Pixels"))?;
        let [size_x, size_y, size_z, size_c, size_t] = pixels.sizes;

        Ok(OmeMetadata {
            image_name: self.image_name,
            dim_order: pixels.dimension_order.chars().rev().collect(),
            dimension_order: pixels.dimension_order,
            size_x,
            size_y,
            size_z,
            size_c,
            size_t,
            pixel_type: pixels.pixel_type,
            physical_size_x: pixels.physical_size_x,
            physical_size_x_unit: pixels.physical_size_x_unit,
            physical_size_y: pixels.physical_size_y,
            physical_size_y_unit: pixels.physical_size_y_unit,
            channels: self.channels,
            tiff_data: self.tiff_data,
        })
    }
}

fn parse_pixels(mut attrs: Attributes) -> Result<PixelsAttributes, MetadataError> {
    let dimension_order = attrs.require("DimensionOrder")?;
    let is_permutation = dimension_order.len() == OME_DIMENSIONS.len()
        && OME_DIMENSIONS.iter().all(|&d| dimension_order.contains(d));
    if !is_permutation || !dimension_order.starts_with("XY") {
        return Err(MetadataError::InvalidAttribute {
            attribute: "DimensionOrder",
            value: dimension_order,
        });
    }

    let type_name = attrs.require("Type")?;
    let pixel_type =
        PixelType::from_ome(&type_name).ok_or(MetadataError::UnsupportedPixelType(type_name))?;

    let sizes = [
        attrs.require_size("SizeX")?,
        attrs.require_size("SizeY")?,
        attrs.require_size("SizeZ")?,
        attrs.require_size("SizeC")?,
        attrs.require_size("SizeT")?,
    ];

    let pixels = PixelsAttributes {
        dimension_order,
        pixel_type,
        sizes,
        physical_size_x: attrs.take_f64("PhysicalSizeX")?,
        physical_size_x_unit: attrs
            .take("PhysicalSizeXUnit")
            .unwrap_or_else(|| DEFAULT_PHYSICAL_UNIT.to_string()),
        physical_size_y: attrs.take_f64("PhysicalSizeY")?,
        physical_size_y_unit: attrs
            .take("PhysicalSizeYUnit")
            .unwrap_or_else(|| DEFAULT_PHYSICAL_UNIT.to_string()),
    };

    attrs.discard(PIXELS_IGNORED);
    attrs.report_unmatched();
    Ok(pixels)
}

// =============================================================================
// Tests
// =============================================================================
