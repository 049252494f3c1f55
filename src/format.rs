//! Media format descriptors and their validation.
//!
//! A [`FilterProperties`] value describes the raw video format a caps filter
//! should enforce: where the memory lives, the pixel format, and optional
//! geometry/rate constraints. Values are checked against their bounds when
//! built and render to the exact descriptor string the native runtime
//! expects:
//!
//! ```rust
//! use stream_compose::format::{FilterProperties, PixelFormat};
//!
//! let props = FilterProperties::builder()
//!     .format(PixelFormat::Rgba)
//!     .width(1264)
//!     .height(1024)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     props.to_caps_string(),
//!     "video/x-raw(memory:NVMM),format=RGBA,width=1264,height=1024"
//! );
//!
//! // Rendered descriptors parse back into the same value.
//! let parsed: FilterProperties = props.to_caps_string().parse().unwrap();
//! assert_eq!(parsed, props);
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use winnow::Parser;
use winnow::combinator::{alt, eof, preceded, repeat, separated_pair};
use winnow::error::ContextError;
use winnow::token::take_while;

type WResult<T> = std::result::Result<T, ContextError>;

/// Media type prefix of every rendered descriptor.
pub const RAW_VIDEO: &str = "video/x-raw";

// ============================================================================
// Bounds
// ============================================================================

/// Inclusive integer bound for a descriptor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    /// Field the bound applies to.
    pub field: &'static str,
    /// Smallest accepted value.
    pub min: u32,
    /// Largest accepted value.
    pub max: u32,
}

impl Bound {
    /// Check `value` against the bound.
    pub fn check(&self, value: u32) -> Result<u32> {
        if value < self.min {
            return Err(Error::validation(
                self.field,
                value,
                format!("must be >= {}", self.min),
            ));
        }
        if value > self.max {
            return Err(Error::validation(
                self.field,
                value,
                format!("must be <= {}", self.max),
            ));
        }
        Ok(value)
    }

    /// Whether `value` lies within the bound.
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Frame width bound.
pub const WIDTH: Bound = Bound {
    field: "width",
    min: 2,
    max: 15360,
};

/// Frame height bound.
pub const HEIGHT: Bound = Bound {
    field: "height",
    min: 2,
    max: 15360,
};

/// Channel count bound.
pub const CHANNELS: Bound = Bound {
    field: "channels",
    min: 1,
    max: 1023,
};

/// Framerate bound (frames per second).
pub const FRAMERATE: Bound = Bound {
    field: "framerate",
    min: 1,
    max: 65535,
};

// ============================================================================
// Enumerated fields
// ============================================================================

/// Memory location of the frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MemoryKind {
    /// Device memory managed by the accelerator runtime.
    #[default]
    Nvmm,
    /// Plain system memory YUV.
    Yuv,
    /// Any memory.
    Any,
}

impl MemoryKind {
    /// Descriptor fragment appended to the media type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Nvmm => "(memory:NVMM)",
            MemoryKind::Yuv => "-yuv",
            MemoryKind::Any => "(ANY)",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel formats accepted by the converter's caps filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// RGBA 8-bit per channel, packed.
    #[default]
    Rgba,
    /// ARGB 8-bit per channel, packed.
    Argb,
    /// RGB 8-bit per channel, packed.
    Rgb,
    /// BGR 8-bit per channel, packed.
    Bgr,
}

impl PixelFormat {
    /// Descriptor token.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Argb => "ARGB",
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgr => "BGR",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RGBA" => Ok(PixelFormat::Rgba),
            "ARGB" => Ok(PixelFormat::Argb),
            "RGB" => Ok(PixelFormat::Rgb),
            "BGR" => Ok(PixelFormat::Bgr),
            other => Err(Error::validation(
                "format",
                other,
                "expected one of RGBA, ARGB, RGB, BGR",
            )),
        }
    }
}

// ============================================================================
// FilterProperties
// ============================================================================

/// Validated raw video format descriptor.
///
/// Construct with [`FilterProperties::new`] for the defaults or
/// [`FilterProperties::builder`] to set fields; every numeric field is
/// checked against its [`Bound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProperties {
    memory: MemoryKind,
    format: Option<PixelFormat>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
    framerate: Option<u32>,
}

impl FilterProperties {
    /// Device memory, RGBA, no geometry constraints.
    pub fn new() -> Self {
        Self {
            memory: MemoryKind::default(),
            format: Some(PixelFormat::default()),
            width: None,
            height: None,
            channels: None,
            framerate: None,
        }
    }

    /// Start building a descriptor from the defaults.
    pub fn builder() -> FilterPropertiesBuilder {
        FilterPropertiesBuilder {
            props: Self::new(),
        }
    }

    /// Memory location.
    pub fn memory(&self) -> MemoryKind {
        self.memory
    }

    /// Pixel format, if constrained.
    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    /// Width in pixels, if constrained.
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    /// Height in pixels, if constrained.
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Channel count, if constrained.
    pub fn channels(&self) -> Option<u32> {
        self.channels
    }

    /// Framerate, if constrained.
    pub fn framerate(&self) -> Option<u32> {
        self.framerate
    }

    /// Render the canonical descriptor.
    ///
    /// Fields are emitted in a fixed order (memory, format, width, height,
    /// channels, framerate); unset fields are omitted.
    pub fn to_caps_string(&self) -> String {
        let mut caps = format!("{RAW_VIDEO}{}", self.memory);
        if let Some(format) = self.format {
            caps.push_str(&format!(",format={format}"));
        }
        let numeric = [
            ("width", self.width),
            ("height", self.height),
            ("channels", self.channels),
            ("framerate", self.framerate),
        ];
        for (key, value) in numeric {
            if let Some(v) = value {
                caps.push_str(&format!(",{key}={v}"));
            }
        }
        caps
    }
}

impl Default for FilterProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FilterProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_caps_string())
    }
}

/// Builder for [`FilterProperties`].
#[derive(Debug, Clone)]
pub struct FilterPropertiesBuilder {
    props: FilterProperties,
}

impl FilterPropertiesBuilder {
    /// Set the memory location.
    pub fn memory(mut self, memory: MemoryKind) -> Self {
        self.props.memory = memory;
        self
    }

    /// Set the pixel format.
    pub fn format(mut self, format: PixelFormat) -> Self {
        self.props.format = Some(format);
        self
    }

    /// Leave the pixel format unconstrained.
    pub fn any_format(mut self) -> Self {
        self.props.format = None;
        self
    }

    /// Set the width.
    pub fn width(mut self, width: u32) -> Self {
        self.props.width = Some(width);
        self
    }

    /// Set the height.
    pub fn height(mut self, height: u32) -> Self {
        self.props.height = Some(height);
        self
    }

    /// Set the channel count.
    pub fn channels(mut self, channels: u32) -> Self {
        self.props.channels = Some(channels);
        self
    }

    /// Set the framerate.
    pub fn framerate(mut self, framerate: u32) -> Self {
        self.props.framerate = Some(framerate);
        self
    }

    /// Validate all fields and produce the descriptor.
    ///
    /// Fails with [`Error::Validation`] naming the first out-of-range field.
    pub fn build(self) -> Result<FilterProperties> {
        let p = &self.props;
        for (bound, value) in [
            (WIDTH, p.width),
            (HEIGHT, p.height),
            (CHANNELS, p.channels),
            (FRAMERATE, p.framerate),
        ] {
            if let Some(v) = value {
                bound.check(v)?;
            }
        }
        Ok(self.props)
    }
}

// ============================================================================
// Parsing
// ============================================================================

impl FromStr for FilterProperties {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (memory, fields) = descriptor
            .parse(s.trim())
            .map_err(|e| Error::validation("descriptor", s, format!("parse error: {e}")))?;

        let mut builder = FilterProperties::builder().memory(memory).any_format();
        let mut seen: Vec<&str> = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            if seen.contains(&key) {
                return Err(Error::validation("descriptor", key, "duplicate field"));
            }
            seen.push(key);
            builder = match key {
                "format" => builder.format(value.parse()?),
                "width" => builder.width(parse_u32(WIDTH.field, value)?),
                "height" => builder.height(parse_u32(HEIGHT.field, value)?),
                "channels" => builder.channels(parse_u32(CHANNELS.field, value)?),
                "framerate" => builder.framerate(parse_u32(FRAMERATE.field, value)?),
                other => {
                    return Err(Error::validation("descriptor", other, "unknown field"));
                }
            };
        }
        builder.build()
    }
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::validation(field, value, "not an unsigned integer"))
}

/// `video/x-raw<memory>(,key=value)*`
fn descriptor<'a>(input: &mut &'a str) -> WResult<(MemoryKind, Vec<(&'a str, &'a str)>)> {
    (
        preceded(RAW_VIDEO, memory_kind),
        repeat(0.., preceded(',', field)),
        eof,
    )
        .map(|(memory, fields, _)| (memory, fields))
        .parse_next(input)
}

fn memory_kind(input: &mut &str) -> WResult<MemoryKind> {
    alt((
        "(memory:NVMM)".value(MemoryKind::Nvmm),
        "-yuv".value(MemoryKind::Yuv),
        "(ANY)".value(MemoryKind::Any),
    ))
    .parse_next(input)
}

fn field<'a>(input: &mut &'a str) -> WResult<(&'a str, &'a str)> {
    separated_pair(
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        '=',
        take_while(1.., |c: char| c != ','),
    )
    .parse_next(input)
}
