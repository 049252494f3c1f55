//! URI-addressed media source.

use crate::error::Result;
use crate::runtime::{NativeRuntime, UnitRef, make_unit};
use crate::stage::{Stage, StageRole, ensure_uninitialized, generate_name};

/// URI schemes whose sources are live (no preroll, no seeking).
const LIVE_SCHEMES: &[&str] = &[
    "rtsp://", "rtsps://", "rtmp://", "udp://", "srt://", "http://", "https://",
];

/// Decodes media from a URI.
///
/// Usually wrapped in an [`AggregatedSources`](super::AggregatedSources), but
/// can also start a plain linear chain.
#[derive(Debug)]
pub struct UriSource {
    name: String,
    uri: String,
    units: Vec<UnitRef>,
}

impl UriSource {
    /// Native unit kind.
    pub const KIND: &'static str = "uridecodebin";

    /// Create a source for `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self::named(generate_name(), uri)
    }

    /// Create a source with an explicit base name.
    pub fn named(name: impl AsRef<str>, uri: impl Into<String>) -> Self {
        Self {
            name: format!("{}-{}", name.as_ref(), Self::KIND),
            uri: uri.into(),
            units: Vec::new(),
        }
    }

    /// The source URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether the URI points at a live stream.
    pub fn is_live(&self) -> bool {
        let uri = self.uri.to_ascii_lowercase();
        LIVE_SCHEMES.iter().any(|scheme| uri.starts_with(scheme))
    }
}

impl Stage for UriSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        StageRole::Source
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        let unit = make_unit(runtime, &self.name, Self::KIND, &self.name)?;
        unit.set_property("uri", self.uri.as_str().into())?;
        self.units.push(unit);
        Ok(())
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }
}
