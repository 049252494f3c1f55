//! Ports on native units.
//!
//! A [`Pad`] names one connection point of a native unit. Units declare the
//! pads they can expose through [`PadTemplate`]s: static pads are always
//! present, request pads (named from a `%u` pattern such as `sink_%u`) are
//! created on demand.

use std::fmt;

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Receives data from upstream.
    Sink,
    /// Sends data downstream.
    Src,
}

/// Whether a pad is always present or created on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadPresence {
    /// Pad exists as soon as the unit exists.
    Always,
    /// Pad is created when requested by name.
    Request,
}

/// Template describing pads a unit kind can expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadTemplate {
    /// Name or name pattern (`%u` stands for a decimal index).
    pub name: String,
    /// Direction of pads made from this template.
    pub direction: PadDirection,
    /// Presence of pads made from this template.
    pub presence: PadPresence,
}

impl PadTemplate {
    /// Create a new pad template.
    pub fn new(name: impl Into<String>, direction: PadDirection, presence: PadPresence) -> Self {
        Self {
            name: name.into(),
            direction,
            presence,
        }
    }

    /// Always-present `sink` pad.
    pub fn sink() -> Self {
        Self::new("sink", PadDirection::Sink, PadPresence::Always)
    }

    /// Always-present `src` pad.
    pub fn src() -> Self {
        Self::new("src", PadDirection::Src, PadPresence::Always)
    }

    /// Request sink pads named `sink_%u`.
    pub fn request_sinks() -> Self {
        Self::new("sink_%u", PadDirection::Sink, PadPresence::Request)
    }

    /// Check whether `name` is produced by this template.
    pub fn matches(&self, name: &str) -> bool {
        match self.name.split_once("%u") {
            None => self.name == name,
            Some((prefix, suffix)) => name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .is_some_and(|index| {
                    !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
                }),
        }
    }
}

/// A pad instance on a named unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pad {
    unit: String,
    name: String,
    direction: PadDirection,
}

impl Pad {
    /// Create a pad belonging to `unit`.
    pub fn new(unit: impl Into<String>, name: impl Into<String>, direction: PadDirection) -> Self {
        Self {
            unit: unit.into(),
            name: name.into(),
            direction,
        }
    }

    /// Name of the owning unit.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Pad name within the unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pad direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// Check if this is a sink pad.
    pub fn is_sink(&self) -> bool {
        self.direction == PadDirection::Sink
    }

    /// Check if this is a src pad.
    pub fn is_src(&self) -> bool {
        self.direction == PadDirection::Src
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.name)
    }
}
