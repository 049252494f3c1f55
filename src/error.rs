//! Error types for stream-compose.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pipeline composition and execution.
#[derive(Error, Debug)]
pub enum Error {
    /// The native runtime could not allocate a processing unit.
    #[error("unable to create {kind} unit for stage '{stage}'")]
    StageCreation {
        /// Name of the stage that requested the unit.
        stage: String,
        /// Native unit kind (factory name).
        kind: String,
    },

    /// A configuration value is outside its declared bounds.
    #[error("invalid value for '{field}': {value} ({reason})")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// The rejected value, rendered as text.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A port could not be obtained or a link request was refused.
    #[error("cannot link '{src}' to '{sink}': {reason}")]
    Link {
        /// Upstream endpoint (`unit:pad`).
        src: String,
        /// Downstream endpoint (`unit:pad`).
        sink: String,
        /// What went wrong.
        reason: String,
    },

    /// A structural precondition of the pipeline was violated.
    #[error("pipeline configuration error: {0}")]
    Configuration(String),

    /// A native unit refused a state transition.
    #[error("unit '{unit}' refused state change to {state}")]
    StateChange {
        /// Unit name.
        unit: String,
        /// Requested state.
        state: String,
    },

    /// The running pipeline reported a fatal error on its bus.
    #[error("runtime error from {}: {message} ({cause})", .origin.as_deref().unwrap_or("pipeline"))]
    Runtime {
        /// Unit that posted the error, if known.
        origin: Option<String>,
        /// Human readable message.
        message: String,
        /// Debug / cause description.
        cause: String,
    },

    /// A transform chain rejected its input or failed.
    #[error("transform chain error: {0}")]
    Transform(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(
        field: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::Validation {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn link(
        src: impl Into<String>,
        sink: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Link {
            src: src.into(),
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::StageCreation {
            stage: "conv-nvvideoconvert".into(),
            kind: "nvvideoconvert".into(),
        };
        assert_eq!(
            err.to_string(),
            "unable to create nvvideoconvert unit for stage 'conv-nvvideoconvert'"
        );

        let err = Error::validation("width", 1, "must be >= 2");
        assert_eq!(err.to_string(), "invalid value for 'width': 1 (must be >= 2)");

        let err = Error::Runtime {
            origin: None,
            message: "decode failed".into(),
            cause: "bad stream".into(),
        };
        assert_eq!(
            err.to_string(),
            "runtime error from pipeline: decode failed (bad stream)"
        );
    }
}
