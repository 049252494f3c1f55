//! Pipeline bus messages.
//!
//! The native runtime posts messages on a bus while the pipeline runs; the
//! [`Runloop`](super::Runloop) is the single consumer.

use std::fmt;
use tokio::sync::mpsc;

/// A notification from the running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// End of stream reached.
    Eos {
        /// Unit that posted the message (if known).
        origin: Option<String>,
    },

    /// Informational message.
    Info {
        /// Unit that posted the message (if known).
        origin: Option<String>,
        /// The message.
        message: String,
        /// Additional debug detail.
        debug: Option<String>,
    },

    /// Non-fatal issue.
    Warning {
        /// Unit that posted the message (if known).
        origin: Option<String>,
        /// The message.
        message: String,
        /// Additional debug detail.
        debug: Option<String>,
    },

    /// Fatal runtime error.
    Error {
        /// Unit that posted the message (if known).
        origin: Option<String>,
        /// The message.
        message: String,
        /// Cause description.
        cause: String,
    },
}

impl BusMessage {
    /// End-of-stream message.
    pub fn eos() -> Self {
        BusMessage::Eos { origin: None }
    }

    /// Info message.
    pub fn info(message: impl Into<String>) -> Self {
        BusMessage::Info {
            origin: None,
            message: message.into(),
            debug: None,
        }
    }

    /// Warning message.
    pub fn warning(message: impl Into<String>) -> Self {
        BusMessage::Warning {
            origin: None,
            message: message.into(),
            debug: None,
        }
    }

    /// Error message.
    pub fn error(message: impl Into<String>, cause: impl Into<String>) -> Self {
        BusMessage::Error {
            origin: None,
            message: message.into(),
            cause: cause.into(),
        }
    }

    /// Attach the originating unit name.
    pub fn with_origin(mut self, unit: impl Into<String>) -> Self {
        let unit = Some(unit.into());
        match &mut self {
            BusMessage::Eos { origin }
            | BusMessage::Info { origin, .. }
            | BusMessage::Warning { origin, .. }
            | BusMessage::Error { origin, .. } => *origin = unit,
        }
        self
    }

    /// Attach debug detail (ignored for EOS and errors, which carry a cause).
    pub fn with_debug(mut self, detail: impl Into<String>) -> Self {
        if let BusMessage::Info { debug, .. } | BusMessage::Warning { debug, .. } = &mut self {
            *debug = Some(detail.into());
        }
        self
    }

    /// Unit that posted the message.
    pub fn origin(&self) -> Option<&str> {
        match self {
            BusMessage::Eos { origin }
            | BusMessage::Info { origin, .. }
            | BusMessage::Warning { origin, .. }
            | BusMessage::Error { origin, .. } => origin.as_deref(),
        }
    }

    /// Short message kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            BusMessage::Eos { .. } => "eos",
            BusMessage::Info { .. } => "info",
            BusMessage::Warning { .. } => "warning",
            BusMessage::Error { .. } => "error",
        }
    }

    /// Whether the default handler ends the loop on this message.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BusMessage::Eos { .. } | BusMessage::Error { .. })
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = self.origin() {
            write!(f, "[{origin}] ")?;
        }
        match self {
            BusMessage::Eos { .. } => write!(f, "EOS"),
            BusMessage::Info { message, debug, .. }
            | BusMessage::Warning { message, debug, .. } => {
                write!(f, "{message}")?;
                if let Some(d) = debug {
                    write!(f, ": {d}")?;
                }
                Ok(())
            }
            BusMessage::Error { message, cause, .. } => write!(f, "{message}: {cause}"),
        }
    }
}

/// Create a connected bus sender/receiver pair.
pub fn bus() -> (BusSender, BusReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (BusSender { sender }, BusReceiver { receiver })
}

/// Posting side of a pipeline bus.
///
/// Held by the native runtime (and optionally by the application).
#[derive(Debug, Clone)]
pub struct BusSender {
    sender: mpsc::UnboundedSender<BusMessage>,
}

impl BusSender {
    /// Post a message. Returns `false` if the bus has no consumer anymore.
    pub fn post(&self, message: BusMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Post an end-of-stream message.
    pub fn post_eos(&self) -> bool {
        self.post(BusMessage::eos())
    }

    /// Post an error message.
    pub fn post_error(&self, message: impl Into<String>, cause: impl Into<String>) -> bool {
        self.post(BusMessage::error(message, cause))
    }

    /// Whether the consumer side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consuming side of a pipeline bus.
#[derive(Debug)]
pub struct BusReceiver {
    receiver: mpsc::UnboundedReceiver<BusMessage>,
}

impl BusReceiver {
    /// Receive the next message.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Receive a message without waiting.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_recv() {
        let (sender, mut receiver) = bus();
        assert!(sender.post_eos());

        let message = receiver.recv().await.unwrap();
        assert_eq!(message, BusMessage::eos());
        assert!(message.is_terminal());
    }

    #[tokio::test]
    async fn test_closed_after_senders_dropped() {
        let (sender, mut receiver) = bus();
        sender.post(BusMessage::info("hello"));
        drop(sender);

        assert!(matches!(receiver.recv().await, Some(BusMessage::Info { .. })));
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn test_post_after_receiver_dropped() {
        let (sender, receiver) = bus();
        drop(receiver);
        assert!(sender.is_closed());
        assert!(!sender.post_error("decode", "broken"));
    }

    #[test]
    fn test_display() {
        let message = BusMessage::error("stream error", "not negotiated").with_origin("mux");
        assert_eq!(message.to_string(), "[mux] stream error: not negotiated");

        let message = BusMessage::warning("late buffer").with_debug("qos");
        assert_eq!(message.to_string(), "late buffer: qos");
        assert!(!message.is_terminal());

        assert_eq!(BusMessage::eos().to_string(), "EOS");
    }
}
