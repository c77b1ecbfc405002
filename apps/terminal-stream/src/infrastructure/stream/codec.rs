//! Frame Codec
//!
//! Encodes and decodes the text frames of the framed (STOMP 1.2 style)
//! protocol variant.
//!
//! # Frame Layout
//!
//! ```text
//! COMMAND\n
//! key:value\n
//! key:value\n
//! \n
//! body\0
//! ```
//!
//! A payload made only of line endings is a heart-beat. A frame carrying a
//! `version` header is the server's connect acknowledgement and never reaches
//! a topic handler.

use serde_json::Value;

/// Protocol version advertised in the connect frame.
pub const PROTOCOL_VERSION: &str = "1.2";

const NUL: char = '\0';

// =============================================================================
// Frame Types
// =============================================================================

/// A parsed frame, before any JSON decoding of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command line (`MESSAGE`, `CONNECTED`, `ERROR`, ...).
    pub command: String,
    /// Headers in wire order. Repeated keys keep every occurrence.
    pub headers: Vec<(String, String)>,
    /// Body with the terminator stripped, `None` when empty.
    pub body: Option<String>,
}

impl Frame {
    /// First value for `key`, per the protocol's first-occurrence rule.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An application message addressed to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub destination: String,
    /// All frame headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, `None` for an empty-body message.
    pub body: Option<Value>,
}

/// Result of decoding one inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Keep-alive with no content.
    Heartbeat,
    /// Connect acknowledgement.
    ConnectAck {
        /// Negotiated protocol version.
        version: String,
    },
    /// Topic-addressed data.
    Message(InboundMessage),
}

/// Per-payload decode failures. None of these end the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Body was present but not valid JSON.
    #[error("invalid JSON body on {destination}: {source}")]
    InvalidJson {
        /// Topic of the offending frame.
        destination: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Data frame without a `destination` header.
    #[error("{command} frame has no destination header")]
    MissingDestination {
        /// Command of the offending frame.
        command: String,
    },

    /// Server reported an error.
    #[error("server error: {message}")]
    ServerError {
        /// `message` header, or the body when the header is absent.
        message: String,
    },
}

// =============================================================================
// Codec
// =============================================================================

/// Stateless codec for the framed protocol variant.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The connect frame. No credentials are sent.
    #[must_use]
    pub fn encode_connect(&self) -> String {
        format!("CONNECT\naccept-version:{PROTOCOL_VERSION}\n\n{NUL}")
    }

    /// Subscribe frame for `topic` with auto acknowledgement.
    #[must_use]
    pub fn encode_subscribe(&self, topic: &str, subscription_id: &str) -> String {
        format!("SUBSCRIBE\ndestination:{topic}\nid:{subscription_id}\nack:auto\n\n{NUL}")
    }

    /// Split a raw payload into command, headers and body.
    #[must_use]
    pub fn parse_frame(&self, raw: &str) -> Frame {
        let raw = raw.trim_start_matches(['\r', '\n']);

        let (head, body) = match (raw.find("\r\n\r\n"), raw.find("\n\n")) {
            (Some(crlf), Some(lf)) if crlf < lf => (&raw[..crlf], &raw[crlf + 4..]),
            (_, Some(lf)) => (&raw[..lf], &raw[lf + 2..]),
            (Some(crlf), None) => (&raw[..crlf], &raw[crlf + 4..]),
            (None, None) => (raw.trim_end_matches([NUL, '\r', '\n']), ""),
        };

        let mut lines = head.lines();
        let command = lines.next().unwrap_or_default().trim().to_string();
        let headers = lines
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
            })
            .collect();

        let body = body.trim_end_matches([NUL, '\r', '\n']);
        Frame {
            command,
            headers,
            body: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    /// Decode one inbound payload.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for an `ERROR` frame, a data frame without a
    /// destination, or a body that is not valid JSON.
    pub fn decode(&self, raw: &str) -> Result<Decoded, FrameError> {
        if raw.chars().all(|c| matches!(c, '\r' | '\n' | NUL)) {
            return Ok(Decoded::Heartbeat);
        }

        let frame = self.parse_frame(raw);

        if frame.command == "ERROR" {
            let message = frame
                .header("message")
                .map(str::to_string)
                .or_else(|| frame.body.clone())
                .unwrap_or_default();
            return Err(FrameError::ServerError { message });
        }

        if let Some(version) = frame.header("version") {
            return Ok(Decoded::ConnectAck {
                version: version.to_string(),
            });
        }

        let Some(destination) = frame.header("destination").map(str::to_string) else {
            return Err(FrameError::MissingDestination {
                command: frame.command,
            });
        };

        let body = match frame.body.as_deref() {
            Some(text) => Some(serde_json::from_str(text).map_err(|source| {
                FrameError::InvalidJson {
                    destination: destination.clone(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(Decoded::Message(InboundMessage {
            destination,
            headers: frame.headers,
            body,
        }))
    }
}
