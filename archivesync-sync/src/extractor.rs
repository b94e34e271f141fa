//! Legacy inline-encryption plaintext extraction.

/// Result of inspecting a message body for a legacy inline envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The body is not wrapped in an envelope and is used verbatim.
    Unwrapped,
    /// The envelope carried this plain text.
    PlainText(String),
    /// The envelope is a protocol control message with no user text.
    NotPlainText,
    /// The envelope could not be parsed.
    DecodeError(String),
}

/// Decodes legacy inline envelopes found in archived message bodies.
pub trait PlaintextExtractor: Send + Sync {
    fn decode(&self, body: &str) -> Decoded;
}

/// Treats every body as plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExtractor;

impl PlaintextExtractor for PassthroughExtractor {
    fn decode(&self, _body: &str) -> Decoded {
        Decoded::Unwrapped
    }
}
