use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// How invalid UTF-8 in a decoded body is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Drop every invalid byte sequence and keep the rest of the text
    #[default]
    Lossy,

    /// Reject the body on the first invalid byte sequence
    Strict,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 content: {0}")]
    Base64(String),

    #[error("invalid UTF-8 after {valid_up_to} bytes")]
    Utf8 { valid_up_to: usize },
}

/// Decodes the base64 `content` field of a content API response
///
/// The API wraps the payload every 60 characters, so ASCII whitespace is stripped first.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::Base64(e.to_string()))
}

/// Turns raw bytes into text according to `policy`
pub fn decode_text(bytes: &[u8], policy: DecodePolicy) -> Result<String, DecodeError> {
    match policy {
        DecodePolicy::Strict => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| DecodeError::Utf8 {
                valid_up_to: e.valid_up_to(),
            }),
        DecodePolicy::Lossy => {
            let mut text = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                text.push_str(chunk.valid());
            }
            Ok(text)
        }
    }
}

/// Decodes a base64 `content` field all the way to text
pub fn decode_content(encoded: &str, policy: DecodePolicy) -> Result<String, DecodeError> {
    let bytes = decode_base64(encoded)?;
    decode_text(&bytes, policy)
}
