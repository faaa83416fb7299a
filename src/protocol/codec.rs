//! Wire codec for `command: content` frames.
//!
//! # Format
//!
//! ```text
//! <command> ": " <content>
//! ```
//!
//! The decoder only looks for the separator at the start of the frame, so a
//! command can never exceed [`MAX_COMMAND_LEN`] bytes no matter how long the
//! frame is.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::message::MAX_COMMAND_LEN;

// ============================================================================
// Constants
// ============================================================================

/// Separator between command and content.
pub const SEPARATOR: &[u8; 2] = b": ";

/// Bytes scanned for the separator. The separator must start within the
/// first `MAX_COMMAND_LEN + 1` bytes.
const DECODE_WINDOW: usize = MAX_COMMAND_LEN + SEPARATOR.len();

// ============================================================================
// RawFrame
// ============================================================================

/// A decoded frame borrowing from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    /// Command bytes (1 to 255 bytes, never empty).
    pub command: &'a [u8],
    /// Content bytes, absent if nothing follows the separator.
    pub content: Option<&'a [u8]>,
}

impl RawFrame<'_> {
    /// Returns the command as UTF-8, if valid.
    #[inline]
    #[must_use]
    pub fn command_str(&self) -> Option<&str> {
        std::str::from_utf8(self.command).ok()
    }

    /// Returns the content bytes, or an empty slice when absent.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.content.unwrap_or_default()
    }
}

// ============================================================================
// Encode / Decode
// ============================================================================

/// Encodes a command and optional content into a frame.
#[must_use]
pub fn encode(command: &[u8], content: Option<&[u8]>) -> Vec<u8> {
    let content = content.unwrap_or_default();
    let mut frame = Vec::with_capacity(command.len() + SEPARATOR.len() + content.len());
    frame.extend_from_slice(command);
    frame.extend_from_slice(SEPARATOR);
    frame.extend_from_slice(content);
    frame
}

/// Decodes a frame into command and content.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if no separator starts within the first 256
/// bytes, or if the command is empty.
pub fn decode(frame: &[u8]) -> Result<RawFrame<'_>> {
    let window = &frame[..frame.len().min(DECODE_WINDOW)];

    let index = window
        .windows(SEPARATOR.len())
        .position(|w| w == SEPARATOR)
        .ok_or_else(|| Error::protocol("no \": \" separator within the first 256 bytes"))?;

    if index == 0 {
        return Err(Error::protocol("empty command"));
    }

    let rest = &frame[index + SEPARATOR.len()..];
    Ok(RawFrame {
        command: &frame[..index],
        content: (!rest.is_empty()).then_some(rest),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_encode_with_content() {
        assert_eq!(encode(b"update", Some(&b"v2"[..])), b"update: v2");
    }

    #[test]
    fn test_encode_without_content() {
        assert_eq!(encode(b"ping", None), b"ping: ");
    }

    #[test]
    fn test_decode_basic() {
        let frame = decode(b"listen: news").expect("decodes");
        assert_eq!(frame.command, b"listen");
        assert_eq!(frame.content, Some(&b"news"[..]));
    }

    #[test]
    fn test_decode_empty_content() {
        let frame = decode(b"ping: ").expect("decodes");
        assert_eq!(frame.command, b"ping");
        assert_eq!(frame.content, None);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_decode_content_may_contain_separator() {
        let frame = decode(b"say: a: b").expect("decodes");
        assert_eq!(frame.command, b"say");
        assert_eq!(frame.content, Some(&b"a: b"[..]));
    }

    #[test]
    fn test_decode_no_separator() {
        let err = decode(b"hello world").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_colon_without_space() {
        assert!(decode(b"hello:world").is_err());
    }

    #[test]
    fn test_decode_empty_command() {
        let err = decode(b": content").unwrap_err();
        assert_eq!(err.to_string(), "malformed frame: empty command");
    }

    #[test]
    fn test_decode_empty_frame() {
        assert!(decode(b"").is_err());
    }

    #[test]
    fn test_decode_max_command() {
        let mut raw = vec![b'a'; MAX_COMMAND_LEN];
        raw.extend_from_slice(b": x");
        let frame = decode(&raw).expect("255-byte command decodes");
        assert_eq!(frame.command.len(), MAX_COMMAND_LEN);
        assert_eq!(frame.content, Some(&b"x"[..]));
    }

    #[test]
    fn test_decode_command_too_long() {
        let mut raw = vec![b'a'; MAX_COMMAND_LEN + 1];
        raw.extend_from_slice(b": x");
        assert!(decode(&raw).is_err());
    }

    #[test]
    fn test_decode_separator_beyond_window() {
        let mut raw = vec![b'a'; 300];
        raw.extend_from_slice(b": late");
        assert!(decode(&raw).is_err());
    }

    #[test]
    fn test_command_str_non_utf8() {
        let frame = decode(b"\xff\xfe: x").expect("decodes");
        assert_eq!(frame.command_str(), None);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            command in "[a-zA-Z0-9_.-]{1,255}",
            content in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let content = (!content.is_empty()).then_some(content);
            let frame = encode(command.as_bytes(), content.as_deref());
            let decoded = decode(&frame).expect("round trip decodes");
            prop_assert_eq!(decoded.command, command.as_bytes());
            prop_assert_eq!(decoded.content, content.as_deref());
        }
    }
}
