//! Inline resource tokens (`data:<type>;base64,<payload>`) and the media-type table.

use std::sync::OnceLock;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use regex::Regex;

use crate::types::{CaptureResult, DecodedResource};

/// Extension used when the declared media type has no table entry.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Pages emit both padded and unpadded payloads; accept either.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i:data):([^;]+);base64,(.+)$").expect("token regex is valid")
    })
}

/// A well-formed inline resource token, borrowed from the candidate text.
///
/// The full text is the token's identity: two tokens are the same resource
/// only when they are byte-for-byte equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineToken<'a> {
    text: &'a str,
    media_type: &'a str,
    payload: &'a str,
}

impl<'a> InlineToken<'a> {
    /// Match `candidate` against the token grammar.
    ///
    /// Returns `None` for anything that is not a token. That is the normal
    /// outcome for most strings a channel sees and is not an error.
    pub fn parse(candidate: &'a str) -> Option<Self> {
        let caps = token_pattern().captures(candidate)?;
        let media_type = caps.get(1)?.as_str();
        let payload = caps.get(2)?.as_str();
        Some(Self {
            text: candidate,
            media_type,
            payload,
        })
    }

    /// The verbatim token text.
    pub fn as_str(&self) -> &'a str {
        self.text
    }

    /// The declared media type label, as written.
    pub fn media_type(&self) -> &'a str {
        self.media_type
    }

    /// The still-encoded payload.
    pub fn payload(&self) -> &'a str {
        self.payload
    }

    /// File-name extension for this token's media type.
    pub fn extension(&self) -> &'static str {
        extension_for(self.media_type)
    }

    /// Base64-decode the payload. Invalid payloads fail as a whole.
    pub fn decode(&self) -> CaptureResult<DecodedResource> {
        let bytes = PAYLOAD_ENGINE.decode(self.payload)?;
        Ok(DecodedResource {
            bytes,
            media_type: self.media_type.to_string(),
        })
    }
}

/// Cheap pre-filter used by channels before forwarding a string.
pub fn looks_like_token(candidate: &str) -> bool {
    candidate
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
        && candidate.contains(";base64,")
}

/// Map a media type label to a file-name extension.
///
/// Matching ignores ASCII case. Unmapped labels get [`FALLBACK_EXTENSION`].
pub fn extension_for(media_type: &str) -> &'static str {
    let label = media_type.trim().to_ascii_lowercase();
    match label.as_str() {
        // Raster images
        "image/png" | "image/apng" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        // Vector images
        "image/svg+xml" => "svg",
        // Fonts
        "font/woff" | "application/font-woff" | "application/x-font-woff" => "woff",
        "font/woff2" | "application/font-woff2" => "woff2",
        "font/ttf" | "application/x-font-ttf" | "application/font-sfnt" => "ttf",
        "font/otf" | "application/x-font-opentype" => "otf",
        "application/vnd.ms-fontobject" => "eot",
        // Audio
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/webm" => "weba",
        "audio/aac" => "aac",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/mp4" | "audio/x-m4a" => "m4a",
        "audio/midi" | "audio/x-midi" => "mid",
        // Video
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/ogg" => "ogv",
        "video/quicktime" => "mov",
        "video/x-msvideo" => "avi",
        // Documents
        "application/pdf" => "pdf",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "application/zip" => "zip",
        "application/wasm" => "wasm",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        // Scripts and styles
        "text/css" => "css",
        "text/javascript" | "application/javascript" | "application/x-javascript" => "js",
        _ => FALLBACK_EXTENSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaptureError;

    #[test]
    fn test_parse_png_token() {
        let token = InlineToken::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(token.media_type(), "image/png");
        assert_eq!(token.payload(), "iVBORw0KGgo=");
        assert_eq!(token.extension(), "png");

        let decoded = token.decode().unwrap();
        assert_eq!(decoded.bytes, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        assert_eq!(decoded.media_type, "image/png");
    }

    #[test]
    fn test_rejects_missing_separator() {
        assert!(InlineToken::parse("data:image/png,iVBORw0KGgo=").is_none());
        assert!(InlineToken::parse("data:image/png;base64").is_none());
        assert!(InlineToken::parse("data:image/png;base64,").is_none());
        assert!(InlineToken::parse("https://example.com/a.png").is_none());
        assert!(InlineToken::parse("").is_none());
    }

    #[test]
    fn test_rejects_parameterized_label() {
        // The label must not contain ';'.
        assert!(InlineToken::parse("data:image/svg+xml;charset=utf-8;base64,PHN2Zy8+").is_none());
    }

    #[test]
    fn test_invalid_base64_is_error_not_partial() {
        let token = InlineToken::parse("data:image/png;base64,iVBO*w0KGgo=").unwrap();
        match token.decode() {
            Err(CaptureError::InvalidBase64(_)) => {}
            other => panic!("expected InvalidBase64, got {other:?}"),
        }
    }

    #[test]
    fn test_unpadded_payload_accepted() {
        let token = InlineToken::parse("data:text/plain;base64,aGk").unwrap();
        assert_eq!(token.decode().unwrap().bytes, b"hi");
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let token = InlineToken::parse("data:application/unknown;base64,AA==").unwrap();
        assert_eq!(token.extension(), FALLBACK_EXTENSION);
        assert_eq!(token.decode().unwrap().bytes, vec![0]);
    }

    #[test]
    fn test_extension_table_case_insensitive() {
        assert_eq!(extension_for("IMAGE/JPEG"), "jpg");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("font/woff2"), "woff2");
        assert_eq!(extension_for("audio/mpeg"), "mp3");
        assert_eq!(extension_for("video/webm"), "webm");
        assert_eq!(extension_for("application/pdf"), "pdf");
        assert_eq!(extension_for("text/css"), "css");
        assert_eq!(extension_for("application/javascript"), "js");
    }

    #[test]
    fn test_looks_like_token() {
        assert!(looks_like_token("data:image/png;base64,AAAA"));
        assert!(looks_like_token("DATA:image/png;base64,AAAA"));
        assert!(!looks_like_token("blob:https://example.com/uuid"));
        assert!(!looks_like_token("data:"));
    }
}
