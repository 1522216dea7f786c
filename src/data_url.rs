//! Converting binary data to and from `data:` URLs, which is how we inline
//! local documents in OCR requests.

use std::sync::LazyLock;

use base64::{Engine as _, prelude::BASE64_STANDARD};
use regex::Regex;

use crate::prelude::*;

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    let base64_data = BASE64_STANDARD.encode(data);
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Regex for parsing a `data:` URL.
static DATA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^data:(?P<mime_type>[^;,]+);base64,(?P<data>.*)$")
        .expect("failed to compile regex")
});

/// Parse a `data:` URL into a MIME type and Base64-encoded data.
pub fn parse_data_url(data_url: &str) -> Option<(&str, &str)> {
    let caps = DATA_URL_RE.captures(data_url)?;
    let mime_type = caps.name("mime_type")?.as_str();
    let data = caps.name("data")?.as_str();
    Some((mime_type, data))
}

/// Parse and decode a `data:` URL into a MIME type and raw bytes.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>)> {
    let (mime_type, data) =
        parse_data_url(data_url).ok_or_else(|| anyhow!("not a base64 data: URL"))?;
    let bytes = BASE64_STANDARD
        .decode(data)
        .context("failed to decode base64 data in data: URL")?;
    Ok((mime_type.to_owned(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_uses_standard_base64() {
        assert_eq!(data_url("application/pdf", b"%PDF"), "data:application/pdf;base64,JVBERg==");
    }

    #[test]
    fn decode_data_url_recovers_bytes() {
        let url = data_url("image/png", &[0, 1, 2, 250]);
        let (mime_type, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime_type, "image/png");
        assert_eq!(bytes, vec![0, 1, 2, 250]);
    }

    #[test]
    fn plain_urls_are_not_data_urls() {
        assert!(parse_data_url("https://example.com/a.pdf").is_none());
        assert!(decode_data_url("https://example.com/a.pdf").is_err());
    }
}
