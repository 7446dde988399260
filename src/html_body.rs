use base64::{engine::general_purpose::STANDARD, Engine};
use scraper::Html;
use tracing::debug;

use crate::error::ExtractError;

/// Decodes a base64 email body and parses it into a document tree.
///
/// MIME encoders fold base64 into short lines, so ASCII whitespace is dropped
/// before decoding. Markup errors are recovered from the way browsers do; only
/// a body that is not UTF-8 is rejected as unparseable.
pub fn parse_html_body(body_base64: &str) -> Result<Html, ExtractError> {
    let compact = body_base64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ExtractError::Decode(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| ExtractError::Parse(e.to_string()))?;

    let doc = Html::parse_document(&text);
    if !doc.errors.is_empty() {
        debug!(
            recovered_errors = doc.errors.len(),
            "html body parsed with markup errors"
        );
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_folded_base64_lines() {
        let encoded = STANDARD.encode("<html><body><p><span>hi</span></p></body></html>");
        let folded = encoded
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).expect("ascii"))
            .collect::<Vec<_>>()
            .join("\r\n");
        let doc = parse_html_body(&folded).expect("parse folded body");
        assert!(doc.root_element().html().contains("<span>hi</span>"));
    }

    #[test]
    fn plain_html_is_a_decode_error() {
        let err = parse_html_body("<html><body>not encoded</body></html>")
            .expect_err("raw html must not decode");
        assert!(matches!(err, ExtractError::Decode(_)));
    }

    #[test]
    fn non_utf8_payload_is_a_parse_error() {
        let encoded = STANDARD.encode([0xff_u8, 0xfe, 0x3c, 0x70]);
        let err = parse_html_body(&encoded).expect_err("invalid utf-8 must fail");
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn broken_markup_is_accepted() {
        let encoded = STANDARD.encode("<p><span>unclosed <b>tags</p></div></table>");
        assert!(parse_html_body(&encoded).is_ok());
    }
}
