use scraper::{ElementRef, Html};

use crate::error::ExtractError;
use crate::text_locator::span_texts;

const ANCHOR_TAG: &str = "img";
const ANCHOR_ALT: &str = "quote";

/// The payer's note, rendered next to the quotation-mark image in the notification.
///
/// The note sits in a sibling branch of the image, so the search restarts
/// from the image's grandparent.
pub fn find_note(doc: &Html) -> Result<String, ExtractError> {
    let anchor = find_anchor(doc.root_element()).ok_or(ExtractError::NoAnchor)?;
    let region = anchor
        .parent()
        .and_then(|parent| parent.parent())
        .and_then(ElementRef::wrap)
        .ok_or(ExtractError::NoText)?;
    span_texts(region)
        .into_iter()
        .next()
        .ok_or(ExtractError::NoText)
}

fn find_anchor(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    root.descendants().filter_map(ElementRef::wrap).find(|el| {
        el.value().name().eq_ignore_ascii_case(ANCHOR_TAG)
            && el.value().attr("alt") == Some(ANCHOR_ALT)
    })
}
