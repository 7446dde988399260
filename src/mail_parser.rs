use scraper::Html;
use tracing::debug;

use crate::amount::normalize_amount_text;
use crate::error::{ExtractError, PatternError};
use crate::html_body::parse_html_body;
use crate::model::TransactionInfo;
use crate::name_amount::NameAmountPattern;
use crate::note::find_note;
use crate::text_locator::span_texts;

/// Extracts payer, amount and note from a payment-notification HTML body.
#[derive(Debug, Clone)]
pub struct TransactionMailParser {
    pattern: NameAmountPattern,
}

impl TransactionMailParser {
    pub fn new(name_amount_regex: &str) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: NameAmountPattern::new(name_amount_regex)?,
        })
    }

    pub fn pattern(&self) -> &NameAmountPattern {
        &self.pattern
    }

    pub fn transaction_info(&self, html_body_base64: &str) -> Result<TransactionInfo, ExtractError> {
        let doc = parse_html_body(html_body_base64)?;
        self.transaction_info_from_document(&doc)
    }

    /// Both halves must succeed; a payment without its note is not returned.
    pub fn transaction_info_from_document(&self, doc: &Html) -> Result<TransactionInfo, ExtractError> {
        let texts = span_texts(doc.root_element());
        debug!(candidates = texts.len(), "located span texts");
        let matched = self.pattern.first_match(&texts)?;
        let amount = normalize_amount_text(&matched.amount_text)?;
        let note = find_note(doc)?;
        Ok(TransactionInfo {
            name: matched.name,
            amount,
            note,
        })
    }
}
