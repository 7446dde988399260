use regex::Regex;

use crate::error::{ExtractError, PatternError};
use crate::model::ExtractedMatch;

const NAME_GROUP: &str = "name";
const AMOUNT_GROUP: &str = "amount";

/// A compiled name/amount regex with its group indices resolved up front.
#[derive(Debug, Clone)]
pub struct NameAmountPattern {
    re: Regex,
    name_idx: usize,
    amount_idx: usize,
}

impl NameAmountPattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let re = Regex::new(pattern)?;
        let mut name_idx = None;
        let mut amount_idx = None;
        for (idx, group) in re.capture_names().enumerate() {
            match group {
                None => {}
                Some(NAME_GROUP) => name_idx = Some(idx),
                Some(AMOUNT_GROUP) => amount_idx = Some(idx),
                Some(other) => return Err(PatternError::UnexpectedGroup(other.to_string())),
            }
        }
        Ok(Self {
            name_idx: name_idx.ok_or(PatternError::MissingGroup(NAME_GROUP))?,
            amount_idx: amount_idx.ok_or(PatternError::MissingGroup(AMOUNT_GROUP))?,
            re,
        })
    }

    pub fn as_str(&self) -> &str {
        self.re.as_str()
    }

    /// Both groups of the first match in `text`, if both captured something.
    pub fn match_text(&self, text: &str) -> Option<ExtractedMatch> {
        let caps = self.re.captures(text)?;
        let name = caps.get(self.name_idx).map(|m| m.as_str())?;
        let amount_text = caps.get(self.amount_idx).map(|m| m.as_str())?;
        if name.is_empty() || amount_text.is_empty() {
            return None;
        }
        Some(ExtractedMatch {
            name: name.to_string(),
            amount_text: amount_text.to_string(),
        })
    }

    /// First acceptable match over the located texts; earlier fragments win.
    pub fn first_match<I, S>(&self, texts: I) -> Result<ExtractedMatch, ExtractError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        texts
            .into_iter()
            .find_map(|text| self.match_text(text.as_ref()))
            .ok_or(ExtractError::NoMatch)
    }
}
