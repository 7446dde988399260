use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-negative amount split into major units and cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonetaryAmount {
    pub base: u64,
    pub fraction: u8,
}

impl MonetaryAmount {
    pub fn new(base: u64, fraction: u8) -> Option<Self> {
        (fraction <= 99).then_some(Self { base, fraction })
    }

    pub fn cents(&self) -> Option<u64> {
        self.base
            .checked_mul(100)
            .and_then(|v| v.checked_add(u64::from(self.fraction)))
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.base, self.fraction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMatch {
    pub name: String,
    pub amount_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInfo {
    pub name: String,
    pub amount: MonetaryAmount,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTransaction {
    pub id: String,
    pub name: String,
    pub base: u64,
    pub fraction: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyPool {
    pub name: String,
    pub title: String,
    pub open: bool,
    pub transactions: Vec<PoolTransaction>,
}
