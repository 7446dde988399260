use crate::error::AmountError;
use crate::model::MonetaryAmount;

/// Grouping and decimal separators used when a currency is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyConvention {
    pub decimal: char,
    pub thousands: Option<char>,
}

impl CurrencyConvention {
    const fn new(decimal: char, thousands: char) -> Self {
        Self {
            decimal,
            thousands: Some(thousands),
        }
    }
}

/// Decimal point, no grouping. This is the form `MonetaryAmount` displays in.
pub const CANONICAL_CONVENTION: CurrencyConvention = CurrencyConvention {
    decimal: '.',
    thousands: None,
};

// Separators that are neither ',' nor '.' never survive the numeric filter,
// so for those currencies only the decimal separator matters.
const CURRENCY_CONVENTIONS: &[(&str, CurrencyConvention)] = &[
    ("EUR", CurrencyConvention::new(',', '.')),
    ("USD", CurrencyConvention::new('.', ',')),
    ("GBP", CurrencyConvention::new('.', ',')),
    ("CHF", CurrencyConvention::new('.', '\'')),
    ("JPY", CurrencyConvention::new('.', ',')),
    ("CNY", CurrencyConvention::new('.', ',')),
    ("CAD", CurrencyConvention::new('.', ',')),
    ("AUD", CurrencyConvention::new('.', ',')),
    ("NZD", CurrencyConvention::new('.', ',')),
    ("INR", CurrencyConvention::new('.', ',')),
    ("SEK", CurrencyConvention::new(',', ' ')),
    ("NOK", CurrencyConvention::new(',', ' ')),
    ("DKK", CurrencyConvention::new(',', '.')),
    ("PLN", CurrencyConvention::new(',', ' ')),
    ("CZK", CurrencyConvention::new(',', ' ')),
    ("HUF", CurrencyConvention::new(',', ' ')),
    ("BRL", CurrencyConvention::new(',', '.')),
];

pub fn currency_convention(code: &str) -> Option<CurrencyConvention> {
    CURRENCY_CONVENTIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, convention)| *convention)
}

pub fn known_currencies() -> impl Iterator<Item = &'static str> {
    CURRENCY_CONVENTIONS.iter().map(|(code, _)| *code)
}

/// Turns amount text such as `"1.234,56 EUR"` into whole units and cents.
///
/// The letters in the text name the currency, which decides what ',' and '.' mean.
pub fn normalize_amount_text(amount_text: &str) -> Result<MonetaryAmount, AmountError> {
    let numeric = amount_text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect::<String>();
    if !numeric.chars().any(|c| c.is_ascii_digit()) {
        return Err(AmountError::numeric(amount_text, "no amount found"));
    }

    let currency = amount_text
        .chars()
        .filter(char::is_ascii_alphabetic)
        .collect::<String>();
    let convention =
        currency_convention(&currency).ok_or_else(|| AmountError::LocaleUnknown(currency))?;

    parse_with_convention(&numeric, convention)
}

/// Splits a digits-and-separators string into whole units and cents.
///
/// Fewer than two fraction digits are right-padded; more are rounded half-up
/// at the second digit, carrying into the whole units.
pub fn parse_with_convention(
    numeric_text: &str,
    convention: CurrencyConvention,
) -> Result<MonetaryAmount, AmountError> {
    let ungrouped = numeric_text
        .chars()
        .filter(|c| Some(*c) != convention.thousands)
        .collect::<String>();

    let mut parts = ungrouped.split(convention.decimal);
    let major = parts.next().unwrap_or_default();
    let minor = parts.next().unwrap_or_default();
    if parts.next().is_some() {
        return Err(AmountError::numeric(
            numeric_text,
            "more than one decimal separator",
        ));
    }
    if !major.chars().all(|c| c.is_ascii_digit()) || !minor.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AmountError::numeric(
            numeric_text,
            "unexpected separator for currency",
        ));
    }
    if major.is_empty() && minor.is_empty() {
        return Err(AmountError::numeric(numeric_text, "no digits"));
    }

    let base = if major.is_empty() {
        0
    } else {
        major
            .parse::<u64>()
            .map_err(|_| AmountError::numeric(numeric_text, "whole units out of range"))?
    };
    let (fraction, carry) = round_minor_digits(minor);
    let base = base
        .checked_add(carry)
        .ok_or_else(|| AmountError::numeric(numeric_text, "whole units out of range"))?;

    Ok(MonetaryAmount { base, fraction })
}

fn round_minor_digits(minor: &str) -> (u8, u64) {
    let digits = minor.bytes().map(|b| b - b'0').collect::<Vec<_>>();
    let cents = match digits[..] {
        [] => 0,
        [tens] => tens * 10,
        [tens, ones] => tens * 10 + ones,
        [tens, ones, next, ..] => tens * 10 + ones + u8::from(next >= 5),
    };
    if cents >= 100 {
        (cents - 100, 1)
    } else {
        (cents, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(text: &str) -> (u64, u8) {
        let a = normalize_amount_text(text)
            .unwrap_or_else(|e| panic!("normalize {text:?} failed: {e}"));
        (a.base, a.fraction)
    }

    #[test]
    fn euro_uses_comma_decimal_and_period_grouping() {
        assert_eq!(amount("1.234,56EUR"), (1234, 56));
        assert_eq!(amount("1234,56EUR"), (1234, 56));
        assert_eq!(amount("1,99EUR"), (1, 99));
        assert_eq!(amount("00030,00EUR"), (30, 0));
        assert_eq!(amount("1.234.567,89 EUR"), (1_234_567, 89));
    }

    #[test]
    fn dollar_uses_period_decimal_and_comma_grouping() {
        assert_eq!(amount("12,345.67USD"), (12345, 67));
        assert_eq!(amount("2.99USD"), (2, 99));
        assert_eq!(amount("USD 1,000,000.01"), (1_000_000, 1));
    }

    #[test]
    fn missing_fraction_is_zero_cents() {
        assert_eq!(amount("20EUR"), (20, 0));
        assert_eq!(amount("20,EUR"), (20, 0));
        assert_eq!(amount("7 USD"), (7, 0));
    }

    #[test]
    fn surrounding_whitespace_and_symbols_are_ignored() {
        assert_eq!(amount("  12,34 \u{a0}EUR "), (12, 34));
        assert_eq!(amount("€ 12,34 EUR"), (12, 34));
        assert_eq!(amount("12,34 eur"), (12, 34));
    }

    #[test]
    fn short_fraction_is_right_padded() {
        assert_eq!(amount("1,5EUR"), (1, 50));
        assert_eq!(amount("0.1USD"), (0, 10));
        assert_eq!(amount(".50USD"), (0, 50));
    }

    #[test]
    fn long_fraction_rounds_half_up_at_second_digit() {
        assert_eq!(amount("1.00002USD"), (1, 0));
        assert_eq!(amount("1.004USD"), (1, 0));
        assert_eq!(amount("1.005USD"), (1, 1));
        assert_eq!(amount("1.0149999USD"), (1, 1));
        assert_eq!(amount("1.015USD"), (1, 2));
        assert_eq!(amount("1.994USD"), (1, 99));
        assert_eq!(amount("1.995USD"), (2, 0));
        assert_eq!(amount("9,999EUR"), (10, 0));
    }

    #[test]
    fn unknown_currency_is_a_locale_error() {
        assert_eq!(
            normalize_amount_text("12,34 XQZ"),
            Err(AmountError::LocaleUnknown("XQZ".to_string()))
        );
        assert_eq!(
            normalize_amount_text("12,34"),
            Err(AmountError::LocaleUnknown(String::new()))
        );
        assert_eq!(
            normalize_amount_text("12,34 EURO"),
            Err(AmountError::LocaleUnknown("EURO".to_string()))
        );
    }

    #[test]
    fn text_without_digits_is_a_numeric_error() {
        assert!(matches!(
            normalize_amount_text("EUR"),
            Err(AmountError::NumericParse { .. })
        ));
        assert!(matches!(
            normalize_amount_text(",. EUR"),
            Err(AmountError::NumericParse { .. })
        ));
    }

    #[test]
    fn digit_check_runs_before_currency_lookup() {
        assert!(matches!(
            normalize_amount_text("XQZ"),
            Err(AmountError::NumericParse { .. })
        ));
    }

    #[test]
    fn residue_separators_are_numeric_errors() {
        assert!(matches!(
            normalize_amount_text("1,234,56EUR"),
            Err(AmountError::NumericParse { .. })
        ));
        assert!(matches!(
            normalize_amount_text("1,234.56CHF"),
            Err(AmountError::NumericParse { .. })
        ));
        assert!(matches!(
            normalize_amount_text("99999999999999999999999EUR"),
            Err(AmountError::NumericParse { .. })
        ));
    }

    #[test]
    fn every_known_currency_yields_cents_in_range() {
        let samples = [
            "0", "1", "12,3", "12.3", "1.234,567", "1,234.567", "99.995", "99,995", ".999",
            ",999", "5,", "5.",
        ];
        for code in known_currencies() {
            for sample in samples {
                let text = format!("{sample} {code}");
                if let Ok(a) = normalize_amount_text(&text) {
                    assert!(a.fraction <= 99, "{text} gave fraction {}", a.fraction);
                }
            }
        }
    }

    #[test]
    fn canonical_form_round_trips() {
        for text in ["1.234,56EUR", "12,345.67USD", "20EUR", "1,5EUR", "1.995USD", "0,01EUR"] {
            let first = normalize_amount_text(text).expect("normalize");
            let again = parse_with_convention(&first.to_string(), CANONICAL_CONVENTION)
                .expect("canonical re-parse");
            assert_eq!(first, again, "round trip drifted for {text}");
        }
    }
}
