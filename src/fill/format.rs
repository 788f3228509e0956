use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::placeholder::patterns::{is_date_key, is_money_key, CURRENCY_PREFIX};
use crate::placeholder::{PlaceholderDescriptor, PlaceholderKind};

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(thousand|million|k|m)?\b").expect("amount regex")
});

static MONTH_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}$",
    )
    .expect("month date regex")
});

static SLASH_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{2,4}$").expect("slash date regex"));

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("iso date regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Currency,
    Date,
    Plain,
}

impl ValueKind {
    /// Blanks and `$`-prefixed tokens are money whatever their key. Otherwise
    /// the key's whole words decide, a date word first.
    pub fn of(desc: &PlaceholderDescriptor) -> ValueKind {
        if desc.kind == PlaceholderKind::CurrencyBlank || desc.prefix.is_some() {
            return ValueKind::Currency;
        }
        if is_date_key(&desc.key) {
            return ValueKind::Date;
        }
        if !desc.is_label() && is_money_key(&desc.key) {
            return ValueKind::Currency;
        }
        ValueKind::Plain
    }
}

/// Canonical value for a raw answer given the descriptor it answers.
pub fn format_value(raw: &str, desc: &PlaceholderDescriptor) -> String {
    match ValueKind::of(desc) {
        ValueKind::Currency => format_currency(raw, desc.prefix.as_deref().unwrap_or(CURRENCY_PREFIX)),
        ValueKind::Date => format_date(raw),
        ValueKind::Plain => raw.trim().to_string(),
    }
}

/// `"100k"` becomes `"$100,000"`, `"5 million"` becomes `"$5,000,000"`.
pub fn format_currency(raw: &str, prefix: &str) -> String {
    let raw = raw.trim();
    let Some(caps) = AMOUNT_RE.captures(raw) else {
        return format!("{prefix}{}", raw.trim_start_matches(prefix).trim_start());
    };
    let digits: String = caps
        .get(1)
        .map(|m| m.as_str().chars().filter(|c| *c != ',').collect())
        .unwrap_or_default();
    let Ok(mut amount) = digits.parse::<f64>() else {
        return format!("{prefix}{}", raw.trim_start_matches(prefix).trim_start());
    };
    let scale = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
    match scale.as_deref() {
        Some("k") | Some("thousand") => amount *= 1_000.0,
        Some("m") | Some("million") => amount *= 1_000_000.0,
        _ => {}
    }
    let cents = (amount * 100.0).round() as u128;
    let whole = group_thousands(cents / 100);
    match cents % 100 {
        0 => format!("{prefix}{whole}"),
        frac => format!("{prefix}{whole}.{frac:02}"),
    }
}

fn group_thousands(n: u128) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn is_recognized_date(raw: &str) -> bool {
    let raw = raw.trim();
    MONTH_DATE_RE.is_match(raw) || SLASH_DATE_RE.is_match(raw) || ISO_DATE_RE.is_match(raw)
}

/// Dates are accepted as written; there is no canonical output format.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();
    if !is_recognized_date(raw) {
        warn!("unrecognized date {raw:?}; using it as given");
    }
    raw.to_string()
}
