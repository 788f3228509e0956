//! The fixed set of placeholder syntaxes and the markers used to place them.
//!
//! Every function here is a pure scan over an immutable snapshot and returns
//! owned spans; nothing keeps a matching cursor between calls.

use std::fmt;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::textutil::{collapse_whitespace, is_blank_token};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    SquareBracket,
    Curly,
    DoubleCurly,
    AngleBracket,
    CurrencyBlank,
    Label,
}

impl PlaceholderKind {
    pub fn is_literal(self) -> bool {
        !matches!(self, PlaceholderKind::Label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Company,
    Investor,
}

impl Party {
    pub fn as_str(self) -> &'static str {
        match self {
            Party::Company => "company",
            Party::Investor => "investor",
        }
    }

    /// Classify marker text: anything mentioning "company" is the company side.
    pub fn from_marker_text(text: &str) -> Party {
        if text.to_ascii_lowercase().contains("company") {
            Party::Company
        } else {
            Party::Investor
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelField {
    Address,
    Email,
    Name,
    Title,
}

impl LabelField {
    pub const ALL: [LabelField; 4] = [
        LabelField::Address,
        LabelField::Email,
        LabelField::Name,
        LabelField::Title,
    ];

    pub fn parse(word: &str) -> Option<LabelField> {
        match word {
            "Address" => Some(LabelField::Address),
            "Email" => Some(LabelField::Email),
            "Name" => Some(LabelField::Name),
            "Title" => Some(LabelField::Title),
            _ => None,
        }
    }

    /// The label as written in the document, colon included.
    pub fn token(self) -> &'static str {
        match self {
            LabelField::Address => "Address:",
            LabelField::Email => "Email:",
            LabelField::Name => "Name:",
            LabelField::Title => "Title:",
        }
    }

    pub fn key(self, party: Party) -> &'static str {
        match (party, self) {
            (Party::Company, LabelField::Address) => "Company Address",
            (Party::Company, LabelField::Email) => "Company Email",
            (Party::Company, LabelField::Name) => COMPANY_NAME_FIELD_KEY,
            (Party::Company, LabelField::Title) => COMPANY_TITLE_KEY,
            (Party::Investor, LabelField::Address) => "Investor Address",
            (Party::Investor, LabelField::Email) => "Investor Email",
            (Party::Investor, LabelField::Name) => INVESTOR_NAME_KEY,
            (Party::Investor, LabelField::Title) => INVESTOR_TITLE_KEY,
        }
    }
}

pub const COMPANY_NAME_KEY: &str = "Company Name";
pub const COMPANY_NAME_FIELD_KEY: &str = "Company Name Field";
pub const COMPANY_TITLE_KEY: &str = "Company Title";
pub const INVESTOR_NAME_KEY: &str = "Investor Name";
pub const INVESTOR_TITLE_KEY: &str = "Investor Title";
pub const PURCHASE_AMOUNT_KEY: &str = "Purchase Amount";
pub const VALUATION_CAP_KEY: &str = "Post-Money Valuation Cap";

pub const CURRENCY_PREFIX: &str = "$";

pub const VALUATION_KEYWORDS: [&str; 3] = ["valuation", "cap", "post-money"];
pub const PURCHASE_KEYWORDS: [&str; 3] = ["purchase", "investment", "amount"];

static DOUBLE_CURLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("double curly regex"));
static ANGLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<([^<>]+)>>").expect("angle regex"));
static SQUARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("square regex"));
static CURLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("curly regex"));

static CURRENCY_BLANK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\[\s*_+\s*\]").expect("currency blank regex"));

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)\b(Address|Email|Name|Title):[ \t]*$").expect("label regex"));

static PARTY_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?:COMPANY|INVESTOR)\]|\b(?:COMPANY|INVESTOR)\b:?").expect("party marker regex")
});

static PARTY_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(company|investor)\b").expect("party word regex"));

static SIGNATURE_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\bBy:|\b(?:Name|Title|Address|Email):[ \t]*$").expect("signature hint regex")
});

/// The literal delimiter syntaxes, in the order they are applied.
pub const LITERAL_KINDS: [PlaceholderKind; 4] = [
    PlaceholderKind::DoubleCurly,
    PlaceholderKind::AngleBracket,
    PlaceholderKind::SquareBracket,
    PlaceholderKind::Curly,
];

fn literal_regex(kind: PlaceholderKind) -> Option<&'static Regex> {
    match kind {
        PlaceholderKind::DoubleCurly => Some(&DOUBLE_CURLY_RE),
        PlaceholderKind::AngleBracket => Some(&ANGLE_RE),
        PlaceholderKind::SquareBracket => Some(&SQUARE_RE),
        PlaceholderKind::Curly => Some(&CURLY_RE),
        PlaceholderKind::CurrencyBlank | PlaceholderKind::Label => None,
    }
}

/// One raw literal token found in the text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteralMatch {
    pub kind: PlaceholderKind,
    pub span: Range<usize>,
    /// Inner text, trimmed with whitespace collapsed.
    pub name: String,
}

/// All literal tokens, pattern by pattern, skipping blanks and anything that
/// overlaps a span claimed by an earlier pattern. Sorted by position.
pub fn find_literal_tokens(text: &str) -> Vec<LiteralMatch> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut out: Vec<LiteralMatch> = Vec::new();
    for kind in LITERAL_KINDS {
        let Some(re) = literal_regex(kind) else {
            continue;
        };
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let span = whole.range();
            if claimed.iter().any(|c| c.start < span.end && span.start < c.end) {
                continue;
            }
            if is_blank_token(inner.as_str()) {
                continue;
            }
            claimed.push(span.clone());
            out.push(LiteralMatch {
                kind,
                span,
                name: collapse_whitespace(inner.as_str()),
            });
        }
    }
    out.sort_by_key(|m| m.span.start);
    out
}

pub fn find_currency_blanks(text: &str) -> Vec<Range<usize>> {
    CURRENCY_BLANK_RE.find_iter(text).map(|m| m.range()).collect()
}

/// Label occurrences that end their line. The span covers `Label:` only.
pub fn find_labels(text: &str) -> Vec<(LabelField, Range<usize>)> {
    let mut out = Vec::new();
    for caps in LABEL_RE.captures_iter(text) {
        let Some(word) = caps.get(1) else {
            continue;
        };
        let Some(field) = LabelField::parse(word.as_str()) else {
            continue;
        };
        // word plus the colon
        out.push((field, word.start()..word.end() + 1));
    }
    out
}

/// Party markers with their offsets, sorted by position.
pub fn find_party_markers(text: &str) -> Vec<(usize, Party)> {
    PARTY_MARKER_RE
        .find_iter(text)
        .map(|m| (m.start(), Party::from_marker_text(m.as_str())))
        .collect()
}

/// Nearest `company` / `investor` word (any case) in `window`; returns the
/// party whose last occurrence sits closest to the window's end.
pub fn nearest_party_word(window: &str) -> Option<Party> {
    PARTY_WORD_RE
        .find_iter(window)
        .last()
        .map(|m| Party::from_marker_text(m.as_str()))
}

pub fn has_signature_hint(window: &str) -> bool {
    SIGNATURE_HINT_RE.is_match(window)
}

pub fn mentions_any(window: &str, keywords: &[&str]) -> bool {
    let lower = window.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

/// Words of a key that mark a monetary term.
pub const MONEY_KEY_WORDS: [&str; 4] = ["amount", "valuation", "cap", "price"];

/// Whole-word, case-insensitive test on a placeholder key. `-` and other
/// punctuation split words, so "Post-Money" is "post" and "money".
pub fn key_has_word(key: &str, words: &[&str]) -> bool {
    key.split(|c: char| !c.is_alphanumeric())
        .any(|part| words.iter().any(|w| part.eq_ignore_ascii_case(w)))
}

pub fn is_date_key(key: &str) -> bool {
    key_has_word(key, &["date"])
}

/// Money keys that are not also dates ("Date of Payment Amount" is a date).
pub fn is_money_key(key: &str) -> bool {
    !is_date_key(key) && key_has_word(key, &MONEY_KEY_WORDS)
}
