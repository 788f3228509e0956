use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::patterns::{is_date_key, is_money_key, key_has_word, Party, PlaceholderKind};

/// Stable identity of a descriptor inside its catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceholderId(pub usize);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderDescriptor {
    pub key: String,
    pub original_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub kind: PlaceholderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<Party>,
    /// Byte offset of the first occurrence in the text snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Every byte offset in the snapshot claimed by this descriptor.
    #[serde(default)]
    pub occurrences: Vec<usize>,
}

impl PlaceholderDescriptor {
    pub fn is_label(&self) -> bool {
        self.kind == PlaceholderKind::Label
    }
}

/// Everything detected in one document snapshot.
///
/// Descriptors live in an arena; several may share a key (a body reference
/// and its signature-block alias, or the same label on repeated signature
/// pages). One answer per key fills all of them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    fingerprint: String,
    entries: Vec<PlaceholderDescriptor>,
}

impl Catalog {
    pub fn new(text: &str) -> Self {
        Self {
            fingerprint: text_fingerprint(text),
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, desc: PlaceholderDescriptor) -> PlaceholderId {
        self.entries.push(desc);
        PlaceholderId(self.entries.len() - 1)
    }

    pub(crate) fn find_literal_mut(
        &mut self,
        original_token: &str,
        key: &str,
    ) -> Option<&mut PlaceholderDescriptor> {
        self.entries
            .iter_mut()
            .find(|d| d.kind.is_literal() && d.original_token == original_token && d.key == key)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether `text` is the snapshot this catalog was built from.
    pub fn matches_text(&self, text: &str) -> bool {
        self.fingerprint == text_fingerprint(text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: PlaceholderId) -> Option<&PlaceholderDescriptor> {
        self.entries.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceholderId, &PlaceholderDescriptor)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, d)| (PlaceholderId(i), d))
    }

    pub fn by_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a PlaceholderDescriptor> + 'a {
        self.entries.iter().filter(move |d| d.key == key)
    }

    /// The descriptor answers for `key` are formatted against.
    pub fn primary(&self, key: &str) -> Option<&PlaceholderDescriptor> {
        self.entries.iter().find(|d| d.key == key)
    }

    /// Unique keys in detection order.
    pub fn keys(&self) -> Vec<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        self.entries
            .iter()
            .map(|d| d.key.as_str())
            .filter(|k| seen.insert(k))
            .collect()
    }

    /// Unique keys in display order; see [`priority_rank`].
    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut primaries: Vec<&PlaceholderDescriptor> = self
            .keys()
            .into_iter()
            .filter_map(|k| self.primary(k))
            .collect();
        sort_by_priority(&mut primaries);
        primaries.into_iter().map(|d| d.key.as_str()).collect()
    }

    /// Every token string the catalog claims, literal kinds only.
    pub fn literal_tokens(&self) -> HashSet<&str> {
        self.entries
            .iter()
            .filter(|d| d.kind.is_literal())
            .map(|d| d.original_token.as_str())
            .collect()
    }
}

pub fn text_fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Display priority: company identity, investor identity, money, dates,
/// jurisdiction, anything else, then the company and investor signature
/// blocks. Lower ranks first.
pub fn priority_rank(desc: &PlaceholderDescriptor) -> u8 {
    match desc.party {
        Some(Party::Company) => return 6,
        Some(Party::Investor) => return 7,
        None => {}
    }
    let key = desc.key.as_str();
    let has = |words: &[&str]| key_has_word(key, words);
    if desc.kind == PlaceholderKind::CurrencyBlank || desc.prefix.is_some() {
        return 2;
    }
    if is_date_key(key) {
        return 3;
    }
    if is_money_key(key) || has(&["discount"]) {
        return 2;
    }
    if has(&["state", "jurisdiction", "governing", "incorporation", "county"]) {
        return 4;
    }
    if has(&["company"]) {
        return 0;
    }
    if has(&["investor"]) {
        return 1;
    }
    5
}

/// Stable sort of descriptors by [`priority_rank`].
pub fn sort_by_priority(descs: &mut [&PlaceholderDescriptor]) {
    descs.sort_by_key(|d| priority_rank(d));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(key: &str) -> PlaceholderDescriptor {
        PlaceholderDescriptor {
            key: key.to_string(),
            original_token: format!("[{key}]"),
            prefix: None,
            kind: PlaceholderKind::SquareBracket,
            party: None,
            offset: Some(0),
            occurrences: vec![0],
        }
    }

    #[test]
    fn keys_are_unique_in_detection_order() {
        let mut cat = Catalog::new("x");
        cat.push(literal("Date of Safe"));
        cat.push(literal("Company Name"));
        let mut alias = literal("Company Name");
        alias.original_token = "[COMPANY]".to_string();
        cat.push(alias);
        assert_eq!(cat.len(), 3);
        assert_eq!(cat.keys(), vec!["Date of Safe", "Company Name"]);
        assert_eq!(cat.by_key("Company Name").count(), 2);
    }

    #[test]
    fn priority_order_is_stable() {
        let mut cat = Catalog::new("x");
        let mut sig = literal(COMPANY_TITLE);
        sig.party = Some(Party::Company);
        cat.push(sig);
        cat.push(literal("State of Incorporation"));
        cat.push(literal("Governing Law Jurisdiction"));
        cat.push(literal("Date of Safe"));
        cat.push(literal("Purchase Amount"));
        cat.push(literal("Investor Full Name"));
        cat.push(literal("Company Name"));
        cat.push(literal("Notes"));
        assert_eq!(
            cat.sorted_keys(),
            vec![
                "Company Name",
                "Investor Full Name",
                "Purchase Amount",
                "Date of Safe",
                "State of Incorporation",
                "Governing Law Jurisdiction",
                "Notes",
                COMPANY_TITLE,
            ]
        );
    }

    const COMPANY_TITLE: &str = "Company Title";

    #[test]
    fn money_rank_needs_a_whole_money_word() {
        assert_eq!(priority_rank(&literal("Date of Investment")), 3);
        assert_eq!(priority_rank(&literal("Capital Stock Class")), 5);
        assert_eq!(priority_rank(&literal("Escape Clause Venue")), 5);
        assert_eq!(priority_rank(&literal("Investment Vehicle Name")), 5);
        assert_eq!(priority_rank(&literal("Real Estate Address")), 5);
        assert_eq!(priority_rank(&literal("Post-Money Valuation Cap")), 2);
        assert_eq!(priority_rank(&literal("Discount Rate")), 2);
    }

    #[test]
    fn fingerprint_tracks_the_snapshot() {
        let cat = Catalog::new("hello");
        assert!(cat.matches_text("hello"));
        assert!(!cat.matches_text("hello!"));
    }
}
