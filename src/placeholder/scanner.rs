use std::ops::Range;

use log::debug;

use super::catalog::{Catalog, PlaceholderDescriptor};
use super::context::{ContextResolver, ContextWindows};
use super::patterns::{
    find_currency_blanks, find_labels, find_literal_tokens, has_signature_hint, mentions_any,
    nearest_party_word, LiteralMatch, Party, PlaceholderKind, COMPANY_NAME_FIELD_KEY,
    COMPANY_NAME_KEY, COMPANY_TITLE_KEY, CURRENCY_PREFIX, INVESTOR_NAME_KEY, INVESTOR_TITLE_KEY,
    PURCHASE_AMOUNT_KEY, PURCHASE_KEYWORDS, VALUATION_CAP_KEY, VALUATION_KEYWORDS,
};
use crate::textutil::{char_window_end, char_window_start};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanSettings {
    /// Look-back (chars) for the company/investor word deciding `[name]` / `[title]`.
    pub signature_window: usize,
    /// Look-ahead (chars) for `By:` or label lines marking a signature block.
    pub signature_block_after: usize,
    /// Keyword window (chars) on each side of a `$[___]` blank.
    pub currency_keyword_window: usize,
    pub context: ContextWindows,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            signature_window: 1000,
            signature_block_after: 500,
            currency_keyword_window: 100,
            context: ContextWindows::default(),
        }
    }
}

pub fn scan(text: &str) -> Catalog {
    scan_with(text, &ScanSettings::default())
}

/// Build the catalog for one text snapshot.
pub fn scan_with(text: &str, settings: &ScanSettings) -> Catalog {
    let mut catalog = Catalog::new(text);

    enum Raw {
        Literal(LiteralMatch),
        Blank(Range<usize>),
    }
    let mut raws: Vec<(usize, Raw)> = find_literal_tokens(text)
        .into_iter()
        .map(|m| (m.span.start, Raw::Literal(m)))
        .collect();
    raws.extend(
        find_currency_blanks(text)
            .into_iter()
            .map(|span| (span.start, Raw::Blank(span))),
    );
    // Left-to-right document position defines arrival order for blanks.
    raws.sort_by_key(|(start, _)| *start);

    let mut blanks = BlankAssigner::default();
    for (_, raw) in raws {
        match raw {
            Raw::Literal(m) => add_literal(&mut catalog, text, &m, settings),
            Raw::Blank(span) => {
                let key = blanks.assign(text, &span, settings.currency_keyword_window);
                add_occurrence(
                    &mut catalog,
                    PlaceholderDescriptor {
                        key,
                        original_token: text[span.clone()].to_string(),
                        prefix: Some(CURRENCY_PREFIX.to_string()),
                        kind: PlaceholderKind::CurrencyBlank,
                        party: None,
                        offset: Some(span.start),
                        occurrences: vec![span.start],
                    },
                );
            }
        }
    }

    let literal_count = catalog.len();
    add_labels(&mut catalog, text, settings);
    debug!(
        "scan: {} literal descriptors, {} label descriptors, {} keys",
        literal_count,
        catalog.len() - literal_count,
        catalog.keys().len()
    );
    catalog
}

fn add_literal(catalog: &mut Catalog, text: &str, m: &LiteralMatch, settings: &ScanSettings) {
    let mut start = m.span.start;
    let mut prefix = None;
    if m.kind == PlaceholderKind::SquareBracket && text[..start].ends_with(CURRENCY_PREFIX) {
        start -= CURRENCY_PREFIX.len();
        prefix = Some(CURRENCY_PREFIX.to_string());
    }
    let (key, party) = literal_key(text, m, settings);
    add_occurrence(
        catalog,
        PlaceholderDescriptor {
            key,
            original_token: text[start..m.span.end].to_string(),
            prefix,
            kind: m.kind,
            party,
            offset: Some(start),
            occurrences: vec![start],
        },
    );
}

/// Same literal with the same key collapses into one descriptor.
fn add_occurrence(catalog: &mut Catalog, desc: PlaceholderDescriptor) {
    let at = desc.offset.unwrap_or_default();
    if let Some(existing) = catalog.find_literal_mut(&desc.original_token, &desc.key) {
        existing.occurrences.push(at);
        return;
    }
    catalog.push(desc);
}

fn literal_key(text: &str, m: &LiteralMatch, settings: &ScanSettings) -> (String, Option<Party>) {
    let lower = m.name.to_lowercase();
    if lower == "name" || lower == "title" {
        let from = char_window_start(text, m.span.start, settings.signature_window);
        if let Some(party) = nearest_party_word(&text[from..m.span.start]) {
            let key = match (party, lower.as_str()) {
                (Party::Company, "name") => COMPANY_NAME_FIELD_KEY,
                (Party::Company, _) => COMPANY_TITLE_KEY,
                (Party::Investor, "name") => INVESTOR_NAME_KEY,
                (Party::Investor, _) => INVESTOR_TITLE_KEY,
            };
            return (key.to_string(), Some(party));
        }
    }
    if m.kind == PlaceholderKind::SquareBracket
        && m.name == "COMPANY"
        && in_signature_block(text, &m.span, settings)
    {
        return (COMPANY_NAME_KEY.to_string(), None);
    }
    (m.name.clone(), None)
}

fn in_signature_block(text: &str, span: &Range<usize>, settings: &ScanSettings) -> bool {
    let after_end = char_window_end(text, span.end, settings.signature_block_after);
    if has_signature_hint(&text[span.end..after_end]) {
        return true;
    }
    let before_start = char_window_start(text, span.start, settings.signature_window);
    text[before_start..span.start]
        .to_uppercase()
        .contains("IN WITNESS WHEREOF")
}

/// Hands out the purchase-amount and valuation-cap keys to `$[___]` blanks.
#[derive(Default)]
struct BlankAssigner {
    taken: Vec<String>,
}

impl BlankAssigner {
    fn assign(&mut self, text: &str, span: &Range<usize>, window: usize) -> String {
        let from = char_window_start(text, span.start, window);
        let to = char_window_end(text, span.end, window);
        let around = &text[from..to];
        let hinted = if mentions_any(around, &VALUATION_KEYWORDS) {
            Some(VALUATION_CAP_KEY)
        } else if mentions_any(around, &PURCHASE_KEYWORDS) {
            Some(PURCHASE_AMOUNT_KEY)
        } else {
            None
        };

        let key = match hinted.filter(|k| !self.is_taken(k)) {
            Some(k) => k.to_string(),
            None => {
                let fallback = [PURCHASE_AMOUNT_KEY, VALUATION_CAP_KEY]
                    .into_iter()
                    .find(|k| !self.is_taken(k))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Currency Amount {}", self.taken.len() + 1));
                debug!(
                    "currency blank at {}: keyword hint {:?} unusable, arrival order gives {fallback}",
                    span.start, hinted
                );
                fallback
            }
        };
        self.taken.push(key.clone());
        key
    }

    fn is_taken(&self, key: &str) -> bool {
        self.taken.iter().any(|k| k == key)
    }
}

fn add_labels(catalog: &mut Catalog, text: &str, settings: &ScanSettings) {
    let labels = find_labels(text);
    if labels.is_empty() {
        return;
    }
    let resolver = ContextResolver::new(text, settings.context);
    for (field, span) in labels {
        let Some(party) = resolver.resolve(text, span.start) else {
            debug!("dropping {} at {}: party unresolved", field.token(), span.start);
            continue;
        };
        let key = field.key(party);
        let duplicate = catalog
            .iter()
            .any(|(_, d)| d.is_label() && d.key == key && d.offset == Some(span.start));
        if duplicate {
            continue;
        }
        catalog.push(PlaceholderDescriptor {
            key: key.to_string(),
            original_token: field.token().to_string(),
            prefix: None,
            kind: PlaceholderKind::Label,
            party: Some(party),
            offset: Some(span.start),
            occurrences: vec![span.start],
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn keys_of(cat: &Catalog) -> Vec<&str> {
        cat.iter().map(|(_, d)| d.key.as_str()).collect()
    }

    #[test]
    fn single_tokens_yield_single_entries() {
        let text = "This agreement between [Company Name] and {{Investor}} dated <<Date of Safe>>, see {Notes}.";
        let cat = scan(text);
        let tokens: BTreeSet<&str> = cat.iter().map(|(_, d)| d.original_token.as_str()).collect();
        assert_eq!(
            tokens,
            BTreeSet::from(["[Company Name]", "{{Investor}}", "<<Date of Safe>>", "{Notes}"])
        );
        assert_eq!(cat.len(), 4);
    }

    #[test]
    fn keys_are_normalized() {
        let cat = scan("Signed in [  State of\n  Incorporation ].");
        assert_eq!(keys_of(&cat), vec!["State of Incorporation"]);
        assert_eq!(
            cat.primary("State of Incorporation").map(|d| d.original_token.as_str()),
            Some("[  State of\n  Incorporation ]")
        );
    }

    #[test]
    fn repeated_token_collapses_with_all_occurrences() {
        let text = "[Company Name] agrees. Later [Company Name] again.";
        let cat = scan(text);
        assert_eq!(cat.len(), 1);
        let d = cat.primary("Company Name").expect("descriptor");
        assert_eq!(d.occurrences, vec![0, 29]);
        assert_eq!(d.offset, Some(0));
    }

    #[test]
    fn unlabeled_blanks_follow_arrival_order() {
        let text = "First: $[_________]. Second: $[______].";
        let cat = scan(text);
        assert_eq!(keys_of(&cat), vec![PURCHASE_AMOUNT_KEY, VALUATION_CAP_KEY]);
        assert!(cat
            .iter()
            .all(|(_, d)| d.prefix.as_deref() == Some("$") && d.kind == PlaceholderKind::CurrencyBlank));
    }

    #[test]
    fn blanks_use_keyword_context() {
        let filler = " ".repeat(150);
        let text = format!(
            "The Post-Money Valuation Cap is $[_______].{filler}The Purchase Amount is $[_______]."
        );
        let cat = scan(&text);
        assert_eq!(keys_of(&cat), vec![VALUATION_CAP_KEY, PURCHASE_AMOUNT_KEY]);
    }

    #[test]
    fn same_keyword_twice_falls_back_to_free_slot() {
        let filler = " ".repeat(150);
        let text = format!("valuation $[___]{filler}valuation $[___]");
        let cat = scan(&text);
        assert_eq!(keys_of(&cat), vec![VALUATION_CAP_KEY, PURCHASE_AMOUNT_KEY]);
    }

    #[test]
    fn extra_blanks_get_numbered_keys() {
        let filler = " ".repeat(150);
        let text = format!(
            "purchase $[___]{filler}valuation $[___]{filler}filing fee $[___]{filler}legal fee $[___]"
        );
        let cat = scan(&text);
        assert_eq!(
            keys_of(&cat),
            vec![
                PURCHASE_AMOUNT_KEY,
                VALUATION_CAP_KEY,
                "Currency Amount 3",
                "Currency Amount 4"
            ]
        );
        let third = cat.primary("Currency Amount 3").expect("descriptor");
        assert_eq!(third.kind, PlaceholderKind::CurrencyBlank);
        let third_at = text.match_indices("$[___]").nth(2).map(|(i, _)| i);
        assert_eq!(third.offset, third_at);
    }

    #[test]
    fn dollar_before_bracket_becomes_prefix() {
        let cat = scan("pays $[Purchase Amount] today");
        let d = cat.primary("Purchase Amount").expect("descriptor");
        assert_eq!(d.original_token, "$[Purchase Amount]");
        assert_eq!(d.prefix.as_deref(), Some("$"));
        assert_eq!(d.offset, Some(5));
    }

    #[test]
    fn generic_name_and_title_follow_signature_party() {
        let text = "COMPANY:\nBy: ____\n[name]\n[title]\n\nINVESTOR:\nBy: ____\n[name]\n[title]\n";
        let cat = scan(text);
        assert_eq!(
            keys_of(&cat),
            vec![
                COMPANY_NAME_FIELD_KEY,
                COMPANY_TITLE_KEY,
                INVESTOR_NAME_KEY,
                INVESTOR_TITLE_KEY
            ]
        );
        let names: Vec<_> = cat
            .iter()
            .filter(|(_, d)| d.original_token == "[name]")
            .map(|(_, d)| d.party)
            .collect();
        assert_eq!(names, vec![Some(Party::Company), Some(Party::Investor)]);
    }

    #[test]
    fn company_marker_in_signature_block_aliases_company_name() {
        let text = "This Safe is issued by [Company Name].\n\nIN WITNESS WHEREOF\n\n[COMPANY]\nBy: ______\n";
        let cat = scan(text);
        let tokens: Vec<&str> = cat
            .by_key(COMPANY_NAME_KEY)
            .map(|d| d.original_token.as_str())
            .collect();
        assert_eq!(tokens, vec!["[Company Name]", "[COMPANY]"]);
        assert_eq!(cat.keys(), vec![COMPANY_NAME_KEY]);
    }

    #[test]
    fn bare_company_outside_signature_keeps_own_key() {
        let cat = scan("Refer to [COMPANY] in the recitals.");
        assert_eq!(keys_of(&cat), vec!["COMPANY"]);
    }

    #[test]
    fn labels_get_party_and_offset() {
        let text = "COMPANY\nBy:\nAddress:\nEmail:\n\nINVESTOR\nBy:\nAddress:\nEmail:\n";
        let cat = scan(text);
        let labels: Vec<_> = cat
            .iter()
            .filter(|(_, d)| d.is_label())
            .map(|(_, d)| (d.key.as_str(), d.party, d.offset))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("Company Address", Some(Party::Company), Some(12)),
                ("Company Email", Some(Party::Company), Some(21)),
                ("Investor Address", Some(Party::Investor), Some(42)),
                ("Investor Email", Some(Party::Investor), Some(51)),
            ]
        );
    }

    #[test]
    fn repeated_signature_pages_keep_both_offsets() {
        let text = "COMPANY\nAddress:\n\nCOMPANY\nAddress:\n";
        let cat = scan(text);
        let offsets: Vec<_> = cat.by_key("Company Address").map(|d| d.offset).collect();
        assert_eq!(offsets, vec![Some(8), Some(26)]);
    }

    #[test]
    fn unplaceable_labels_are_dropped() {
        let cat = scan("Name:\nTitle:\n");
        assert!(cat.is_empty());
    }

    #[test]
    fn empty_text_gives_empty_catalog() {
        assert!(scan("").is_empty());
        assert!(scan("no placeholders at all").is_empty());
    }

    #[test]
    fn scanning_is_idempotent() {
        let text = "[Company Name] $[____] COMPANY\nName:\n{{Date}} $[____]";
        let a = scan(text);
        let b = scan(text);
        let keys = |c: &Catalog| c.keys().into_iter().map(str::to_string).collect::<BTreeSet<_>>();
        let toks = |c: &Catalog| c.literal_tokens().into_iter().map(str::to_string).collect::<BTreeSet<_>>();
        assert_eq!(keys(&a), keys(&b));
        assert_eq!(toks(&a), toks(&b));
    }
}
