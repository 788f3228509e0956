//! Writes resolved values back into the document markup.
//!
//! All sites are planned against the original markup, label sites first,
//! then literal tokens longest first. A set of visited visible chars keeps a
//! physical occurrence from being claimed twice. Edits are applied back to
//! front so planned byte offsets never shift.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use anyhow::Context;
use log::{debug, warn};
use serde::Serialize;

use super::tags::{find_sites, lex, MarkupDialect, Segment, TagKind, TokenSite, VisibleText};
use super::values::ResolvedValues;
use crate::docx::xml::{check_well_formed, escape_text};
use crate::placeholder::context::{ContextResolver, ContextWindows};
use crate::placeholder::patterns::nearest_party_word;
use crate::placeholder::{Catalog, LabelField, Party, PlaceholderDescriptor};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkupSettings {
    pub dialect: MarkupDialect,
    /// Visible chars before a shared `[name]`-style token searched for a party word.
    pub signature_window: usize,
    pub context: ContextWindows,
    pub strip_trailing_empty_paragraphs: bool,
}

impl Default for MarkupSettings {
    fn default() -> Self {
        Self {
            dialect: MarkupDialect::default(),
            signature_window: 1000,
            context: ContextWindows::default(),
            strip_trailing_empty_paragraphs: true,
        }
    }
}

/// Where values landed. Keys with a value but no site are listed in `unmatched`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FillReport {
    pub sites: BTreeMap<String, usize>,
    pub unmatched: Vec<String>,
}

impl FillReport {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct MarkupFill {
    pub bytes: Vec<u8>,
    pub report: FillReport,
}

#[derive(Clone, Debug)]
struct Edit {
    range: Range<usize>,
    replacement: String,
}

struct Planner<'a> {
    markup: &'a str,
    visible: VisibleText,
    /// Visible text as one string, and each visible char's byte offset in it.
    doc_text: String,
    doc_offsets: Vec<usize>,
    resolver: ContextResolver,
    settings: &'a MarkupSettings,
    visited: HashSet<usize>,
    edits: Vec<Edit>,
    preserve_nodes: HashSet<usize>,
    sites: BTreeMap<String, usize>,
}

impl<'a> Planner<'a> {
    fn new(markup: &'a str, settings: &'a MarkupSettings) -> Self {
        let visible = VisibleText::build(markup, &settings.dialect);
        let (doc_text, doc_offsets) = visible.document_text();
        let resolver = ContextResolver::new(&doc_text, settings.context);
        Self {
            markup,
            visible,
            doc_text,
            doc_offsets,
            resolver,
            settings,
            visited: HashSet::new(),
            edits: Vec::new(),
            preserve_nodes: HashSet::new(),
            sites: BTreeMap::new(),
        }
    }

    fn is_free(&self, site: &TokenSite) -> bool {
        site.chars.clone().all(|i| !self.visited.contains(&i))
    }

    fn claim(&mut self, site: &TokenSite) {
        self.visited.extend(site.chars.clone());
    }

    fn count(&mut self, key: &str) {
        *self.sites.entry(key.to_string()).or_default() += 1;
    }

    /// Party of the label at char `idx`, from the markers in the visible text.
    fn party_at(&self, idx: usize) -> Option<Party> {
        let at = self.doc_offsets.get(idx).copied()?;
        self.resolver.resolve(&self.doc_text, at)
    }

    fn party_word_before(&self, idx: usize) -> Option<Party> {
        nearest_party_word(&self.visible.window_before(idx, self.settings.signature_window))
    }

    fn insert_after(&mut self, idx: usize, value: &str) {
        let ch = &self.visible.chars[idx];
        let at = ch.range.end;
        self.preserve_nodes.insert(ch.node);
        self.edits.push(Edit {
            range: at..at,
            replacement: escape_text(&format!(" {value}")),
        });
    }

    /// Value goes into the first real text piece; the other pieces are emptied.
    fn replace_site(&mut self, site: &TokenSite, value: &str) {
        let mut pieces: Vec<(usize, Range<usize>, bool)> = Vec::new();
        for ch in &self.visible.chars[site.chars.clone()] {
            match pieces.last_mut() {
                Some((node, range, _)) if *node == ch.node => range.end = ch.range.end,
                _ => pieces.push((ch.node, ch.range.clone(), ch.synthetic)),
            }
        }
        let target = pieces.iter().position(|(_, _, synthetic)| !synthetic).unwrap_or(0);
        for (i, (node, range, synthetic)) in pieces.into_iter().enumerate() {
            if !synthetic {
                self.preserve_nodes.insert(node);
            }
            let replacement = if i == target {
                escape_text(value)
            } else {
                String::new()
            };
            self.edits.push(Edit { range, replacement });
        }
    }

    fn plan_labels(&mut self, catalog: &Catalog, values: &ResolvedValues) {
        let labels: Vec<&PlaceholderDescriptor> =
            catalog.iter().map(|(_, d)| d).filter(|d| d.is_label()).collect();
        for field in LabelField::ALL {
            let mut ordinal: Vec<&PlaceholderDescriptor> = labels
                .iter()
                .copied()
                .filter(|d| d.original_token == field.token())
                .collect();
            if ordinal.is_empty() {
                continue;
            }
            ordinal.sort_by_key(|d| d.offset);

            let sites: Vec<TokenSite> = find_sites(self.markup, &self.visible, field.token())
                .into_iter()
                .filter(|s| {
                    self.visible.starts_word_at(s.chars.start)
                        && self.visible.ends_line_after(s.chars.end - 1)
                })
                .collect();
            let aligned = sites.len() == ordinal.len();

            for (k, site) in sites.iter().enumerate().rev() {
                if !self.is_free(site) {
                    continue;
                }
                let party = self
                    .party_at(site.chars.start)
                    .or_else(|| if aligned { ordinal[k].party } else { None });
                let Some(party) = party else {
                    debug!("{} at byte {}: no party in markup", field.token(), site.start_byte(&self.visible));
                    continue;
                };
                self.claim(site);
                let key = field.key(party);
                if !ordinal.iter().any(|d| d.key == key) {
                    continue;
                }
                let Some(value) = values.value_of(key) else {
                    continue;
                };
                self.insert_after(site.chars.end - 1, value);
                self.count(key);
            }
        }
    }

    fn plan_literals(&mut self, catalog: &Catalog, values: &ResolvedValues) {
        let mut groups: BTreeMap<&str, Vec<&PlaceholderDescriptor>> = BTreeMap::new();
        for (_, d) in catalog.iter().filter(|(_, d)| !d.is_label()) {
            groups.entry(d.original_token.as_str()).or_default().push(d);
        }
        let mut tokens: Vec<&str> = groups.keys().copied().collect();
        // `$[Amount]` before `[Amount]`, `{{X}}` before `{X}`
        tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

        for token in tokens {
            let descs = &groups[token];
            let sites: Vec<TokenSite> = find_sites(self.markup, &self.visible, token)
                .into_iter()
                .filter(|s| self.is_free(s))
                .collect();
            let mut occurrences: Vec<(usize, &PlaceholderDescriptor)> = descs
                .iter()
                .flat_map(|d| d.occurrences.iter().map(move |at| (*at, *d)))
                .collect();
            occurrences.sort_by_key(|(at, _)| *at);
            let aligned = sites.len() == occurrences.len();
            let single_key = descs.iter().all(|d| d.key == descs[0].key);

            for (k, site) in sites.iter().enumerate() {
                let desc = if single_key {
                    descs[0]
                } else if aligned {
                    occurrences[k].1
                } else {
                    self.pick_by_context(site, descs, &occurrences, k)
                };
                self.claim(site);
                let Some(value) = values.value_of(&desc.key) else {
                    continue;
                };
                self.replace_site(site, value);
                self.count(&desc.key);
            }
        }
    }

    fn pick_by_context<'d>(
        &self,
        site: &TokenSite,
        descs: &[&'d PlaceholderDescriptor],
        occurrences: &[(usize, &'d PlaceholderDescriptor)],
        k: usize,
    ) -> &'d PlaceholderDescriptor {
        if descs.iter().any(|d| d.party.is_some()) {
            if let Some(party) = self.party_word_before(site.chars.start) {
                if let Some(d) = descs.iter().find(|d| d.party == Some(party)) {
                    return *d;
                }
            }
        }
        let idx = k.min(occurrences.len().saturating_sub(1));
        occurrences.get(idx).map(|(_, d)| *d).unwrap_or(descs[0])
    }

    fn finish(mut self) -> (String, BTreeMap<String, usize>) {
        for node in &self.preserve_nodes {
            let Some(node) = self.visible.nodes.get(*node) else {
                continue;
            };
            let Some(open) = node.open_tag.clone() else {
                continue;
            };
            if node.preserves_space || self.markup[open.clone()].ends_with("/>") {
                continue;
            }
            let at = open.end - 1;
            self.edits.push(Edit {
                range: at..at,
                replacement: " xml:space=\"preserve\"".to_string(),
            });
        }
        (apply_edits(self.markup, self.edits), self.sites)
    }
}

fn apply_edits(markup: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| {
        b.range
            .start
            .cmp(&a.range.start)
            .then(b.range.end.cmp(&a.range.end))
    });
    let mut out = markup.to_string();
    let mut floor = usize::MAX;
    for edit in edits {
        if edit.range.end > floor {
            debug!("skipping overlapping markup edit at {}", edit.range.start);
            continue;
        }
        out.replace_range(edit.range.clone(), &edit.replacement);
        floor = edit.range.start;
    }
    out
}

/// Substitute every resolved value into the original markup.
///
/// Values with no site are skipped and reported; the result is always
/// checked to be well-formed.
pub fn replace_in_markup(
    markup: &[u8],
    catalog: &Catalog,
    values: &ResolvedValues,
    settings: &MarkupSettings,
) -> anyhow::Result<MarkupFill> {
    let markup = std::str::from_utf8(markup).context("markup is not utf-8")?;
    let mut planner = Planner::new(markup, settings);
    planner.plan_labels(catalog, values);
    planner.plan_literals(catalog, values);
    let (mut out, sites) = planner.finish();

    if settings.strip_trailing_empty_paragraphs {
        out = strip_trailing_empty_paragraphs(&out, &settings.dialect);
    }
    check_well_formed("filled markup", out.as_bytes())?;

    let mut unmatched = Vec::new();
    for v in values.iter() {
        if !sites.contains_key(&v.key) {
            warn!("no markup site for {:?}; value not inserted", v.key);
            unmatched.push(v.key.clone());
        }
    }
    Ok(MarkupFill {
        bytes: out.into_bytes(),
        report: FillReport { sites, unmatched },
    })
}

const PROPERTY_ELEMENTS: [&str; 2] = ["w:pPr", "w:rPr"];
const EMPTY_PARAGRAPH_PARTS: [&str; 5] = [
    "w:bookmarkStart",
    "w:bookmarkEnd",
    "w:proofErr",
    "w:lastRenderedPageBreak",
    "w:softHyphen",
];

fn prev_significant(markup: &str, segs: &[Segment], before: usize) -> Option<usize> {
    segs[..before].iter().rposition(|s| match s {
        Segment::Text { range } => !markup[range.clone()].trim().is_empty(),
        Segment::Tag { .. } => true,
    })
}

fn matching_open(segs: &[Segment], close: usize) -> Option<usize> {
    let Segment::Tag { name: target, .. } = &segs[close] else {
        return None;
    };
    let mut depth = 0usize;
    for i in (0..close).rev() {
        if let Segment::Tag { name, kind, .. } = &segs[i] {
            if name != target {
                continue;
            }
            match kind {
                TagKind::Close => depth += 1,
                TagKind::Open if depth == 0 => return Some(i),
                TagKind::Open => depth -= 1,
                _ => {}
            }
        }
    }
    None
}

fn is_empty_paragraph(markup: &str, segs: &[Segment], dialect: &MarkupDialect) -> bool {
    let mut props_depth = 0usize;
    let mut text_depth = 0usize;
    for seg in segs {
        match seg {
            Segment::Text { range } => {
                if text_depth > 0 && !markup[range.clone()].trim().is_empty() {
                    return false;
                }
            }
            Segment::Tag { name, kind, .. } => {
                if dialect.boundary_elements.iter().any(|b| b == name) {
                    return false;
                }
                if props_depth > 0 {
                    match kind {
                        TagKind::Open => props_depth += 1,
                        TagKind::Close => props_depth -= 1,
                        _ => {}
                    }
                    continue;
                }
                if *kind == TagKind::Other
                    || *name == dialect.paragraph_element
                    || *name == dialect.run_element
                    || EMPTY_PARAGRAPH_PARTS.contains(&name.as_str())
                {
                    continue;
                }
                if PROPERTY_ELEMENTS.contains(&name.as_str()) {
                    if *kind == TagKind::Open {
                        props_depth = 1;
                    }
                    continue;
                }
                if dialect.text_elements.iter().any(|t| t == name) {
                    match kind {
                        TagKind::Open => text_depth += 1,
                        TagKind::Close => text_depth = text_depth.saturating_sub(1),
                        _ => {}
                    }
                    continue;
                }
                return false;
            }
        }
    }
    true
}

/// Drop paragraphs with no visible text that sit right before the body's end.
///
/// Paragraphs holding drawings, breaks or section properties are kept, and so
/// is a paragraph whose preceding sibling is not itself a paragraph.
pub fn strip_trailing_empty_paragraphs(markup: &str, dialect: &MarkupDialect) -> String {
    let segs = lex(markup);
    let Some(body_close) = segs
        .iter()
        .rposition(|s| s.is_tag(&dialect.body_element, &[TagKind::Close]))
    else {
        return markup.to_string();
    };

    let mut cursor = body_close;
    while let Some(prev) = prev_significant(markup, &segs, cursor) {
        match &segs[prev] {
            Segment::Tag { name, kind: TagKind::Close, .. }
                if dialect.boundary_elements.iter().any(|b| b == name) =>
            {
                match matching_open(&segs, prev) {
                    Some(open) => cursor = open,
                    None => return markup.to_string(),
                }
            }
            Segment::Tag { name, kind: TagKind::Empty, .. }
                if dialect.boundary_elements.iter().any(|b| b == name) =>
            {
                cursor = prev
            }
            _ => break,
        }
    }

    let is_paragraph_end = |seg: &Segment| seg.is_tag(&dialect.paragraph_element, &[TagKind::Close, TagKind::Empty]);
    let mut removals: Vec<Range<usize>> = Vec::new();
    while let Some(end) = prev_significant(markup, &segs, cursor) {
        if !is_paragraph_end(&segs[end]) {
            break;
        }
        let start = if segs[end].is_tag(&dialect.paragraph_element, &[TagKind::Empty]) {
            end
        } else {
            match matching_open(&segs, end) {
                Some(open) => open,
                None => break,
            }
        };
        if !is_empty_paragraph(markup, &segs[start..=end], dialect) {
            break;
        }
        let sibling_is_paragraph = prev_significant(markup, &segs, start)
            .map(|i| is_paragraph_end(&segs[i]))
            .unwrap_or(false);
        if !sibling_is_paragraph {
            break;
        }
        removals.push(segs[start].range().start..segs[end].range().end);
        cursor = start;
    }

    if removals.is_empty() {
        return markup.to_string();
    }
    debug!("stripping {} trailing empty paragraph(s)", removals.len());
    let mut out = markup.to_string();
    for range in removals {
        out.replace_range(range, "");
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::docx::text::plain_text_from_xml;
    use crate::placeholder::scan;

    fn para(runs: &[&str]) -> String {
        let runs: String = runs
            .iter()
            .map(|t| format!(r#"<w:r><w:t xml:space="preserve">{t}</w:t></w:r>"#))
            .collect();
        format!("<w:p>{runs}</w:p>")
    }

    fn doc(paras: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="urn:w"><w:body>{}<w:sectPr><w:pgSz w:w="12240"/></w:sectPr></w:body></w:document>"#,
            paras.concat()
        )
    }

    fn fill(markup: &str, answers: &[(&str, &str)]) -> (String, FillReport) {
        let text = plain_text_from_xml(markup.as_bytes()).expect("text");
        let cat = scan(&text);
        let mut values = ResolvedValues::new();
        for (k, v) in answers {
            values.resolve_key(&cat, k, v);
        }
        let filled = replace_in_markup(markup.as_bytes(), &cat, &values, &MarkupSettings::default())
            .expect("fill");
        (String::from_utf8(filled.bytes).expect("utf8"), filled.report)
    }

    fn visible(markup: &str) -> String {
        plain_text_from_xml(markup.as_bytes()).expect("text")
    }

    #[test]
    fn token_split_over_three_runs() {
        let markup = doc(&[para(&["Pay [Purch", "ase Amo", "unt] now."])]);
        let (out, report) = fill(&markup, &[("Purchase Amount", "100k")]);
        assert_eq!(visible(&out), "Pay $100,000 now.");
        assert!(!out.contains("Purch") && !out.contains("ase Amo") && !out.contains("unt]"));
        assert_eq!(report.sites.get("Purchase Amount"), Some(&1));
        assert!(report.is_complete());
    }

    #[test]
    fn labels_follow_party_markers() {
        let markup = doc(&[
            para(&["COMPANY:"]),
            para(&["Address", ":"]),
            para(&["INVESTOR:"]),
            para(&["Address:"]),
        ]);
        let (out, _) = fill(
            &markup,
            &[("Company Address", "1 Main St"), ("Investor Address", "2 Side Rd")],
        );
        assert_eq!(
            visible(&out),
            "COMPANY:\nAddress: 1 Main St\nINVESTOR:\nAddress: 2 Side Rd"
        );
    }

    #[test]
    fn stray_label_does_not_block_document_level_party() {
        let filler = "lorem ipsum ".repeat(300);
        let markup = doc(&[
            para(&["COMPANY:"]),
            para(&["INVESTOR:"]),
            para(&[filler.as_str()]),
            para(&["Email:"]),
            para(&["Email:\u{a0}"]),
        ]);
        let (out, report) = fill(&markup, &[("Investor Email", "jane@doe.vc")]);
        assert_eq!(report.sites.get("Investor Email"), Some(&1));
        assert!(report.is_complete());
        assert!(visible(&out).ends_with("\nEmail: jane@doe.vc\nEmail:\u{a0}"));
    }

    #[test]
    fn label_party_falls_back_to_catalog_ordinal() {
        let cat = scan("INVESTOR:\nEmail:");
        let mut values = ResolvedValues::new();
        values.resolve_key(&cat, "Investor Email", "jane@doe.vc");
        let markup = doc(&[para(&["Email:"])]);
        let filled = replace_in_markup(markup.as_bytes(), &cat, &values, &MarkupSettings::default())
            .expect("fill");
        assert_eq!(filled.report.sites.get("Investor Email"), Some(&1));
        assert_eq!(visible(&String::from_utf8(filled.bytes).expect("utf8")), "Email: jane@doe.vc");
    }

    #[test]
    fn label_dropped_in_text_stays_unfilled() {
        let filler = "lorem ipsum ".repeat(300);
        let markup = doc(&[
            para(&["COMPANY:"]),
            para(&["Email:"]),
            para(&[filler.as_str()]),
            para(&["Email:"]),
        ]);
        let text = visible(&markup);
        let cat = scan(&text);
        let emails: Vec<_> = cat.iter().filter(|(_, d)| d.is_label()).map(|(_, d)| d.key.as_str()).collect();
        assert_eq!(emails, vec!["Company Email"]);

        let (out, report) = fill(&markup, &[("Company Email", "ann@acme.co")]);
        assert_eq!(report.sites.get("Company Email"), Some(&1));
        assert_eq!(
            visible(&out),
            format!("COMPANY:\nEmail: ann@acme.co\n{filler}\nEmail:")
        );
    }

    #[test]
    fn values_are_escaped() {
        let markup = doc(&[para(&["Buyer: [Buyer]"])]);
        let (out, _) = fill(&markup, &[("Buyer", "Smith & Sons <LLC>")]);
        assert!(out.contains("Smith &amp; Sons &lt;LLC&gt;"));
        assert_eq!(visible(&out), "Buyer: Smith & Sons <LLC>");
    }

    #[test]
    fn shared_tokens_align_with_text_occurrences() {
        let markup = doc(&[
            para(&["COMPANY:"]),
            para(&["By: ____"]),
            para(&["[na", "me]"]),
            para(&["INVESTOR:"]),
            para(&["By: ____"]),
            para(&["[name]"]),
        ]);
        let (out, report) = fill(&markup, &[("Company Name Field", "Ann"), ("Investor Name", "Bob")]);
        assert_eq!(
            visible(&out),
            "COMPANY:\nBy: ____\nAnn\nINVESTOR:\nBy: ____\nBob"
        );
        assert_eq!(report.sites.get("Investor Name"), Some(&1));
    }

    #[test]
    fn nested_token_is_visited_once() {
        let markup = doc(&[para(&["{{Client}} and {Client}"])]);
        let (out, report) = fill(&markup, &[("Client", "Acme")]);
        assert_eq!(visible(&out), "Acme and Acme");
        assert_eq!(report.sites.get("Client"), Some(&2));
    }

    #[test]
    fn missing_site_is_reported_not_fatal() {
        let markup = doc(&[para(&["nothing to fill"])]);
        let cat = scan("[Ghost]");
        let mut values = ResolvedValues::new();
        values.resolve_key(&cat, "Ghost", "boo");
        let filled = replace_in_markup(markup.as_bytes(), &cat, &values, &MarkupSettings::default())
            .expect("fill");
        assert_eq!(filled.report.unmatched, vec!["Ghost".to_string()]);
        assert_eq!(String::from_utf8(filled.bytes).expect("utf8"), markup);
    }

    #[test]
    fn trailing_empty_paragraphs_are_stripped() {
        let markup = doc(&[
            para(&["Body"]),
            "<w:p><w:pPr><w:jc w:val=\"left\"/></w:pPr></w:p>".to_string(),
            para(&["  "]),
            "<w:p/>".to_string(),
        ]);
        let out = strip_trailing_empty_paragraphs(&markup, &MarkupDialect::default());
        assert_eq!(out, doc(&[para(&["Body"])]));
    }

    #[test]
    fn trailing_drawing_paragraph_is_kept() {
        let drawing = "<w:p><w:r><w:drawing/></w:r></w:p>".to_string();
        let markup = doc(&[para(&["Body"]), drawing.clone(), "<w:p/>".to_string()]);
        let out = strip_trailing_empty_paragraphs(&markup, &MarkupDialect::default());
        assert_eq!(out, doc(&[para(&["Body"]), drawing]));
    }

    #[test]
    fn lone_paragraph_is_kept() {
        let markup = doc(&["<w:p/>".to_string()]);
        assert_eq!(strip_trailing_empty_paragraphs(&markup, &MarkupDialect::default()), markup);
    }

    #[test]
    fn leading_space_left_behind_gets_preserved() {
        let markup = r#"<w:body><w:p><w:r><w:t>[Cli</w:t></w:r><w:r><w:t>ent] rest</w:t></w:r></w:p></w:body>"#;
        let (out, _) = fill(markup, &[("Client", "Zed")]);
        assert_eq!(
            out,
            r#"<w:body><w:p><w:r><w:t xml:space="preserve">Zed</w:t></w:r><w:r><w:t xml:space="preserve"> rest</w:t></w:r></w:p></w:body>"#
        );
    }
}
