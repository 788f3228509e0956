//! Plain-text rendering, used for the on-screen preview.

use std::ops::Range;

use log::{debug, warn};

use super::values::ResolvedValues;
use crate::placeholder::context::{ContextResolver, ContextWindows};
use crate::placeholder::patterns::find_labels;
use crate::placeholder::{Catalog, LabelField, PlaceholderDescriptor};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Edit {
    range: Range<usize>,
    replacement: String,
}

/// Substitute every resolved value into `text`.
///
/// `text` should be the snapshot the catalog was scanned from. If it is not,
/// tokens are located by search instead of by recorded offset.
pub fn render_text(text: &str, catalog: &Catalog, values: &ResolvedValues) -> String {
    if catalog.matches_text(text) {
        render_at_offsets(text, catalog, values)
    } else {
        warn!("text differs from the scanned snapshot; locating placeholders by search");
        render_by_search(text, catalog, values)
    }
}

fn render_at_offsets(text: &str, catalog: &Catalog, values: &ResolvedValues) -> String {
    let mut edits: Vec<Edit> = Vec::new();
    for (_, desc) in catalog.iter() {
        let Some(value) = values.value_of(&desc.key) else {
            continue;
        };
        if desc.is_label() {
            if let Some(edit) = desc.offset.and_then(|at| label_edit(text, at, desc, value)) {
                edits.push(edit);
            }
            continue;
        }
        for &at in &desc.occurrences {
            let end = at + desc.original_token.len();
            if text.get(at..end) == Some(desc.original_token.as_str()) {
                edits.push(Edit {
                    range: at..end,
                    replacement: value.to_string(),
                });
            }
        }
    }
    apply_edits(text, edits)
}

/// Insert ` value` after the label, replacing the blank padding up to line end.
fn label_edit(text: &str, at: usize, desc: &PlaceholderDescriptor, value: &str) -> Option<Edit> {
    let end = at + desc.original_token.len();
    if text.get(at..end) != Some(desc.original_token.as_str()) {
        return None;
    }
    let pad = text[end..]
        .char_indices()
        .find(|(_, c)| *c != ' ' && *c != '\t')
        .map(|(i, _)| i)
        .unwrap_or(text.len() - end);
    Some(Edit {
        range: end..end + pad,
        replacement: format!(" {value}"),
    })
}

/// Apply non-overlapping edits back to front so earlier offsets stay valid.
fn apply_edits(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    let mut out = text.to_string();
    let mut floor = usize::MAX;
    for edit in edits {
        if edit.range.end > floor {
            debug!("skipping overlapping edit at {}", edit.range.start);
            continue;
        }
        out.replace_range(edit.range.clone(), &edit.replacement);
        floor = edit.range.start;
    }
    out
}

fn render_by_search(text: &str, catalog: &Catalog, values: &ResolvedValues) -> String {
    let mut out = text.to_string();

    for (_, desc) in catalog.iter().filter(|(_, d)| !d.is_label()) {
        let Some(value) = values.value_of(&desc.key) else {
            continue;
        };
        for _ in 0..desc.occurrences.len().max(1) {
            match out.find(&desc.original_token) {
                Some(at) => out.replace_range(at..at + desc.original_token.len(), value),
                None => break,
            }
        }
    }

    let mut labels: Vec<&PlaceholderDescriptor> =
        catalog.iter().map(|(_, d)| d).filter(|d| d.is_label()).collect();
    labels.sort_by_key(|d| std::cmp::Reverse(d.offset));
    for desc in labels {
        let Some(value) = values.value_of(&desc.key) else {
            continue;
        };
        let at = locate_label(&out, desc).or_else(|| out.find(&desc.original_token));
        match at.and_then(|at| label_edit(&out, at, desc, value)) {
            Some(edit) => out = apply_edits(&out, vec![edit]),
            None => warn!("no site for {} ({})", desc.key, desc.original_token),
        }
    }
    out
}

/// Unfilled label of the same field and party, nearest the recorded offset.
fn locate_label(text: &str, desc: &PlaceholderDescriptor) -> Option<usize> {
    let field = LabelField::ALL
        .into_iter()
        .find(|f| f.token() == desc.original_token)?;
    let resolver = ContextResolver::new(text, ContextWindows::default());
    let target = desc.offset.unwrap_or(0);
    find_labels(text)
        .into_iter()
        .filter(|(f, _)| *f == field)
        .map(|(_, span)| span.start)
        .filter(|at| resolver.resolve(text, *at) == desc.party)
        .min_by_key(|at| at.abs_diff(target))
}
