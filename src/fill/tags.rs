//! Tag lexing and tag-tolerant matching over serialized markup.
//!
//! Matching never builds a regex from the target. The markup is walked once
//! by a small state machine (text / tag / quoted attribute / comment / CDATA)
//! into a stream of visible characters, each remembering the bytes it came
//! from. A token split over several runs is then just consecutive characters
//! in that stream.

use std::ops::Range;

use quick_xml::escape::unescape;
use serde::Deserialize;

use crate::docx::xml::escape_text;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    Open,
    Close,
    Empty,
    /// Comments, CDATA, processing instructions, declarations.
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Tag {
        range: Range<usize>,
        name: String,
        kind: TagKind,
    },
    Text {
        range: Range<usize>,
    },
}

impl Segment {
    pub fn range(&self) -> Range<usize> {
        match self {
            Segment::Tag { range, .. } | Segment::Text { range } => range.clone(),
        }
    }

    pub fn is_tag(&self, tag: &str, kinds: &[TagKind]) -> bool {
        matches!(self, Segment::Tag { name, kind, .. } if name == tag && kinds.contains(kind))
    }
}

/// Element names that carry visible text, runs and paragraphs.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkupDialect {
    pub text_elements: Vec<String>,
    pub run_element: String,
    pub paragraph_element: String,
    pub tab_elements: Vec<String>,
    pub break_elements: Vec<String>,
    /// Elements that close the body; trailing paragraphs are measured up to them.
    pub boundary_elements: Vec<String>,
    pub body_element: String,
}

impl Default for MarkupDialect {
    fn default() -> Self {
        Self {
            text_elements: vec!["w:t".to_string(), "a:t".to_string()],
            run_element: "w:r".to_string(),
            paragraph_element: "w:p".to_string(),
            tab_elements: vec!["w:tab".to_string(), "w:ptab".to_string()],
            break_elements: vec!["w:br".to_string(), "w:cr".to_string()],
            boundary_elements: vec!["w:sectPr".to_string()],
            body_element: "w:body".to_string(),
        }
    }
}

pub fn lex(markup: &str) -> Vec<Segment> {
    let bytes = markup.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            let end = markup[i..].find('<').map(|p| i + p).unwrap_or(bytes.len());
            out.push(Segment::Text { range: i..end });
            i = end;
            continue;
        }
        let rest = &markup[i..];
        let special = [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>")]
            .into_iter()
            .find(|(open, _)| rest.starts_with(open));
        if let Some((open, close)) = special {
            let end = rest[open.len()..]
                .find(close)
                .map(|p| i + open.len() + p + close.len())
                .unwrap_or(bytes.len());
            out.push(Segment::Tag {
                range: i..end,
                name: String::new(),
                kind: TagKind::Other,
            });
            i = end;
            continue;
        }
        let end = tag_end(bytes, i);
        out.push(classify_tag(markup, i..end));
        i = end;
    }
    out
}

/// End of a tag starting at `start`, honouring quoted attribute values.
fn tag_end(bytes: &[u8], start: usize) -> usize {
    let mut quote: Option<u8> = None;
    let mut j = start + 1;
    while j < bytes.len() {
        let b = bytes[j];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return j + 1,
            None => {}
        }
        j += 1;
    }
    bytes.len()
}

fn classify_tag(markup: &str, range: Range<usize>) -> Segment {
    let raw = &markup[range.clone()];
    if raw.starts_with("<!") {
        return Segment::Tag {
            range,
            name: String::new(),
            kind: TagKind::Other,
        };
    }
    let (kind, body) = if let Some(b) = raw.strip_prefix("</") {
        (TagKind::Close, b)
    } else if raw.ends_with("/>") {
        (TagKind::Empty, &raw[1..])
    } else {
        (TagKind::Open, &raw[1..])
    };
    let name: String = body
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
        .collect();
    Segment::Tag { range, name, kind }
}

/// One `&...;` reference, decoded the way quick-xml decodes text events.
fn decode_entity(reference: &str) -> Option<char> {
    let decoded = unescape(reference).ok()?;
    let mut chars = decoded.chars();
    let ch = chars.next()?;
    chars.next().is_none().then_some(ch)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibleChar {
    pub ch: char,
    /// Markup bytes this char was decoded from.
    pub range: Range<usize>,
    pub para: usize,
    pub node: usize,
    /// Stands for an empty element such as a tab, not for character data.
    pub synthetic: bool,
}

/// A run of character data inside a text element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextNode {
    pub range: Range<usize>,
    /// The text element's start tag, when the node is real character data.
    pub open_tag: Option<Range<usize>>,
    pub preserves_space: bool,
}

#[derive(Clone, Debug, Default)]
pub struct VisibleText {
    pub chars: Vec<VisibleChar>,
    pub nodes: Vec<TextNode>,
}

impl VisibleText {
    pub fn build(markup: &str, dialect: &MarkupDialect) -> Self {
        let mut out = VisibleText::default();
        let mut para = 0usize;
        let mut run_depth = 0usize;
        let mut text_open: Vec<Range<usize>> = Vec::new();

        for seg in lex(markup) {
            match seg {
                Segment::Tag { range, name, kind } => {
                    if name == dialect.paragraph_element && kind != TagKind::Other {
                        para += 1;
                    }
                    let is_text = dialect.text_elements.iter().any(|t| *t == name);
                    match kind {
                        TagKind::Open if is_text => text_open.push(range),
                        TagKind::Close if is_text => {
                            text_open.pop();
                        }
                        TagKind::Open if name == dialect.run_element => run_depth += 1,
                        TagKind::Close if name == dialect.run_element => {
                            run_depth = run_depth.saturating_sub(1)
                        }
                        TagKind::Empty if run_depth > 0 => {
                            let raw = &markup[range.clone()];
                            let ch = if dialect.tab_elements.iter().any(|t| *t == name) {
                                Some('\t')
                            } else if dialect.break_elements.iter().any(|t| *t == name)
                                && (!raw.contains("w:type=") || raw.contains("textWrapping"))
                            {
                                Some('\n')
                            } else {
                                None
                            };
                            if let Some(ch) = ch {
                                out.nodes.push(TextNode {
                                    range: range.clone(),
                                    open_tag: None,
                                    preserves_space: true,
                                });
                                out.chars.push(VisibleChar {
                                    ch,
                                    range,
                                    para,
                                    node: out.nodes.len() - 1,
                                    synthetic: true,
                                });
                            }
                        }
                        _ => {}
                    }
                }
                Segment::Text { range } => {
                    let Some(open) = text_open.last() else {
                        continue;
                    };
                    let preserves_space = markup[open.clone()].contains("xml:space");
                    out.nodes.push(TextNode {
                        range: range.clone(),
                        open_tag: Some(open.clone()),
                        preserves_space,
                    });
                    let node = out.nodes.len() - 1;
                    push_decoded(&mut out.chars, markup, range, para, node);
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn text(&self) -> String {
        self.chars.iter().map(|c| c.ch).collect()
    }

    /// Index of the char starting exactly at markup byte `at`.
    pub fn index_at(&self, at: usize) -> Option<usize> {
        self.chars
            .binary_search_by_key(&at, |c| c.range.start)
            .ok()
    }

    /// Up to `max_chars` visible chars before char `idx`, paragraphs on their own lines.
    pub fn window_before(&self, idx: usize, max_chars: usize) -> String {
        let idx = idx.min(self.chars.len());
        let from = idx.saturating_sub(max_chars);
        let mut out = String::new();
        let mut last_para: Option<usize> = None;
        for c in &self.chars[from..idx] {
            if last_para.is_some_and(|p| p != c.para) {
                out.push('\n');
            }
            last_para = Some(c.para);
            out.push(c.ch);
        }
        if let (Some(p), Some(cur)) = (last_para, self.chars.get(idx)) {
            if p != cur.para {
                out.push('\n');
            }
        }
        out
    }

    /// Only spaces and tabs follow char `idx` up to the end of its paragraph or line.
    pub fn ends_line_after(&self, idx: usize) -> bool {
        let Some(para) = self.chars.get(idx).map(|c| c.para) else {
            return false;
        };
        for c in self.chars[idx + 1..].iter().take_while(|c| c.para == para) {
            match c.ch {
                '\n' => return true,
                ' ' | '\t' => {}
                _ => return false,
            }
        }
        true
    }

    /// All visible text with paragraphs on their own lines, plus the byte
    /// offset of each visible char within it.
    pub fn document_text(&self) -> (String, Vec<usize>) {
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(self.chars.len());
        let mut last_para: Option<usize> = None;
        for c in &self.chars {
            if last_para.is_some_and(|p| p != c.para) {
                text.push('\n');
            }
            last_para = Some(c.para);
            offsets.push(text.len());
            text.push(c.ch);
        }
        (text, offsets)
    }

    /// The char before `idx` in the same paragraph is not part of a word.
    pub fn starts_word_at(&self, idx: usize) -> bool {
        if idx == 0 {
            return true;
        }
        let (prev, cur) = (&self.chars[idx - 1], &self.chars[idx]);
        prev.para != cur.para || !(prev.ch.is_alphanumeric() || prev.ch == '_')
    }
}

fn push_decoded(chars: &mut Vec<VisibleChar>, markup: &str, range: Range<usize>, para: usize, node: usize) {
    let text = &markup[range.clone()];
    let mut iter = text.char_indices().peekable();
    while let Some((i, ch)) = iter.next() {
        let start = range.start + i;
        if ch == '&' {
            if let Some(semi) = text[i..].find(';').filter(|p| *p <= 10) {
                if let Some(decoded) = decode_entity(&text[i..=i + semi]) {
                    chars.push(VisibleChar {
                        ch: decoded,
                        range: start..start + semi + 1,
                        para,
                        node,
                        synthetic: false,
                    });
                    while iter.peek().is_some_and(|(j, _)| *j <= i + semi) {
                        iter.next();
                    }
                    continue;
                }
            }
        }
        chars.push(VisibleChar {
            ch,
            range: start..start + ch.len_utf8(),
            para,
            node,
            synthetic: false,
        });
    }
}

/// One place a target string occupies in the markup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSite {
    /// Visible char indices, first and one past last.
    pub chars: Range<usize>,
}

impl TokenSite {
    pub fn start_byte(&self, visible: &VisibleText) -> usize {
        visible.chars[self.chars.start].range.start
    }
}

/// Single-run matches of the escaped target, the common case.
pub fn find_exact(markup: &str, visible: &VisibleText, target: &str) -> Vec<TokenSite> {
    if target.is_empty() {
        return Vec::new();
    }
    let escaped = escape_text(target);
    let mut out = Vec::new();
    for (at, m) in markup.match_indices(escaped.as_str()) {
        let Some(first) = visible.index_at(at) else {
            continue;
        };
        let count = target.chars().count();
        let last = first + count - 1;
        let Some(last_char) = visible.chars.get(last) else {
            continue;
        };
        if last_char.range.end != at + m.len() || last_char.node != visible.chars[first].node {
            continue;
        }
        out.push(TokenSite {
            chars: first..last + 1,
        });
    }
    out
}

/// Matches that may span any number of tags, but never a paragraph break.
pub fn find_tolerant(visible: &VisibleText, target: &str) -> Vec<TokenSite> {
    let want: Vec<char> = target.chars().collect();
    let mut out = Vec::new();
    let Some(&head) = want.first() else {
        return out;
    };
    let chars = &visible.chars;
    let mut i = 0usize;
    while i + want.len() <= chars.len() {
        if chars[i].ch != head {
            i += 1;
            continue;
        }
        let para = chars[i].para;
        let hit = want
            .iter()
            .zip(&chars[i..i + want.len()])
            .all(|(w, c)| *w == c.ch && c.para == para);
        if hit {
            out.push(TokenSite {
                chars: i..i + want.len(),
            });
            i += want.len();
        } else {
            i += 1;
        }
    }
    out
}

/// Exact single-run sites plus tolerant ones, deduplicated by start.
pub fn find_sites(markup: &str, visible: &VisibleText, target: &str) -> Vec<TokenSite> {
    let mut sites = find_exact(markup, visible, target);
    for site in find_tolerant(visible, target) {
        let overlaps = sites
            .iter()
            .any(|s| s.chars.start < site.chars.end && site.chars.start < s.chars.end);
        if !overlaps {
            sites.push(site);
        }
    }
    sites.sort_by_key(|s| s.chars.start);
    sites
}
