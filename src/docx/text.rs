//! Plain text of the main document part and the write-back step.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::package::DocxPackage;
use super::xml::{parse_xml_events, XmlEvent};
use crate::fill::tags::MarkupDialect;

pub struct DecodedDocument {
    pub package: DocxPackage,
    pub part_name: String,
    pub markup: Vec<u8>,
    pub text: String,
}

pub fn decode_docx(path: &Path) -> anyhow::Result<DecodedDocument> {
    decode_docx_with(path, &MarkupDialect::default())
}

pub fn decode_docx_with(path: &Path, dialect: &MarkupDialect) -> anyhow::Result<DecodedDocument> {
    let package = DocxPackage::read(path)?;
    let (part_name, markup) = package.main_part().map(|(name, data)| (name, data.to_vec()))?;
    let text = plain_text_with(&markup, dialect)
        .with_context(|| format!("extract text from {part_name}"))?;
    Ok(DecodedDocument {
        package,
        part_name,
        markup,
        text,
    })
}

/// Write `package` to `output` with `part_name` replaced by `bytes`.
pub fn encode_docx(
    package: &DocxPackage,
    part_name: &str,
    bytes: Vec<u8>,
    output: &Path,
) -> anyhow::Result<()> {
    let replacements = HashMap::from([(part_name.to_string(), bytes)]);
    package.write_with_replacements(output, &replacements)
}

pub fn default_output_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}_filled.docx"))
}

pub fn plain_text_from_xml(xml: &[u8]) -> anyhow::Result<String> {
    plain_text_with(xml, &MarkupDialect::default())
}

/// One line per paragraph. Tabs and text-wrapping breaks inside runs become
/// `\t` and `\n`; page and column breaks are dropped.
pub fn plain_text_with(xml: &[u8], dialect: &MarkupDialect) -> anyhow::Result<String> {
    let events = parse_xml_events("document", xml)?;

    let mut out = String::new();
    let mut paragraphs = 0usize;
    let mut run_depth = 0usize;
    let mut text_depth = 0usize;
    for ev in &events {
        match ev {
            XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. }
                if *name == dialect.paragraph_element =>
            {
                if paragraphs > 0 {
                    out.push('\n');
                }
                paragraphs += 1;
            }
            XmlEvent::Start { name, .. } if *name == dialect.run_element => run_depth += 1,
            XmlEvent::End { name } if *name == dialect.run_element => {
                run_depth = run_depth.saturating_sub(1)
            }
            XmlEvent::Start { name, .. } if is_one_of(&dialect.text_elements, name) => {
                text_depth += 1
            }
            XmlEvent::End { name } if is_one_of(&dialect.text_elements, name) => {
                text_depth = text_depth.saturating_sub(1)
            }
            XmlEvent::Empty { name, attrs } if run_depth > 0 => {
                if is_one_of(&dialect.tab_elements, name) {
                    out.push('\t');
                } else if is_one_of(&dialect.break_elements, name) {
                    let kind = attrs.iter().find(|(k, _)| k == "w:type").map(|(_, v)| v.as_str());
                    if matches!(kind, None | Some("textWrapping")) {
                        out.push('\n');
                    }
                }
            }
            XmlEvent::Text { text } | XmlEvent::CData { text } if text_depth > 0 => out.push_str(text),
            _ => {}
        }
    }
    Ok(out)
}

fn is_one_of(list: &[String], name: &str) -> bool {
    list.iter().any(|t| t == name)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fill::tags::VisibleText;

    const BODY: &str = r#"<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t>Name:</w:t><w:tab/><w:t xml:space="preserve">A &amp; B</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell 1</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>cell 2</w:t><w:br/><w:t>next</w:t><w:br w:type="page"/></w:r></w:p></w:tc></w:tr></w:tbl><w:p/><w:sectPr/></w:body></w:document>"#;

    #[test]
    fn paragraphs_become_lines() {
        let text = plain_text_from_xml(BODY.as_bytes()).expect("text");
        assert_eq!(text, "Name:\tA & B\ncell 1\ncell 2\nnext\n");
    }

    #[test]
    fn matches_visible_text_of_markup() {
        let plain = plain_text_from_xml(BODY.as_bytes()).expect("text");
        let visible = VisibleText::build(BODY, &MarkupDialect::default());
        assert_eq!(plain.replace('\n', ""), visible.text().replace('\n', ""));
    }

    #[test]
    fn default_output_name() {
        assert_eq!(
            default_output_for(Path::new("/tmp/safe.docx")),
            PathBuf::from("/tmp/safe_filled.docx")
        );
    }
}
