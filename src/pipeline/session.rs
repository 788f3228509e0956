use std::collections::BTreeMap;

use anyhow::anyhow;
use log::{debug, info};

use crate::config::AppConfig;
use crate::fill::markup::{replace_in_markup, MarkupFill, MarkupSettings};
use crate::fill::text::render_text;
use crate::fill::values::{ResolvedValue, ResolvedValues};
use crate::placeholder::{scan_with, Catalog, ScanSettings};

/// One document from scan to filled markup.
///
/// The text and markup snapshots are never modified; every render starts
/// from them, so answers can be changed and re-rendered freely.
pub struct FillSession {
    text: String,
    markup: Vec<u8>,
    catalog: Catalog,
    values: ResolvedValues,
    markup_settings: MarkupSettings,
}

impl FillSession {
    pub fn new(
        text: String,
        markup: Vec<u8>,
        scan: &ScanSettings,
        markup_settings: MarkupSettings,
    ) -> Self {
        let catalog = scan_with(&text, scan);
        info!("found {} placeholder(s), {} key(s)", catalog.len(), catalog.keys().len());
        Self {
            text,
            markup,
            catalog,
            values: ResolvedValues::new(),
            markup_settings,
        }
    }

    pub fn from_config(text: String, markup: Vec<u8>, cfg: &AppConfig) -> Self {
        let scan = cfg.scan.to_settings();
        let markup_settings = cfg.markup.to_settings(&scan);
        let mut session = Self::new(text, markup, &scan, markup_settings);
        let unknown = session.answer_all(&cfg.values);
        for key in unknown {
            debug!("config value for {key:?} has no placeholder in this document");
        }
        session
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn values(&self) -> &ResolvedValues {
        &self.values
    }

    pub fn answer(&mut self, key: &str, raw: &str) -> anyhow::Result<&ResolvedValue> {
        let catalog = &self.catalog;
        self.values
            .resolve_key(catalog, key, raw)
            .ok_or_else(|| anyhow!("no placeholder with key {key:?}"))
    }

    /// Resolve a batch; returns the keys this document does not have.
    pub fn answer_all(&mut self, answers: &BTreeMap<String, String>) -> Vec<String> {
        self.values.resolve_all(&self.catalog, answers)
    }

    pub fn forget(&mut self, key: &str) -> Option<ResolvedValue> {
        self.values.remove(key)
    }

    /// Keys still lacking an answer, in display order.
    pub fn missing(&self) -> Vec<&str> {
        self.values.missing_keys(&self.catalog)
    }

    pub fn preview(&self) -> String {
        render_text(&self.text, &self.catalog, &self.values)
    }

    pub fn render_markup(&self) -> anyhow::Result<MarkupFill> {
        replace_in_markup(&self.markup, &self.catalog, &self.values, &self.markup_settings)
    }

    /// Like `render_markup`, but in strict mode every key must have an answer
    /// and every answer must land somewhere.
    pub fn render_checked(&self, strict: bool) -> anyhow::Result<MarkupFill> {
        let missing = self.missing();
        if strict && !missing.is_empty() {
            return Err(anyhow!("unanswered placeholders: {}", missing.join(", ")));
        }
        let filled = self.render_markup()?;
        if strict && !filled.report.unmatched.is_empty() {
            return Err(anyhow!(
                "no markup site for: {}",
                filled.report.unmatched.join(", ")
            ));
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::docx::text::plain_text_from_xml;

    const MARKUP: &str = r#"<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t>[Company Name] sells for $[_____].</w:t></w:r></w:p><w:p><w:r><w:t>COMPANY:</w:t></w:r></w:p><w:p><w:r><w:t>Email:</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;

    fn session() -> FillSession {
        let text = plain_text_from_xml(MARKUP.as_bytes()).expect("text");
        FillSession::from_config(text, MARKUP.as_bytes().to_vec(), &AppConfig::default())
    }

    #[test]
    fn answers_flow_to_preview_and_markup() {
        let mut s = session();
        assert_eq!(s.missing(), vec!["Company Name", "Purchase Amount", "Company Email"]);
        s.answer("Company Name", "Acme").expect("known key");
        s.answer("Purchase Amount", "100k").expect("known key");
        s.answer("Company Email", "ceo@acme.co").expect("known key");
        assert!(s.answer("Nope", "x").is_err());
        assert_eq!(
            s.preview(),
            "Acme sells for $100,000.\nCOMPANY:\nEmail: ceo@acme.co"
        );
        let filled = s.render_checked(true).expect("strict fill");
        let out = plain_text_from_xml(&filled.bytes).expect("text");
        assert_eq!(out, s.preview());
    }

    #[test]
    fn strict_mode_rejects_missing_answers() {
        let mut s = session();
        s.answer("Company Name", "Acme").expect("known key");
        assert!(s.render_checked(true).is_err());
        assert!(s.render_checked(false).is_ok());
    }

    #[test]
    fn rerender_after_edit_starts_from_original() {
        let mut s = session();
        s.answer("Company Name", "Acme").expect("known key");
        let first = s.preview();
        s.answer("Company Name", "Globex").expect("known key");
        assert!(s.preview().starts_with("Globex sells"));
        assert!(first.starts_with("Acme sells"));
        assert_eq!(s.forget("Company Name").map(|v| v.raw), Some("Globex".to_string()));
        assert!(s.preview().starts_with("[Company Name] sells"));
    }

    #[test]
    fn config_values_are_applied() {
        let mut cfg = AppConfig::default();
        cfg.values.insert("Company Name".to_string(), "Initech".to_string());
        cfg.values.insert("Unrelated".to_string(), "x".to_string());
        let text = plain_text_from_xml(MARKUP.as_bytes()).expect("text");
        let s = FillSession::from_config(text, MARKUP.as_bytes().to_vec(), &cfg);
        assert_eq!(s.values().value_of("Company Name"), Some("Initech"));
        assert_eq!(s.values().len(), 1);
    }
}
