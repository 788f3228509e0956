use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::xml::{parse_xml_events, XmlEvent};

pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";
const PACKAGE_RELS: &str = "_rels/.rels";
const OFFICE_DOCUMENT_REL: &str = "/officeDocument";

pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open docx: {}", path.display()))?;
        let mut zip = ZipArchive::new(f).context("read zip")?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).context("read zip entry")?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// Name of the main document part, from the package relationships.
    /// Falls back to `word/document.xml` when the rels part is absent.
    pub fn main_part_name(&self) -> anyhow::Result<String> {
        let Some(rels) = self.part(PACKAGE_RELS) else {
            return Ok(MAIN_DOCUMENT_PART.to_string());
        };
        let events = parse_xml_events(PACKAGE_RELS, rels)?;
        for ev in &events {
            let (XmlEvent::Empty { name, attrs } | XmlEvent::Start { name, attrs }) = ev else {
                continue;
            };
            if name != "Relationship" {
                continue;
            }
            let attr = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
            if attr("Type").is_some_and(|t| t.ends_with(OFFICE_DOCUMENT_REL)) {
                if let Some(target) = attr("Target") {
                    return Ok(target.trim_start_matches('/').to_string());
                }
            }
        }
        Ok(MAIN_DOCUMENT_PART.to_string())
    }

    pub fn main_part(&self) -> anyhow::Result<(String, &[u8])> {
        let name = self.main_part_name()?;
        let data = self
            .part(&name)
            .ok_or_else(|| anyhow!("docx has no main document part ({name})"))?;
        Ok((name, data))
    }

    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<()> {
        let f = File::create(output_path)
            .with_context(|| format!("create output docx: {}", output_path.display()))?;
        let mut zout = ZipWriter::new(f);
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        zout.finish().context("finish zip")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(entries: &[(&str, &str)]) -> DocxPackage {
        DocxPackage {
            entries: entries
                .iter()
                .map(|(name, data)| DocxEntry {
                    name: name.to_string(),
                    data: data.as_bytes().to_vec(),
                    compression: CompressionMethod::Stored,
                    last_modified: zip::DateTime::default(),
                    unix_mode: None,
                    is_dir: false,
                })
                .collect(),
        }
    }

    #[test]
    fn main_part_follows_relationships() {
        let rels = r#"<?xml version="1.0"?><Relationships xmlns="urn:r"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="/word/main.xml"/></Relationships>"#;
        let pkg = package(&[(PACKAGE_RELS, rels), ("word/main.xml", "<w:document/>")]);
        let (name, data) = pkg.main_part().expect("main part");
        assert_eq!(name, "word/main.xml");
        assert_eq!(data, b"<w:document/>");
    }

    #[test]
    fn main_part_defaults_without_rels() {
        let pkg = package(&[(MAIN_DOCUMENT_PART, "<w:document/>")]);
        assert_eq!(pkg.main_part_name().expect("name"), MAIN_DOCUMENT_PART);
        assert!(package(&[]).main_part().is_err());
    }
}
