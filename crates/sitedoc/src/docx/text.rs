//! XML and plain-text views of a DOCX package

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::collections::BTreeMap;

use super::package::{DocxPackage, PartKind};
use crate::error::Result;

/// The package's XML parts, grouped by role
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocxXml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rels: Option<String>,
    pub all_xml_files: BTreeMap<String, String>,
}

impl DocxXml {
    pub fn from_package(package: &DocxPackage) -> Self {
        let mut out = Self::default();
        for part in package.parts().iter().filter(|p| p.is_xml()) {
            let content = String::from_utf8_lossy(&part.data).into_owned();
            let slot = match part.kind() {
                PartKind::Document => &mut out.document,
                PartKind::Styles => &mut out.styles,
                PartKind::Header => &mut out.header,
                PartKind::Footer => &mut out.footer,
                PartKind::Relationships => &mut out.rels,
                PartKind::ContentTypes | PartKind::Other => {
                    out.all_xml_files.insert(part.name.clone(), content);
                    continue;
                }
            };
            // first header/footer wins; all of them stay in all_xml_files
            if slot.is_none() {
                *slot = Some(content.clone());
            }
            out.all_xml_files.insert(part.name.clone(), content);
        }
        out
    }

    /// Every XML part, each introduced by a `<!-- name -->` line
    pub fn concatenated(&self) -> String {
        let mut out = String::new();
        for (name, content) in &self.all_xml_files {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("<!-- ");
            out.push_str(name);
            out.push_str(" -->\n");
            out.push_str(content);
        }
        out
    }
}

/// Plain text of a document part: `w:t` runs joined, one line per paragraph
pub fn extract_text(document_xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(document_xml);

    let mut lines = Vec::new();
    let mut line = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tab" => line.push('\t'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => line.push('\t'),
                b"br" | b"cr" => line.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text => {
                line.push_str(&e.unescape()?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    lines.push(std::mem::take(&mut line));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }

    Ok(lines.join("\n").trim().to_string())
}

/// Plain text of a whole DOCX file
pub fn extract_docx_text(package: &DocxPackage) -> Result<String> {
    extract_text(package.document_xml()?)
}

#[cfg(test)]
mod tests {
    use super::super::package::fixtures::{docx_bytes, document, para};
    use super::*;

    #[test]
    fn test_extract_text() {
        let xml = document(&format!(
            "{}<w:p><w:r><w:t xml:space=\"preserve\">Slab </w:t></w:r><w:r><w:t>C30 &amp; rebar</w:t></w:r></w:p>{}",
            para("Level 2"),
            para("")
        ));
        assert_eq!(extract_text(&xml).unwrap(), "Level 2\nSlab C30 & rebar");
    }

    #[test]
    fn test_xml_parts() {
        let xml = document(&para("x"));
        let package = DocxPackage::from_bytes(&docx_bytes(&xml)).unwrap();
        let parts = DocxXml::from_package(&package);

        assert_eq!(parts.document.as_deref(), Some(xml.as_str()));
        assert_eq!(parts.styles.as_deref(), Some("<w:styles/>"));
        assert!(parts.rels.is_some());
        assert!(parts.all_xml_files.contains_key("[Content_Types].xml"));

        let joined = parts.concatenated();
        assert!(joined.contains("<!-- word/document.xml -->\n"));
        assert!(joined.contains("<!-- word/styles.xml -->\n<w:styles/>"));
    }
}
