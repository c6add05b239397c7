//! DOCX container access: read every part, write copies with a new body

use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Main document part inside a DOCX package
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Upper bound on buffer reservation from a zip header's declared size
const MAX_PREALLOC: u64 = 1 << 20;

/// Declared sizes are untrusted; reads still grow the buffer as needed
fn prealloc_len(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// Role of a part, used when exporting the package XML
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Document,
    Styles,
    Header,
    Footer,
    Relationships,
    ContentTypes,
    Other,
}

impl PartKind {
    pub fn of(name: &str) -> Self {
        let file = name.rsplit('/').next().unwrap_or(name);
        if name == DOCUMENT_PART {
            Self::Document
        } else if name == "[Content_Types].xml" {
            Self::ContentTypes
        } else if name.ends_with(".rels") {
            Self::Relationships
        } else if file == "styles.xml" {
            Self::Styles
        } else if file.starts_with("header") {
            Self::Header
        } else if file.starts_with("footer") {
            Self::Footer
        } else {
            Self::Other
        }
    }
}

/// One entry of the package
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub data: Vec<u8>,
}

impl Part {
    pub fn kind(&self) -> PartKind {
        PartKind::of(&self.name)
    }

    pub fn is_xml(&self) -> bool {
        self.name.ends_with(".xml") || self.name.ends_with(".rels")
    }
}

/// An unpacked DOCX, parts in archive order
#[derive(Debug, Clone)]
pub struct DocxPackage {
    parts: Vec<Part>,
}

impl DocxPackage {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_reader(std::io::Cursor::new(data))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::archive(format!("Not a valid DOCX container: {}", e)))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(prealloc_len(entry.size()));
            entry.read_to_end(&mut data)?;
            parts.push(Part {
                name: entry.name().to_string(),
                data,
            });
        }

        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// `word/document.xml` as UTF-8
    pub fn document_xml(&self) -> Result<&str> {
        let part = self
            .part(DOCUMENT_PART)
            .ok_or_else(|| Error::not_found(format!("{} missing from package", DOCUMENT_PART)))?;
        std::str::from_utf8(&part.data)
            .map_err(|e| Error::archive(format!("{} is not UTF-8: {}", DOCUMENT_PART, e)))
    }

    /// Write a copy of the package with `document_xml` as the main part;
    /// every other part (styles, rels, media, headers) is carried over.
    pub fn write_with_document<W: Write + Seek>(&self, document_xml: &str, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for part in &self.parts {
            zip.start_file(part.name.as_str(), options)?;
            if part.name == DOCUMENT_PART {
                zip.write_all(document_xml.as_bytes())?;
            } else {
                zip.write_all(&part.data)?;
            }
        }

        Ok(zip.finish()?)
    }

    /// Write the package with a replacement body to `path`
    pub fn save_with_document(&self, document_xml: &str, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = self.write_with_document(document_xml, std::io::BufWriter::new(file))?;
        writer.flush()?;
        Ok(())
    }
}

/// Minimal packages for tests
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    /// Wrap body content in a document part
    pub fn document(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <w:document xmlns:w=\"{}\"><w:body>{}</w:body></w:document>",
            W_NS, body
        )
    }

    pub fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text)
    }

    pub fn hard_break_para(text: &str) -> String {
        format!("<w:p><w:r><w:t>{}</w:t><w:br w:type=\"page\"/></w:r></w:p>", text)
    }

    /// Build a DOCX with the given document part plus styles and rels
    pub fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let parts = [
            ("[Content_Types].xml", "<Types/>"),
            ("_rels/.rels", "<Relationships/>"),
            ("word/styles.xml", "<w:styles/>"),
            ("word/_rels/document.xml.rels", "<Relationships/>"),
        ];
        for (name, body) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.start_file(DOCUMENT_PART, options).unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_part_kinds() {
        assert_eq!(PartKind::of("word/document.xml"), PartKind::Document);
        assert_eq!(PartKind::of("word/styles.xml"), PartKind::Styles);
        assert_eq!(PartKind::of("word/header1.xml"), PartKind::Header);
        assert_eq!(PartKind::of("word/footer2.xml"), PartKind::Footer);
        assert_eq!(PartKind::of("word/_rels/document.xml.rels"), PartKind::Relationships);
        assert_eq!(PartKind::of("word/media/image1.png"), PartKind::Other);
    }

    #[test]
    fn test_rewrite_keeps_other_parts() {
        let original = document(&para("before"));
        let package = DocxPackage::from_bytes(&docx_bytes(&original)).unwrap();
        assert_eq!(package.document_xml().unwrap(), original);

        let replaced = document(&para("after"));
        let bytes = package
            .write_with_document(&replaced, std::io::Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();

        let copy = DocxPackage::from_bytes(&bytes).unwrap();
        assert_eq!(copy.parts().len(), package.parts().len());
        assert_eq!(copy.document_xml().unwrap(), replaced);
        assert_eq!(copy.part("word/styles.xml").unwrap().data, b"<w:styles/>");
    }

    #[test]
    fn test_missing_document_part() {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("word/styles.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<w:styles/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let package = DocxPackage::from_bytes(&bytes).unwrap();
        assert!(matches!(package.document_xml(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_prealloc_is_capped() {
        assert_eq!(prealloc_len(4096), 4096);
        assert_eq!(prealloc_len(u64::MAX), 1 << 20);
    }

    #[test]
    fn test_corrupt_container() {
        let err = DocxPackage::from_bytes(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }
}
