//! DOCX handling: package access, page segmentation, text extraction and
//! the splitting service

mod package;
mod progress;
mod segment;
mod splitter;
mod text;

pub use package::{DocxPackage, Part, PartKind, DOCUMENT_PART};
pub use progress::{
    ProgressSink, SplitEvent, SplitOutcome, SplitPhase, SplitStatus, StatusHandle, StatusTracker,
};
pub use segment::{DocumentBody, Segmentation, XmlChunk};
pub use splitter::{chunk_file_name, pages_from_value, validate_pages_per_file, DocxSplitter};
pub use text::{extract_docx_text, extract_text, DocxXml};

#[cfg(test)]
pub(crate) use package::fixtures;
