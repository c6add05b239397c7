//! Page segmentation of a WordprocessingML body
//!
//! The body is scanned once with quick-xml and cut into top-level blocks
//! (paragraphs, tables, ...). Each block span runs from the end of the
//! previous block to the end of its own element, so whitespace between
//! blocks travels with the block that follows it and concatenating all
//! spans reproduces the body exactly.
//!
//! Page boundaries come from markers inside the blocks:
//!
//! - `w:lastRenderedPageBreak` (soft) and `w:pageBreakBefore` start a new
//!   page at their block
//! - `w:br w:type="page"` (hard) ends the page after its block
//!
//! When a document carries no markers at all, pages are estimated as runs
//! of `paragraphs_per_page` blocks. That estimate is approximate and does
//! not correspond to rendered pages.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::ops::Range;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
struct Block {
    span: Range<usize>,
    is_sect_pr: bool,
    hard_break: bool,
    soft_break: bool,
    break_before: bool,
}

impl Block {
    fn has_marker(&self) -> bool {
        self.hard_break || self.soft_break || self.break_before
    }
}

/// How the body was cut into pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    /// Block index ranges, one per page
    pub pages: Vec<Range<usize>>,
    /// True when pages were estimated from block counts
    pub estimated: bool,
}

/// One split chunk, numbered from 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlChunk {
    pub index: usize,
    /// Pages (segments) carried by this chunk
    pub pages: usize,
    /// Standalone `document.xml`
    pub xml: String,
}

/// A parsed `document.xml`, borrowing the source text
#[derive(Debug, Clone)]
pub struct DocumentBody<'a> {
    xml: &'a str,
    /// End of the `<w:body>` start tag
    content_start: usize,
    /// Start of `</w:body>`
    content_end: usize,
    blocks: Vec<Block>,
    /// Trailing section properties, repeated in every chunk
    trailer: Range<usize>,
    self_closing: bool,
}

fn is_on(e: &BytesStart<'_>) -> bool {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"val" {
            return !matches!(attr.value.as_ref(), b"0" | b"false" | b"off");
        }
    }
    true
}

fn is_page_break(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .any(|a| a.key.local_name().as_ref() == b"type" && a.value.as_ref() == b"page")
}

impl<'a> DocumentBody<'a> {
    /// Scan a document part
    pub fn parse(xml: &'a str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut depth = 0usize;
        let mut body_depth: Option<usize> = None;
        let mut content_start = None;
        let mut content_end = None;
        let mut self_closing = false;

        let mut blocks: Vec<Block> = Vec::new();
        let mut current: Option<Block> = None;
        let mut last_end = 0usize;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event()?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(e) => {
                    match body_depth {
                        None if e.local_name().as_ref() == b"body" => {
                            body_depth = Some(depth + 1);
                            content_start = Some(after);
                            last_end = after;
                        }
                        Some(bd) if depth == bd => {
                            current = Some(Block {
                                span: last_end..last_end,
                                is_sect_pr: e.local_name().as_ref() == b"sectPr",
                                ..Block::default()
                            });
                        }
                        Some(bd) if depth > bd => {
                            if let Some(block) = current.as_mut() {
                                Self::mark(block, &e);
                            }
                        }
                        _ => {}
                    }
                    depth += 1;
                }
                Event::Empty(e) => match body_depth {
                    None if e.local_name().as_ref() == b"body" => {
                        content_start = Some(after);
                        content_end = Some(after);
                        self_closing = true;
                        break;
                    }
                    Some(bd) if depth == bd => {
                        blocks.push(Block {
                            span: last_end..after,
                            is_sect_pr: e.local_name().as_ref() == b"sectPr",
                            ..Block::default()
                        });
                        last_end = after;
                    }
                    Some(bd) if depth > bd => {
                        if let Some(block) = current.as_mut() {
                            Self::mark(block, &e);
                        }
                    }
                    _ => {}
                },
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    match body_depth {
                        Some(bd) if depth == bd => {
                            if let Some(mut block) = current.take() {
                                block.span.end = after;
                                last_end = after;
                                blocks.push(block);
                            }
                        }
                        Some(bd) if depth + 1 == bd => {
                            // closing </w:body>
                            content_end = Some(before);
                            break;
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let (Some(content_start), Some(content_end)) = (content_start, content_end) else {
            return Err(Error::archive("document.xml has no complete <w:body> element"));
        };

        // text between the last block and </w:body> joins the last span
        let mut trailer = content_end..content_end;
        if let Some(last) = blocks.last_mut() {
            last.span.end = content_end;
            if last.is_sect_pr {
                trailer = last.span.clone();
                blocks.pop();
            }
        }

        Ok(Self {
            xml,
            content_start,
            content_end,
            blocks,
            trailer,
            self_closing,
        })
    }

    fn mark(block: &mut Block, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"br" if is_page_break(e) => block.hard_break = true,
            b"lastRenderedPageBreak" => block.soft_break = true,
            b"pageBreakBefore" if is_on(e) => block.break_before = true,
            _ => {}
        }
    }

    /// Number of top-level blocks, excluding the trailing section properties
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether any page marker was found
    pub fn has_page_markers(&self) -> bool {
        self.blocks.iter().any(Block::has_marker)
    }

    /// Body content without the trailing section properties
    pub fn content(&self) -> &'a str {
        match (self.blocks.first(), self.blocks.last()) {
            (Some(first), Some(last)) => &self.xml[first.span.start..last.span.end],
            _ => "",
        }
    }

    /// Cut the body into pages
    pub fn segments(&self, paragraphs_per_page: usize) -> Segmentation {
        let n = self.blocks.len();
        if n == 0 {
            return Segmentation {
                pages: Vec::new(),
                estimated: false,
            };
        }

        if !self.has_page_markers() {
            let per_page = paragraphs_per_page.max(1);
            let pages = (0..n)
                .step_by(per_page)
                .map(|start| start..(start + per_page).min(n))
                .collect();
            return Segmentation {
                pages,
                estimated: true,
            };
        }

        let mut starts = BTreeSet::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if (block.soft_break || block.break_before) && i > 0 {
                starts.insert(i);
            }
            if block.hard_break && i + 1 < n {
                starts.insert(i + 1);
            }
        }

        let mut pages = Vec::with_capacity(starts.len() + 1);
        let mut start = 0;
        for boundary in starts {
            pages.push(start..boundary);
            start = boundary;
        }
        pages.push(start..n);

        Segmentation {
            pages,
            estimated: false,
        }
    }

    /// Wrap body content as a standalone document part
    fn wrap(&self, content: &str) -> String {
        let prefix = &self.xml[..self.content_start];
        let trailer = &self.xml[self.trailer.clone()];
        let suffix = &self.xml[self.content_end..];

        let mut out = String::with_capacity(prefix.len() + content.len() + trailer.len() + suffix.len());
        out.push_str(prefix);
        out.push_str(content);
        out.push_str(trailer);
        out.push_str(suffix);
        out
    }

    /// Group pages into chunks of `pages_per_file`; the last may be short.
    ///
    /// A body with no blocks yields one chunk holding the whole document.
    pub fn chunks(&self, pages_per_file: usize, paragraphs_per_page: usize) -> Vec<XmlChunk> {
        let segmentation = self.segments(paragraphs_per_page);
        if self.self_closing || segmentation.pages.is_empty() {
            return vec![XmlChunk {
                index: 1,
                pages: 1,
                xml: self.xml.to_string(),
            }];
        }

        segmentation
            .pages
            .chunks(pages_per_file.max(1))
            .enumerate()
            .map(|(i, group)| {
                let first = &self.blocks[group[0].start];
                let last = &self.blocks[group[group.len() - 1].end - 1];
                XmlChunk {
                    index: i + 1,
                    pages: group.len(),
                    xml: self.wrap(&self.xml[first.span.start..last.span.end]),
                }
            })
            .collect()
    }

    /// Body content of a chunk produced by [`Self::chunks`]
    pub fn chunk_content<'c>(&self, chunk_xml: &'c str) -> &'c str {
        let prefix_len = self.content_start;
        let tail_len = (self.trailer.end - self.trailer.start) + (self.xml.len() - self.content_end);
        if chunk_xml.len() < prefix_len + tail_len {
            return "";
        }
        &chunk_xml[prefix_len..chunk_xml.len() - tail_len]
    }
}
