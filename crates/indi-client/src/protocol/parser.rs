// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Incremental XML stream parser.
//!
//! The INDI wire format is a sequence of sibling top-level elements with no
//! length prefix, so framing is recovered by a small lexer that tracks
//! element depth while skipping quoted attribute values, comments, CDATA
//! sections and processing instructions. Each complete top-level element is
//! then handed to `roxmltree` for the actual parse.
//!
//! ```text
//!   feed(bytes) ──► buffer ──► lexer (depth 0 → 0) ──► roxmltree ──► XmlElement
//! ```
//!
//! Chunk boundaries are irrelevant: the lexer state survives between calls and
//! resumes exactly where the previous chunk ended.
//!
//! # Example
//!
//! ```
//! use indi_client::protocol::StreamParser;
//!
//! let mut parser = StreamParser::new();
//! assert!(parser.parse(b"<delProperty device='Foc'").unwrap().is_empty());
//! let docs = parser.parse(b"/>\n<message device='Foc' message='hi'/>").unwrap();
//! assert_eq!(docs.len(), 2);
//! assert_eq!(docs[0].tag(), "delProperty");
//! ```

use crate::config::DEFAULT_MAX_DOCUMENT;
use crate::error::XmlError;
use crate::protocol::XmlElement;

/// Lexer position relative to markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    /// Character data between tags.
    Content,
    /// Just consumed `<`.
    MarkupOpen,
    /// Consumed `<!`, waiting to tell comment, CDATA and declaration apart.
    Bang,
    Comment,
    CData,
    Declaration,
    Instruction,
    /// Inside a start tag, optionally inside a quoted attribute value.
    StartTag { quote: Option<u8> },
    EndTag,
}

/// Incremental parser turning a byte stream into top-level documents.
#[derive(Debug)]
pub struct StreamParser {
    /// Unconsumed bytes; `buffer[0]` sits at stream offset `base`
    buffer: Vec<u8>,
    base: usize,

    /// Scan position within `buffer`
    pos: usize,
    lex: Lex,

    /// Start of the markup currently being lexed
    markup_start: usize,

    /// Start of the open top-level element, if any
    doc_start: Option<usize>,

    /// Names of open elements, outermost first
    open: Vec<String>,

    max_document_size: usize,

    /// Sticky framing failure
    failure: Option<XmlError>,

    documents_parsed: u64,
    bytes_received: u64,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    /// Create a parser with the default document size limit.
    pub fn new() -> Self {
        Self::with_max_document_size(DEFAULT_MAX_DOCUMENT)
    }

    /// Create a parser that rejects top-level documents larger than `max`.
    pub fn with_max_document_size(max: usize) -> Self {
        Self {
            buffer: Vec::new(),
            base: 0,
            pos: 0,
            lex: Lex::Content,
            markup_start: 0,
            doc_start: None,
            open: Vec::new(),
            max_document_size: max,
            failure: None,
            documents_parsed: 0,
            bytes_received: 0,
        }
    }

    /// Documents produced since creation.
    pub fn documents_parsed(&self) -> u64 {
        self.documents_parsed
    }

    /// Bytes fed since creation.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Bytes held back waiting for the rest of a document.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// True once a framing error has been reported.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Drop all buffered state, including a previous failure.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.base = 0;
        self.pos = 0;
        self.lex = Lex::Content;
        self.markup_start = 0;
        self.doc_start = None;
        self.open.clear();
        self.failure = None;
    }

    /// Append raw bytes from the transport.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.bytes_received += data.len() as u64;
    }

    /// Feed a chunk and collect every document it completes.
    ///
    /// On error, documents completed earlier in the same chunk are lost; use
    /// [`feed`](Self::feed) with [`next_document`](Self::next_document) to
    /// process them before the failure point.
    pub fn parse(&mut self, data: &[u8]) -> Result<Vec<XmlElement>, XmlError> {
        self.feed(data);
        let mut docs = Vec::new();
        while let Some(doc) = self.next_document()? {
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Next complete top-level document from the buffered bytes.
    ///
    /// `Ok(None)` means more input is needed. An error is sticky: every later
    /// call returns it again until [`reset`](Self::reset).
    pub fn next_document(&mut self) -> Result<Option<XmlElement>, XmlError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let result = match self.scan() {
            Ok(Some((start, end))) => self.build(start, end).map(Some),
            Ok(None) => {
                self.compact();
                Ok(None)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            log::debug!("[indi-parser] framing failure: {}", e);
            self.failure = Some(e.clone());
        }
        result
    }

    fn error(&self, message: impl Into<String>, at: usize) -> XmlError {
        XmlError::new(message, self.base + at)
    }

    /// Advance the lexer until a top-level element closes or input runs out.
    ///
    /// Returns the buffer range of the completed element.
    fn scan(&mut self) -> Result<Option<(usize, usize)>, XmlError> {
        while self.pos < self.buffer.len() {
            let i = self.pos;
            let b = self.buffer[i];

            if let Some(start) = self.doc_start {
                if i - start >= self.max_document_size {
                    return Err(self.error(
                        format!("document exceeds {} bytes", self.max_document_size),
                        start,
                    ));
                }
            }

            match self.lex {
                Lex::Content => {
                    if self.doc_start.is_some() {
                        // Skip character data (base64 payloads) in one step.
                        match self.buffer[i..].iter().position(|&c| c == b'<') {
                            Some(off) => {
                                self.markup_start = i + off;
                                self.lex = Lex::MarkupOpen;
                                self.pos = i + off + 1;
                            }
                            None => self.pos = self.buffer.len(),
                        }
                        continue;
                    }
                    if b == b'<' {
                        self.markup_start = i;
                        self.lex = Lex::MarkupOpen;
                    } else if !b.is_ascii_whitespace() {
                        return Err(self.error("text outside of a top-level element", i));
                    }
                }
                Lex::MarkupOpen => match b {
                    b'/' => self.lex = Lex::EndTag,
                    b'!' => self.lex = Lex::Bang,
                    b'?' => self.lex = Lex::Instruction,
                    b if is_name_start(b) => {
                        if self.doc_start.is_none() {
                            self.doc_start = Some(self.markup_start);
                        }
                        self.lex = Lex::StartTag { quote: None };
                    }
                    _ => return Err(self.error("invalid character after '<'", i)),
                },
                Lex::Bang => {
                    let rest = &self.buffer[self.markup_start..];
                    if rest.starts_with(b"<!--") {
                        self.lex = Lex::Comment;
                        self.pos = self.markup_start + 4;
                        continue;
                    }
                    if rest.starts_with(b"<![CDATA[") {
                        if self.doc_start.is_none() {
                            return Err(self.error("CDATA outside of an element", self.markup_start));
                        }
                        self.lex = Lex::CData;
                        self.pos = self.markup_start + 9;
                        continue;
                    }
                    if b"<!--".starts_with(rest) || b"<![CDATA[".starts_with(rest) {
                        // Opener split across chunks.
                        self.pos = self.buffer.len();
                        continue;
                    }
                    if self.doc_start.is_none() && rest[2].is_ascii_alphabetic() {
                        self.lex = Lex::Declaration;
                        self.pos = self.markup_start + 3;
                        continue;
                    }
                    return Err(self.error("invalid markup declaration", self.markup_start));
                }
                Lex::Comment => {
                    if b == b'>' && i >= self.markup_start + 6 && &self.buffer[i - 2..i] == b"--" {
                        self.lex = Lex::Content;
                    }
                }
                Lex::CData => {
                    if b == b'>' && i >= self.markup_start + 11 && &self.buffer[i - 2..i] == b"]]" {
                        self.lex = Lex::Content;
                    }
                }
                Lex::Instruction => {
                    if b == b'>' && i >= self.markup_start + 3 && self.buffer[i - 1] == b'?' {
                        self.lex = Lex::Content;
                    }
                }
                Lex::Declaration => {
                    if b == b'>' {
                        self.lex = Lex::Content;
                    }
                }
                Lex::StartTag { quote: Some(q) } => {
                    if b == q {
                        self.lex = Lex::StartTag { quote: None };
                    }
                }
                Lex::StartTag { quote: None } => match b {
                    b'"' | b'\'' => self.lex = Lex::StartTag { quote: Some(b) },
                    b'<' => return Err(self.error("'<' inside a tag", i)),
                    b'>' => {
                        self.lex = Lex::Content;
                        self.pos = i + 1;
                        let self_closing = self.buffer[i - 1] == b'/';
                        if self_closing {
                            if self.open.is_empty() {
                                return Ok(self.complete(i + 1));
                            }
                        } else {
                            let name = tag_name(&self.buffer[self.markup_start + 1..]);
                            self.open.push(name);
                        }
                        continue;
                    }
                    _ => {}
                },
                Lex::EndTag => match b {
                    b'<' => return Err(self.error("'<' inside a tag", i)),
                    b'>' => {
                        let name = tag_name(&self.buffer[self.markup_start + 2..]);
                        match self.open.pop() {
                            None => {
                                return Err(self.error(
                                    format!("unexpected closing tag </{}>", name),
                                    self.markup_start,
                                ))
                            }
                            Some(expected) if expected != name => {
                                return Err(self.error(
                                    format!("expected </{}>, found </{}>", expected, name),
                                    self.markup_start,
                                ))
                            }
                            Some(_) => {}
                        }
                        self.lex = Lex::Content;
                        self.pos = i + 1;
                        if self.open.is_empty() {
                            return Ok(self.complete(i + 1));
                        }
                        continue;
                    }
                    _ => {}
                },
            }
            self.pos = i + 1;
        }
        Ok(None)
    }

    fn complete(&mut self, end: usize) -> Option<(usize, usize)> {
        self.doc_start.take().map(|start| (start, end))
    }

    fn build(&mut self, start: usize, end: usize) -> Result<XmlElement, XmlError> {
        let slice = &self.buffer[start..end];
        let text = std::str::from_utf8(slice)
            .map_err(|e| self.error("invalid UTF-8", start + e.valid_up_to()))?;

        let doc = roxmltree::Document::parse(text).map_err(|e| {
            let at = start + text_offset(text, e.pos().row, e.pos().col);
            self.error(e.to_string(), at)
        })?;
        let element = XmlElement::from_node(doc.root_element());
        self.documents_parsed += 1;
        Ok(element)
    }

    /// Discard bytes that can no longer be part of a document.
    fn compact(&mut self) {
        let keep = match (self.doc_start, self.lex) {
            (Some(start), _) => start,
            (None, Lex::Content) => self.pos,
            (None, _) => self.markup_start,
        };
        if keep == 0 {
            return;
        }
        self.buffer.drain(..keep);
        self.base += keep;
        self.pos -= keep;
        self.markup_start = self.markup_start.saturating_sub(keep);
        self.doc_start = self.doc_start.map(|s| s - keep);
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':' || b >= 0x80
}

fn tag_name(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|&c| c.is_ascii_whitespace() || c == b'/' || c == b'>')
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Byte offset of a 1-based (row, column) text position.
fn text_offset(text: &str, row: u32, col: u32) -> usize {
    let mut offset = 0;
    for (n, line) in text.split_inclusive('\n').enumerate() {
        if n + 1 == row as usize {
            return offset
                + line
                    .char_indices()
                    .nth(col.saturating_sub(1) as usize)
                    .map_or(line.len(), |(i, _)| i);
        }
        offset += line.len();
    }
    offset
}
