//! Document text extraction.
//!
//! Turns uploaded bytes into clean text and overlapping word chunks. The
//! extractor is chosen by MIME type, falling back to the file extension when
//! the declared type is missing or generic.
//!
//! Extraction is best effort: a corrupt or unsupported file produces an
//! [`Extraction`] with no text and an error message, never an `Err` or a
//! panic. Callers decide what to store in that case.

use std::path::Path;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, ExtractionSettings};
use crate::services::estimate_tokens;

/// MIME types with a dedicated extractor.
pub const SUPPORTED_FORMATS: &[&str] = &[
    "application/pdf",
    "text/csv",
    "text/plain",
    "text/markdown",
    "application/json",
    "text/html",
];

/// A supported upload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupportedFormat {
    /// MIME type.
    pub mime_type: &'static str,
    /// Usual file extension.
    pub extension: &'static str,
    /// What is extracted.
    pub description: &'static str,
}

/// Supported formats with their extension and a short description.
pub const FORMAT_DETAILS: &[SupportedFormat] = &[
    SupportedFormat {
        mime_type: "application/pdf",
        extension: ".pdf",
        description: "PDF documents (text of each page)",
    },
    SupportedFormat {
        mime_type: "text/csv",
        extension: ".csv",
        description: "CSV files (header and rows as column: value)",
    },
    SupportedFormat {
        mime_type: "text/plain",
        extension: ".txt",
        description: "Plain text files",
    },
    SupportedFormat {
        mime_type: "text/markdown",
        extension: ".md",
        description: "Markdown files (formatting removed)",
    },
    SupportedFormat {
        mime_type: "application/json",
        extension: ".json",
        description: "JSON files (rendered as key: value lines)",
    },
    SupportedFormat {
        mime_type: "text/html",
        extension: ".html",
        description: "HTML pages (visible text only)",
    },
];

/// Generic type sent by clients that don't know better.
const OCTET_STREAM: &str = "application/octet-stream";

/// Elements whose text never reaches the output.
const HIDDEN_HTML_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// One chunk of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of the chunk.
    pub index: usize,
    /// Chunk text (words joined by single spaces).
    pub text: String,
    /// Number of words in the chunk.
    pub word_count: usize,
    /// Index of the first word in the source text.
    pub start_word: usize,
    /// Index of the last word in the source text.
    pub end_word: usize,
}

/// Facts about the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Original file name.
    pub filename: String,
    /// MIME type the extractor was chosen by.
    pub mime_type: String,
    /// Upload size.
    pub file_size_bytes: u64,
    /// Lower-cased extension including the dot, or empty.
    pub extension: String,
    /// Whether the upload had any bytes at all.
    pub has_content: bool,
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Cleaned text, empty when nothing could be extracted.
    pub text: String,
    /// Overlapping chunks of `text`.
    pub chunks: Vec<TextChunk>,
    /// File metadata.
    pub metadata: DocumentMetadata,
    /// Estimated tokens of `text`.
    pub total_tokens: usize,
    /// Why extraction produced no text, if it didn't.
    pub error: Option<String>,
}

impl Extraction {
    /// Returns true if usable text was extracted.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Extracts text from uploaded documents.
#[derive(Debug, Clone, Copy)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl DocumentProcessor {
    /// Creates a processor with explicit chunking parameters.
    #[must_use]
    pub const fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Creates a processor from configuration.
    #[must_use]
    pub const fn from_settings(settings: &ExtractionSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// MIME types with a dedicated extractor.
    #[must_use]
    pub const fn supported_formats() -> &'static [&'static str] {
        SUPPORTED_FORMATS
    }

    /// Supported formats with extension and description.
    #[must_use]
    pub const fn format_details() -> &'static [SupportedFormat] {
        FORMAT_DETAILS
    }

    /// Returns true if `mime_type` has a dedicated extractor.
    #[must_use]
    pub fn is_supported(mime_type: &str) -> bool {
        SUPPORTED_FORMATS.contains(&normalize_mime(mime_type).as_str())
    }

    /// Resolves the MIME type to extract with.
    ///
    /// A supported declared type wins; otherwise the file extension decides;
    /// otherwise the declared type (or `application/octet-stream`) is kept.
    #[must_use]
    pub fn resolve_mime(declared: Option<&str>, filename: &str) -> String {
        let declared = declared.map(normalize_mime).filter(|m| !m.is_empty());
        if let Some(mime) = &declared
            && SUPPORTED_FORMATS.contains(&mime.as_str())
        {
            return mime.clone();
        }
        mime_from_extension(filename)
            .map(str::to_string)
            .or(declared)
            .unwrap_or_else(|| OCTET_STREAM.to_string())
    }

    /// Extracts, cleans and chunks a document.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn process(&self, bytes: &[u8], mime_type: &str, filename: &str) -> Extraction {
        let mime = normalize_mime(mime_type);
        let metadata = DocumentMetadata {
            filename: filename.to_string(),
            mime_type: mime.clone(),
            file_size_bytes: bytes.len() as u64,
            extension: extension_of(filename),
            has_content: !bytes.is_empty(),
        };

        let raw = match mime.as_str() {
            "text/plain" => Ok(decode_text(bytes)),
            "text/markdown" => Ok(markdown_to_text(&decode_text(bytes))),
            "text/html" => Ok(html_to_text(&String::from_utf8_lossy(bytes))),
            "application/json" => Ok(json_to_text(bytes)),
            "text/csv" => csv_to_text(bytes),
            "application/pdf" => pdf_to_text(bytes),
            other => {
                tracing::warn!(mime_type = other, filename, "Unsupported file type, trying plain text");
                fallback_text(bytes).ok_or_else(|| format!("unsupported binary file type: {other}"))
            },
        };

        let (text, error) = match raw {
            Ok(raw) => {
                let cleaned = clean_text(&raw);
                if cleaned.is_empty() {
                    (String::new(), Some("No text content could be extracted".to_string()))
                } else {
                    (cleaned, None)
                }
            },
            Err(e) => (String::new(), Some(e)),
        };

        if let Some(error) = &error {
            tracing::warn!(filename, error = %error, "Text extraction failed");
        }

        let chunks = chunk_text(&text, self.chunk_size, self.chunk_overlap);
        tracing::debug!(filename, chunks = chunks.len(), "Processed document");

        Extraction {
            total_tokens: estimate_tokens(&text),
            text,
            chunks,
            metadata,
            error,
        }
    }

    /// Chunks text with this processor's parameters.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        chunk_text(text, self.chunk_size, self.chunk_overlap)
    }
}

/// Collapses runs of spaces within lines and drops blank lines.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits text into chunks of roughly `chunk_size` characters.
///
/// Chunks break on whitespace. Each new chunk starts with the last
/// `overlap` words of the previous one, capped at half of that chunk so
/// every chunk advances through the text.
#[must_use]
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0usize;

    let push = |chunks: &mut Vec<TextChunk>, current: &[&str], end: usize| {
        chunks.push(TextChunk {
            index: chunks.len(),
            text: current.join(" "),
            word_count: current.len(),
            start_word: end + 1 - current.len(),
            end_word: end,
        });
    };

    for (i, word) in words.iter().enumerate() {
        let word_size = word.chars().count() + 1;

        if current_size + word_size > chunk_size && !current.is_empty() {
            push(&mut chunks, &current, i - 1);

            let keep = overlap.min(current.len() / 2);
            current.drain(..current.len() - keep);
            current_size = current.iter().map(|w| w.chars().count() + 1).sum();
        }

        current.push(word);
        current_size += word_size;
    }

    if !current.is_empty() {
        push(&mut chunks, &current, words.len() - 1);
    }

    chunks
}

fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

fn mime_from_extension(filename: &str) -> Option<&'static str> {
    match extension_of(filename).as_str() {
        ".txt" | ".text" | ".log" => Some("text/plain"),
        ".md" | ".markdown" => Some("text/markdown"),
        ".html" | ".htm" => Some("text/html"),
        ".json" => Some("application/json"),
        ".csv" => Some("text/csv"),
        ".pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Decodes UTF-8, falling back to Latin-1 (which accepts any byte).
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Lossy UTF-8 for unknown types, refused if the bytes look binary.
fn fallback_text(bytes: &[u8]) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let replaced = text.chars().filter(|&c| c == char::REPLACEMENT_CHARACTER).count();
    if replaced * 10 > text.chars().count() {
        return None;
    }
    Some(text.into_owned())
}

fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::new();
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);

    for event in parser {
        match event {
            Event::Text(text) => out.push_str(&text),
            Event::Code(code) => {
                out.push('`');
                out.push_str(&code);
                out.push('`');
            },
            Event::Start(Tag::CodeBlock(_)) => {
                out.push_str("\n```\n");
            },
            Event::End(TagEnd::CodeBlock) => out.push_str("```\n"),
            Event::Start(Tag::Heading { .. }) => out.push('\n'),
            Event::End(
                TagEnd::Heading(_) | TagEnd::Paragraph | TagEnd::Item | TagEnd::TableRow | TagEnd::TableHead,
            )
            | Event::SoftBreak
            | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::TableCell) => out.push_str(" | "),
            _ => {},
        }
    }

    out
}

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_HTML_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}

fn json_to_text(bytes: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => {
            let mut lines = Vec::new();
            render_json(&value, 0, &mut lines);
            lines.join("\n")
        },
        Err(e) => {
            tracing::debug!(error = %e, "Invalid JSON, extracting as plain text");
            decode_text(bytes)
        },
    }
}

fn render_json(value: &serde_json::Value, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let render_child = |label: String, child: &serde_json::Value, lines: &mut Vec<String>| {
        match child {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                lines.push(format!("{indent}{label}:"));
                render_json(child, depth + 1, lines);
            },
            scalar => lines.push(format!("{indent}{label}: {}", json_scalar(scalar))),
        }
    };

    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                render_child(key.clone(), child, lines);
            }
        },
        serde_json::Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                render_child(format!("[{i}]"), child, lines);
            }
        },
        scalar => lines.push(format!("{indent}{}", json_scalar(scalar))),
    }
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn csv_to_text(bytes: &[u8]) -> Result<String, String> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("could not read CSV header: {e}"))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("could not parse CSV: {e}"))?;
        let cells: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let column = headers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column {}", i + 1));
                format!("{column}: {}", value.trim())
            })
            .collect();
        rows.push(cells.join(" | "));
    }

    Ok(format!(
        "Columns: {}\nTotal rows: {}\n\n{}",
        headers.join(", "),
        rows.len(),
        rows.join("\n")
    ))
}

fn pdf_to_text(bytes: &[u8]) -> Result<String, String> {
    let document =
        lopdf::Document::load_mem(bytes).map_err(|e| format!("could not parse PDF: {e}"))?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                pages.push(format!("--- Page {page_number} ---\n{text}"));
            },
            Ok(_) => {},
            Err(e) => tracing::warn!(page = page_number, error = %e, "Could not extract PDF page"),
        }
    }

    Ok(pages.join("\n\n"))
}
