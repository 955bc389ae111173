//! Document text extraction, dispatched on file extension.
//!
//! The pipeline only ever sees a plain `String`; everything format-specific
//! lives behind [`TextExtractor`]. Callers can register their own extractors
//! on an [`ExtractorRegistry`] to support more formats.

use std::{collections::BTreeMap, fmt, path::Path, sync::Arc};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Turns one kind of document file into plain text.
pub trait TextExtractor: Send + Sync {
    /// Short human-readable name, shown by `docrag formats`.
    fn name(&self) -> &str;

    fn extract(&self, path: &Path) -> Result<String>;
}

/// Maps lower-case file extensions (without the dot) to extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            extractors: BTreeMap::new(),
        }
    }

    /// A registry with the built-in plain text, PDF, CSV and markup
    /// extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register("pdf", Arc::new(Pdf));

        let plain: Arc<dyn TextExtractor> = Arc::new(PlainText);
        for ext in ["txt", "md", "markdown"] {
            registry.register(ext, Arc::clone(&plain));
        }

        registry.register("csv", Arc::new(Csv));

        let markup: Arc<dyn TextExtractor> = Arc::new(Markup);
        for ext in ["html", "htm", "xml"] {
            registry.register(ext, Arc::clone(&markup));
        }

        registry
    }

    /// Register `extractor` for `extension`, returning the one it replaces.
    ///
    /// The extension is matched case-insensitively and may be given with
    /// or without a leading dot.
    pub fn register(
        &mut self,
        extension: &str,
        extractor: Arc<dyn TextExtractor>,
    ) -> Option<Arc<dyn TextExtractor>> {
        self.extractors.insert(normalize_extension(extension), extractor)
    }

    /// Registered extensions in sorted order.
    pub fn extensions(&self) -> Vec<&str> {
        self.extractors.keys().map(String::as_str).collect()
    }

    /// `(extension, extractor name)` pairs in extension order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extractors
            .iter()
            .map(|(ext, extractor)| (ext.as_str(), extractor.name()))
    }

    pub fn get(&self, extension: &str) -> Option<&dyn TextExtractor> {
        self.extractors
            .get(&normalize_extension(extension))
            .map(|e| &**e)
    }

    /// Extract the text of the document at `path`.
    pub fn extract(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
            .unwrap_or_default();

        let Some(extractor) = self.extractors.get(&extension) else {
            warn!(
                extension = %extension,
                path = %path.display(),
                "no extractor registered for document type"
            );
            return Err(Error::UnsupportedFormat { extension });
        };

        debug!(
            path = %path.display(),
            extractor = extractor.name(),
            "extracting document"
        );
        let text = extractor.extract(path)?;
        info!(
            path = %path.display(),
            chars = text.chars().count(),
            "document extracted"
        );
        Ok(text)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

fn read_utf8(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::Extraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| Error::Extraction {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8: {e}"),
    })
}

/// UTF-8 text files, returned as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl TextExtractor for PlainText {
    fn name(&self) -> &str {
        "plain text"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        read_utf8(path)
    }
}

/// Text layer of a PDF document.
///
/// Scanned pages without a text layer yield nothing; there is no OCR.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pdf;

impl TextExtractor for Pdf {
    fn name(&self) -> &str {
        "pdf"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let failed = |reason: String| Error::Extraction {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| failed(e.to_string()))?;

        // pdf-extract panics on some malformed files instead of failing.
        let extracted =
            std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
                .map_err(|_| failed("malformed PDF".to_string()))?
                .map_err(|e| failed(format!("cannot read PDF: {e}")))?;

        let text = tidy_lines(&extracted);
        if text.is_empty() {
            warn!(
                path = %path.display(),
                "PDF has no extractable text; it may be scanned or encrypted"
            );
        }
        Ok(text)
    }
}

/// Comma-separated values with a header row.
///
/// Each data row becomes one `header: value` line per column; rows are
/// separated by a blank line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Csv;

impl TextExtractor for Csv {
    fn name(&self) -> &str {
        "csv"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let source = read_utf8(path)?;
        let records = parse_csv(&source).map_err(|reason| Error::Extraction {
            path: path.to_path_buf(),
            reason,
        })?;

        let mut records = records.into_iter();
        let Some(headers) = records.next() else {
            return Ok(String::new());
        };

        let rows: Vec<String> = records
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, value)| match headers.get(i) {
                        Some(header) => format!("{}: {}", header.trim(), value.trim()),
                        None => format!("column {}: {}", i + 1, value.trim()),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect();

        Ok(rows.join("\n\n"))
    }
}

/// Split CSV text into records, honouring double-quoted fields.
///
/// Blank lines are skipped.
fn parse_csv(source: &str) -> std::result::Result<Vec<Vec<String>>, String> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = source.chars().peekable();

    fn finish(record: &mut Vec<String>, records: &mut Vec<Vec<String>>) {
        let record = std::mem::take(record);
        if record.iter().any(|f| !f.is_empty()) {
            records.push(record);
        }
    }

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                finish(&mut record, &mut records);
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        finish(&mut record, &mut records);
    }

    Ok(records)
}

/// HTML and XML with tags stripped.
///
/// `script` and `style` bodies and comments are dropped, block-level tags
/// become line breaks and common character entities are decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Markup;

impl TextExtractor for Markup {
    fn name(&self) -> &str {
        "markup"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        Ok(strip_markup(&read_utf8(path)?))
    }
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "dd", "div",
    "dl", "dt", "figcaption", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "head", "header", "hr", "html", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "title", "tr", "ul",
];

const CELL_TAGS: &[&str] = &["td", "th"];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

fn strip_markup(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(open) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..open]));
        let after = &rest[open + 1..];

        if let Some(comment) = after.strip_prefix("!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
            continue;
        }

        let Some(close) = after.find('>') else {
            // Unterminated tag; keep the remainder as text.
            out.push_str(&decode_entities(&rest[open..]));
            rest = "";
            break;
        };

        let tag = &after[..close];
        rest = &after[close + 1..];

        let name = tag_name(tag);
        let opening = !tag.starts_with('/') && !tag.ends_with('/');
        if opening && SKIPPED_ELEMENTS.contains(&name.as_str()) {
            rest = skip_element(rest, &name);
            out.push('\n');
        } else if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        } else if CELL_TAGS.contains(&name.as_str()) {
            out.push(' ');
        }
    }
    out.push_str(&decode_entities(rest));

    tidy_lines(&out)
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Return what follows the closing tag of `name`, or nothing if it never
/// closes.
fn skip_element<'s>(rest: &'s str, name: &str) -> &'s str {
    // ASCII lowercasing keeps byte offsets intact.
    let lower = rest.to_ascii_lowercase();
    let Some(start) = lower.find(&format!("</{name}")) else {
        return "";
    };
    match rest[start..].find('>') {
        Some(end) => &rest[start + end + 1..],
        None => "",
    }
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Collapse runs of whitespace within lines and runs of blank lines.
fn tidy_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;

    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        pending_blank = false;
    }

    out
}
