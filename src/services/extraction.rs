//! Text Extraction
//!
//! Turns uploaded lease documents into plain text. Extraction never fails:
//! any problem is reported in-band as a parenthesised marker string.

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

pub const NO_PDF_TEXT: &str = "(No text extracted from PDF)";
pub const NO_DOCX_TEXT: &str = "(No text extracted from DOCX)";

/// Whether `text` is a marker rather than document content.
pub fn is_marker(text: &str) -> bool {
    text.trim_start().starts_with('(')
}

/// Extract text from `bytes` according to the extension of `filename`.
pub fn extract_text(bytes: &[u8], filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => extract_pdf(bytes),
        "docx" | "doc" => extract_docx(bytes),
        other => {
            tracing::debug!("[extraction] unsupported file {:?}", filename);
            format!("(Unsupported file type: .{})", other)
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> String {
    // pdf-extract panics on some malformed inputs
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
    match result {
        Ok(Ok(text)) => {
            let pages: Vec<&str> = text
                .split('\u{c}')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            if pages.is_empty() {
                NO_PDF_TEXT.to_string()
            } else {
                pages.join("\n\n")
            }
        }
        Ok(Err(e)) => format!("(PDF extraction failed: {})", e),
        Err(_) => "(PDF extraction failed: malformed document)".to_string(),
    }
}

fn extract_docx(bytes: &[u8]) -> String {
    match docx_paragraphs(bytes) {
        Ok(paragraphs) if paragraphs.is_empty() => NO_DOCX_TEXT.to_string(),
        Ok(paragraphs) => paragraphs.join("\n"),
        Err(e) => format!("(DOCX extraction failed: {})", e),
    }
}

/// Non-empty paragraphs of `word/document.xml`, in document order.
fn docx_paragraphs(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| e.to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Build the document context for a session.
///
/// Pasted text wins. Otherwise each file is extracted and rendered as a
/// `--- {filename} ---` block; the blocks are separated by a blank line.
pub fn document_context(pasted: Option<&str>, files: &[(String, Vec<u8>)]) -> Option<String> {
    if let Some(text) = pasted.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(text.to_string());
    }
    if files.is_empty() {
        return None;
    }
    let blocks: Vec<String> = files
        .iter()
        .map(|(name, bytes)| format!("--- {} ---\n{}", name, extract_text(bytes, name)))
        .collect();
    Some(blocks.join("\n\n"))
}
