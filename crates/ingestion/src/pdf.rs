//! PDF text extraction module
//!
//! Extracts per-page text from the claim PDF using lopdf. Pages keep their
//! 1-based page numbers so they can be joined with the metadata file.

use crate::errors::IngestionError;
use lopdf::{Document, ObjectId};
use std::path::Path;
use tracing::{debug, warn};

/// Text of one PDF page
#[derive(Debug, Clone, PartialEq)]
pub struct PdfPage {
    pub number: u32,
    pub text: String,
}

/// Extract the text of every page, in page order
pub fn extract_pages(path: &Path) -> Result<Vec<PdfPage>, IngestionError> {
    if !path.exists() {
        return Err(IngestionError::FileNotFound(path.display().to_string()));
    }

    let doc = Document::load(path).map_err(|e| IngestionError::PdfParseError {
        path: path.display().to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut result = Vec::with_capacity(pages.len());
    for (&number, &page_id) in pages.iter() {
        let raw = match doc.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(_) => extract_page_text(&doc, page_id).unwrap_or_else(|e| {
                warn!(page = number, error = %e, "Failed to extract text from page");
                String::new()
            }),
        };

        result.push(PdfPage {
            number,
            text: clean_text(&raw),
        });
    }

    if result.iter().all(|p| p.text.is_empty()) {
        return Err(IngestionError::PdfParseError {
            path: path.display().to_string(),
            message: "No text content extracted from PDF".to_string(),
        });
    }

    Ok(result)
}

/// Fallback: read text operators straight from the page content stream
fn extract_page_text(doc: &Document, page_id: ObjectId) -> Result<String, String> {
    let content = doc.get_page_content(page_id).map_err(|e| e.to_string())?;
    Ok(extract_text_from_content(&content))
}

/// Extract text from PDF content stream
fn extract_text_from_content(content: &[u8]) -> String {
    // Text lives between BT and ET operators
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let trimmed = line.trim();

        if trimmed == "BT" {
            in_text_block = true;
            continue;
        }

        if trimmed == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push(' ');
                current_text.clear();
            }
            continue;
        }

        if in_text_block {
            if let Some(text_content) = extract_text_from_operator(trimmed) {
                current_text.push_str(&text_content);
            }
        }
    }

    text
}

/// Extract text from a PDF text operator
fn extract_text_from_operator(line: &str) -> Option<String> {
    // (text) Tj, (text) ', (text) "
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        let start = line.find('(')?;
        let end = line.rfind(')')?;
        if end > start {
            return Some(decode_pdf_string(&line[start + 1..end]));
        }
    }

    // [(text) num (text) num] TJ
    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut in_paren = false;
        let mut current = String::new();

        for ch in line.chars() {
            match ch {
                '(' => in_paren = true,
                ')' => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => current.push(ch),
                _ => {}
            }
        }

        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

/// Decode PDF string escapes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Collapse whitespace and normalize typographic quotes
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{FEFF}', "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let input = "Hello   World\n\n\u{201C}Test\u{201D} it\u{2019}s";
        assert_eq!(clean_text(input), "Hello World \"Test\" it's");
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
    }

    #[test]
    fn test_content_stream_fallback() {
        let content = b"BT\n/F1 12 Tf\n(Claim CLM-2024-001) Tj\nET\nBT\n[(Total ) -20 (12,500)] TJ\nET\n";
        let text = extract_text_from_content(content);
        assert_eq!(clean_text(&text), "Claim CLM-2024-001 Total 12,500");
    }

    #[test]
    fn test_missing_file() {
        let err = extract_pages(Path::new("/nonexistent/claim.pdf")).unwrap_err();
        assert!(matches!(err, IngestionError::FileNotFound(_)));
    }
}
