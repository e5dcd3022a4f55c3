//! Positioned text extraction with PDFium
//!
//! Every page becomes a list of word-level [`TextToken`]s in reading order.
//! Characters come from PDFium's text segments; words are split on
//! whitespace, on line changes and on horizontal gaps wider than a space.

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::model::{Document, Page, TextToken};
use pdfium_render::prelude::*;
use std::cmp::Ordering;

/// Character information collected from page text
#[derive(Debug, Clone)]
struct CharInfo {
    ch: char,
    /// Left edge, PDF user space
    left: f32,
    right: f32,
    /// Top edge, PDF user space (bottom-left origin)
    top: f32,
    bottom: f32,
}

impl CharInfo {
    fn height(&self) -> f32 {
        (self.top - self.bottom).max(0.0)
    }
}

/// Load a document and map PDFium failures onto the structural error kinds
pub(crate) fn load_document<'a>(pdfium: &'a Pdfium, data: &'a [u8]) -> Result<PdfDocument<'a>> {
    check_header(data)?;
    pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(map_pdfium_error)
}

/// Cheap rejection of byte streams that are not PDFs at all
pub fn check_header(data: &[u8]) -> Result<()> {
    if data.len() < 5 || &data[0..5] != b"%PDF-" {
        return Err(Error::MalformedDocument {
            reason: "missing %PDF- header".to_string(),
        });
    }
    Ok(())
}

fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::EncryptedDocument
        }
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError)
        | PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FileError) => {
            Error::MalformedDocument {
                reason: format!("{}", err),
            }
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

/// Parse `data` into a [`Document`], checking `cancel` between pages
pub fn extract_document(pdfium: &Pdfium, data: &[u8], cancel: &CancelFlag) -> Result<Document> {
    let document = load_document(pdfium, data)?;
    let pages = document.pages();
    if pages.len() == 0 {
        return Err(Error::EmptyDocument);
    }

    let mut out = Vec::with_capacity(pages.len() as usize);
    for (index, page) in pages.iter().enumerate() {
        cancel.check()?;

        let width = page.width().value;
        let height = page.height().value;
        let text = page.text().map_err(|e| Error::Pdfium {
            reason: format!("Failed to read text of page {}: {}", index + 1, e),
        })?;

        let chars = collect_chars(&text);
        let tokens = into_reading_order(words_from_chars(&chars, index, height));
        tracing::debug!(page = index, tokens = tokens.len(), "extracted page");

        out.push(Page {
            index,
            width,
            height,
            tokens,
        });
    }

    Ok(Document { pages: out })
}

/// Collect characters in content-stream order
fn collect_chars(text: &PdfPageText) -> Vec<CharInfo> {
    let mut chars = Vec::new();

    for segment in text.segments().iter() {
        if let Ok(char_iter) = segment.chars() {
            for char_result in char_iter.iter() {
                if let Some(ch) = char_result.unicode_char() {
                    if let Ok(bounds) = char_result.loose_bounds() {
                        chars.push(CharInfo {
                            ch,
                            left: bounds.left().value,
                            right: bounds.right().value,
                            top: bounds.top().value,
                            bottom: bounds.bottom().value,
                        });
                    }
                }
            }
        }
    }

    chars
}

/// Median character height; drives the word-gap threshold
fn median_char_height(chars: &[CharInfo]) -> f32 {
    let mut heights: Vec<f32> = chars
        .iter()
        .map(CharInfo::height)
        .filter(|h| *h > 0.0)
        .collect();
    if heights.is_empty() {
        return 10.0;
    }
    heights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    heights[heights.len() / 2]
}

fn words_from_chars(chars: &[CharInfo], page_index: usize, page_height: f32) -> Vec<TextToken> {
    let median = median_char_height(chars);
    let y_tolerance = (median * 0.4).max(2.0);
    let space_threshold = (median * 0.3).max(3.0);

    let mut words = Vec::new();
    let mut current: Vec<&CharInfo> = Vec::new();

    for info in chars {
        if info.ch.is_whitespace() || info.ch.is_control() {
            flush_word(&mut current, &mut words, page_index, page_height);
            continue;
        }
        if let Some(last) = current.last() {
            let new_line = (last.top - info.top).abs() > y_tolerance;
            let gap = info.left - last.right;
            if new_line || gap > space_threshold || gap < -space_threshold {
                flush_word(&mut current, &mut words, page_index, page_height);
            }
        }
        current.push(info);
    }
    flush_word(&mut current, &mut words, page_index, page_height);

    words
}

fn flush_word(
    current: &mut Vec<&CharInfo>,
    words: &mut Vec<TextToken>,
    page_index: usize,
    page_height: f32,
) {
    if current.is_empty() {
        return;
    }
    let text: String = current.iter().map(|c| c.ch).collect();
    let left = current.iter().map(|c| c.left).fold(f32::MAX, f32::min);
    let right = current.iter().map(|c| c.right).fold(f32::MIN, f32::max);
    let top = current.iter().map(|c| c.top).fold(f32::MIN, f32::max);
    let bottom = current.iter().map(|c| c.bottom).fold(f32::MAX, f32::min);
    // Average char height stands in for the font size
    let font_size = current.iter().map(|c| c.height()).sum::<f32>() / current.len() as f32;

    words.push(TextToken {
        text,
        x: left,
        y: page_height - top,
        width: (right - left).max(0.0),
        height: (top - bottom).max(0.0),
        font_size,
        page_index,
    });
    current.clear();
}

/// Sort tokens top-to-bottom into line bands, then left-to-right
pub fn into_reading_order(tokens: Vec<TextToken>) -> Vec<TextToken> {
    if tokens.is_empty() {
        return tokens;
    }

    let mut heights: Vec<f32> = tokens.iter().map(|t| t.height).filter(|h| *h > 0.0).collect();
    heights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let median = heights.get(heights.len() / 2).copied().unwrap_or(10.0);
    let y_tolerance = (median * 0.4).max(2.0);

    let center = |t: &TextToken| t.y + t.height / 2.0;
    let mut sorted = tokens;
    sorted.sort_by(|a, b| {
        center(a)
            .partial_cmp(&center(b))
            .unwrap_or(Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
    });

    let mut lines: Vec<Vec<TextToken>> = Vec::new();
    let mut line_y: Option<f32> = None;
    for token in sorted {
        let c = center(&token);
        let same_band = line_y.map_or(false, |y| (c - y).abs() <= y_tolerance);
        match lines.last_mut() {
            Some(line) if same_band => line.push(token),
            _ => {
                line_y = Some(c);
                lines.push(vec![token]);
            }
        }
    }

    lines
        .into_iter()
        .flat_map(|mut line| {
            line.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
            line
        })
        .collect()
}
