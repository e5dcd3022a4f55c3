//! PDF processing layer
//!
//! The engine only sees the [`PdfBackend`] trait. [`PdfiumBackend`] is the
//! production implementation: PDFium reads positioned text and draws values,
//! qpdf validates and normalizes every document it writes.

mod qpdf;
mod reader;
mod writer;

pub use qpdf::QpdfWrapper;
pub use reader::{check_header, extract_document, into_reading_order};
pub use writer::draw_placements;

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::model::{Document, Placement};
use pdfium_render::prelude::*;
use std::path::PathBuf;

/// Byte-stream access to a page-oriented document format
pub trait PdfBackend: Send + Sync {
    /// Parse a document into positioned text tokens.
    ///
    /// Implementations check `cancel` between pages.
    fn extract(&self, data: &[u8], cancel: &CancelFlag) -> Result<Document>;

    /// Draw `placements` onto a copy of `data` and return the new document
    fn render(&self, data: &[u8], placements: &[Placement]) -> Result<Vec<u8>>;
}

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
fn create_pdfium(library_dir: Option<&PathBuf>) -> Result<Pdfium> {
    let preferred = library_dir
        .map(|dir| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)));

    let bindings = match preferred {
        Some(Ok(bindings)) => Ok(bindings),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                    "/opt/pdfium/lib",
                ))
            })
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Error::Pdfium {
        reason: format!("Failed to initialize PDFium: {}", e),
    })?;

    Ok(Pdfium::new(bindings))
}

/// PDFium + qpdf backend
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for the PDFium shared library in `dir` before the default locations
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    /// Whether a PDFium library can be bound at all
    pub fn is_available(&self) -> bool {
        create_pdfium(self.library_dir.as_ref()).is_ok()
    }
}

impl PdfBackend for PdfiumBackend {
    fn extract(&self, data: &[u8], cancel: &CancelFlag) -> Result<Document> {
        reader::check_header(data)?;
        let pdfium = create_pdfium(self.library_dir.as_ref())?;
        extract_document(&pdfium, data, cancel)
    }

    fn render(&self, data: &[u8], placements: &[Placement]) -> Result<Vec<u8>> {
        reader::check_header(data)?;
        let expected_pages = QpdfWrapper::page_count(data)? as usize;

        let pdfium = create_pdfium(self.library_dir.as_ref())?;
        let drawn = draw_placements(&pdfium, data, placements)?;

        QpdfWrapper::finalize(&drawn, expected_pages)
    }
}
