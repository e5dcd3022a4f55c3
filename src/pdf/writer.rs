//! Draw text placements onto an existing document with PDFium

use super::reader::load_document;
use crate::error::{Error, Result};
use crate::model::Placement;
use pdfium_render::prelude::*;

/// Share of the font size between the top of a line box and its baseline
const ASCENT_RATIO: f32 = 0.8;

/// Draw every placement as a Helvetica text object and save the result.
///
/// Placement coordinates are top-left origin; `y` is the top of the line.
pub fn draw_placements(pdfium: &Pdfium, data: &[u8], placements: &[Placement]) -> Result<Vec<u8>> {
    let mut document = load_document(pdfium, data)?;
    let font = document.fonts_mut().helvetica();

    for placement in placements {
        let index = PdfPageIndex::try_from(placement.page_index).map_err(|_| Error::Pdfium {
            reason: format!("page index {} out of range", placement.page_index),
        })?;
        let mut page = document.pages().get(index).map_err(|e| Error::Pdfium {
            reason: format!("Failed to get page {}: {}", placement.page_index + 1, e),
        })?;

        let page_height = page.height().value;
        let baseline = page_height - (placement.y + placement.font_size * ASCENT_RATIO);

        page.objects_mut()
            .create_text_object(
                PdfPoints::new(placement.x),
                PdfPoints::new(baseline),
                &placement.text,
                font,
                PdfPoints::new(placement.font_size),
            )
            .map_err(|e| Error::Pdfium {
                reason: format!(
                    "Failed to draw text on page {}: {}",
                    placement.page_index + 1,
                    e
                ),
            })?;
    }

    document.save_to_bytes().map_err(|e| Error::Pdfium {
        reason: format!("Failed to save filled PDF: {}", e),
    })
}
