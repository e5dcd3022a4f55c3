//! qpdf FFI wrapper for output validation
//!
//! Every rendered document is re-opened with qpdf (an independent parser),
//! its page count checked, and rewritten with compressed object streams.

use crate::error::{Error, Result};
use qpdf::{ObjectStreamMode, QPdf};

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// Map qpdf crate errors to our error types
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::EncryptedDocument,
        _ => Error::Qpdf {
            reason: e.to_string(),
        },
    }
}

impl QpdfWrapper {
    /// Get the page count of a PDF
    pub fn page_count(input_data: &[u8]) -> Result<u32> {
        let qpdf = QPdf::read_from_memory(input_data).map_err(map_qpdf_error)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }

    /// Re-open a freshly written PDF, verify it still has `expected_pages`
    /// pages and rewrite it compactly
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes produced by the renderer
    /// * `expected_pages` - Page count of the blank the output was drawn on
    ///
    /// # Returns
    /// The normalized PDF as bytes
    pub fn finalize(input_data: &[u8], expected_pages: usize) -> Result<Vec<u8>> {
        let qpdf = QPdf::read_from_memory(input_data).map_err(|e| Error::Qpdf {
            reason: format!("Rendered output does not re-open: {}", e),
        })?;

        let pages = qpdf.get_num_pages().map_err(map_qpdf_error)? as usize;
        if pages != expected_pages {
            return Err(Error::Qpdf {
                reason: format!(
                    "Rendered output has {} pages, expected {}",
                    pages, expected_pages
                ),
            });
        }

        let mut writer = qpdf.writer();
        writer
            .object_stream_mode(ObjectStreamMode::Generate)
            .compress_streams(true)
            .preserve_unreferenced_objects(false)
            .preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }
}
