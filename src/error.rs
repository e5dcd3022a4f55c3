//! Error types for the tender autofill engine

use thiserror::Error;

/// Result type alias for the tender autofill engine
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the tender autofill engine
///
/// Structural failures (anything that makes the input unusable as a whole)
/// abort the operation. Per-field problems are never errors; they travel as
/// [`crate::model::Warning`]s inside an [`crate::model::Outcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// The byte stream is not a parsable PDF
    #[error("Malformed document: {reason}")]
    MalformedDocument { reason: String },

    /// Content streams cannot be decoded without a password
    #[error("Document is encrypted")]
    EncryptedDocument,

    /// The document parsed but has no pages
    #[error("Document has no pages")]
    EmptyDocument,

    /// Blank and filled documents are not comparable
    #[error("Page count mismatch: blank has {blank} pages, filled has {filled}")]
    PageCountMismatch { blank: usize, filled: usize },

    /// Neither a stored template nor explicit coordinates exist for a fill
    #[error("No template available for signature {signature}")]
    NoTemplateAvailable { signature: String },

    /// The caller aborted the operation between pages
    #[error("Operation cancelled")]
    Cancelled,

    /// Field key outside the fixed vocabulary
    #[error("Unknown field key: {key}")]
    UnknownFieldKey { key: String },

    /// Label dictionary could not be loaded
    #[error("Invalid label table: {reason}")]
    InvalidLabelTable { reason: String },

    /// Company profile is not shaped like a profile
    #[error("Invalid profile: {reason}")]
    InvalidProfile { reason: String },

    /// Engine configuration could not be loaded
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// qpdf error
    #[error("qpdf error: {reason}")]
    Qpdf { reason: String },

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::MalformedDocument { .. } => "Document is not a valid PDF".to_string(),
            Error::EncryptedDocument => {
                "Document is encrypted; supply an unencrypted copy".to_string()
            }
            Error::EmptyDocument => "Document has no pages".to_string(),
            Error::PageCountMismatch { blank, filled } => format!(
                "Documents are not comparable: blank has {} pages, filled has {}",
                blank, filled
            ),
            Error::NoTemplateAvailable { .. } => {
                "No template for this document; supply explicit field coordinates".to_string()
            }
            Error::Cancelled => "Operation cancelled".to_string(),
            Error::UnknownFieldKey { key } => format!("Unknown field key: {}", key),
            Error::InvalidLabelTable { .. } => "Invalid label table".to_string(),
            Error::InvalidProfile { reason } => format!("Invalid profile: {}", reason),
            Error::InvalidConfig { .. } => "Invalid configuration".to_string(),
            Error::Pdfium { .. } => "PDF processing error".to_string(),
            Error::Qpdf { .. } => "PDF processing error".to_string(),
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
        }
    }

    /// Whether this error is a structural failure of the input documents
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::MalformedDocument { .. }
                | Error::EncryptedDocument
                | Error::EmptyDocument
                | Error::PageCountMismatch { .. }
        )
    }
}
