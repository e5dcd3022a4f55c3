//! Tender Autofill Library
//!
//! Differential field extraction and template filling for tender PDF forms:
//! - `extract_cover_metadata`: title, reference, issuing body and date from the cover page
//! - `extract_template_and_values`: diff a filled form against its blank, name the added values
//!   and learn a reusable template
//! - `fill_with_profile`: stamp profile values onto a blank using a stored template or
//!   explicit coordinates
//! - `validate_completeness`: check a profile against the 23-key vocabulary
//!
//! The library is byte-stream in, bytes or structured data out. The binary
//! wraps it in a stdio MCP server (see [`server`]).

pub mod align;
pub mod cancel;
pub mod cluster;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod fields;
pub mod fill;
pub mod identify;
pub mod labels;
pub mod model;
pub mod pdf;
pub mod scanner;
pub mod server;
pub mod signature;
pub mod source;
pub mod store;

pub use cancel::CancelFlag;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use fields::{flatten_profile, validate_completeness, CompletenessReport, FieldKey};
pub use labels::LabelDictionary;
pub use model::{
    CoverMetadata, Document, ExtractionResult, Outcome, Page, Placement, Region, SlotKey,
    Template, TextToken, Warning,
};
pub use pdf::{PdfBackend, PdfiumBackend};
pub use server::{run_server, run_server_with_config, AutofillServer, PdfSource, ServerConfig};
pub use store::TemplateStore;
