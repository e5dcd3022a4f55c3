//! Document sources for the host: paths, inline base64 and cached outputs

pub mod cache;
pub mod resolver;

pub use cache::OutputCache;
pub use resolver::{resolve_base64, resolve_cache, resolve_path, ResolvedPdf};
