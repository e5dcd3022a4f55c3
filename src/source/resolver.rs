//! Source resolution for document bytes

use crate::error::{Error, Result};
use crate::pdf::check_header;
use crate::source::OutputCache;
use base64::Engine;
use std::path::Path;

/// Document bytes plus a display name safe to echo back to clients
pub struct ResolvedPdf {
    pub data: Vec<u8>,
    pub source_name: String,
}

/// Read a document from disk
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path)?;
    check_header(&data)?;

    Ok(ResolvedPdf {
        data,
        source_name: path.display().to_string(),
    })
}

/// Decode an inline base64 document
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedPdf> {
    let data = base64::engine::general_purpose::STANDARD.decode(base64_data.trim())?;
    check_header(&data)?;

    Ok(ResolvedPdf {
        data,
        source_name: "<base64>".to_string(),
    })
}

/// Fetch a previously produced output by its cache key
pub fn resolve_cache(cache_key: &str, cache: &OutputCache) -> Result<ResolvedPdf> {
    let data = cache
        .get(cache_key)
        .ok_or_else(|| Error::CacheKeyNotFound {
            key: cache_key.to_string(),
        })?;

    Ok(ResolvedPdf {
        data,
        source_name: format!("<cache:{}>", cache_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_base64_not_a_pdf() {
        // "Hello World"
        let result = resolve_base64("SGVsbG8gV29ybGQ=");
        assert!(matches!(result, Err(Error::MalformedDocument { .. })));
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!");
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_base64_keeps_bytes() {
        // "%PDF-1.7\n"
        let resolved = resolve_base64("JVBERi0xLjcK").unwrap();
        assert_eq!(resolved.data, b"%PDF-1.7\n");
        assert_eq!(resolved.source_name, "<base64>");
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/tender/form.pdf");
        assert!(matches!(result, Err(Error::PdfNotFound { .. })));
    }

    #[test]
    fn test_resolve_path_rejects_non_pdf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04 not a pdf").unwrap();
        let result = resolve_path(file.path());
        assert!(matches!(result, Err(Error::MalformedDocument { .. })));
    }

    #[test]
    fn test_resolve_cache_hit_and_miss() {
        let cache = OutputCache::new(4, 1024);
        cache.put("filled".to_string(), b"%PDF-1.7".to_vec());

        let hit = resolve_cache("filled", &cache).unwrap();
        assert_eq!(hit.source_name, "<cache:filled>");
        assert!(matches!(
            resolve_cache("gone", &cache),
            Err(Error::CacheKeyNotFound { .. })
        ));
    }
}
