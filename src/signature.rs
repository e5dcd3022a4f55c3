//! Structural fingerprint of a blank document

use crate::labels::normalize_whitespace;
use crate::model::Document;
use sha2::{Digest, Sha256};

/// Bumped whenever the hashed layout changes, so stale templates miss
const SIGNATURE_VERSION: &str = "v1";

/// Compute the template-store key for `document`.
///
/// The hash is defined as:
/// `SHA-256( page_count || per page: rounded size, token count, then every
/// token's normalized text and rounded origin )`, hex-encoded and prefixed
/// with the signature version.
pub fn signature(document: &Document) -> String {
    let mut hasher = Sha256::new();
    hasher.update((document.page_count() as u64).to_be_bytes());

    for page in &document.pages {
        hasher.update([0]);
        hasher.update((page.width.round() as i64).to_be_bytes());
        hasher.update((page.height.round() as i64).to_be_bytes());
        hasher.update((page.tokens.len() as u64).to_be_bytes());

        for token in &page.tokens {
            hasher.update([1]);
            hasher.update(normalize_whitespace(&token.text).as_bytes());
            hasher.update([0]);
            hasher.update((token.x.round() as i64).to_be_bytes());
            hasher.update((token.y.round() as i64).to_be_bytes());
        }
    }

    format!("{}:{}", SIGNATURE_VERSION, hex::encode(hasher.finalize()))
}
