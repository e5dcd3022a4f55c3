//! Differencing engine: tokens present on the filled page but not the blank

use crate::config::EngineConfig;
use crate::labels::{is_leader_only, normalize_whitespace};
use crate::model::{Page, TextToken};
use std::collections::HashMap;

/// Inserted tokens of `filled` relative to `blank`, in filled reading order.
///
/// One greedy pass: each filled token consumes at most one unmatched blank
/// token with the same normalized text, within `position_tolerance` on both
/// axes and `font_size_tolerance` in size. When several blank tokens
/// qualify the nearest wins, then the earliest. Pages where the filled side
/// has fewer tokens than the blank yield no insertions.
pub fn diff(blank: &Page, filled: &Page, config: &EngineConfig) -> Vec<TextToken> {
    if filled.tokens.len() < blank.tokens.len() {
        tracing::debug!(
            page = blank.index,
            blank = blank.tokens.len(),
            filled = filled.tokens.len(),
            "filled page has fewer tokens; no insertions"
        );
        return Vec::new();
    }

    let mut pool: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, token) in blank.tokens.iter().enumerate() {
        pool.entry(normalize_whitespace(&token.text)).or_default().push(i);
    }
    let mut consumed = vec![false; blank.tokens.len()];
    let mut insertions = Vec::new();

    for token in &filled.tokens {
        let key = normalize_whitespace(&token.text);
        if key.is_empty() || (config.ignore_leader_tokens && is_leader_only(&key)) {
            continue;
        }

        let best = pool.get(&key).and_then(|candidates| {
            let mut best: Option<(usize, f32)> = None;
            for &i in candidates {
                if consumed[i] {
                    continue;
                }
                let other = &blank.tokens[i];
                let dx = (token.x - other.x).abs();
                let dy = (token.y - other.y).abs();
                if dx > config.position_tolerance
                    || dy > config.position_tolerance
                    || (token.font_size - other.font_size).abs() > config.font_size_tolerance
                {
                    continue;
                }
                let distance = (dx * dx + dy * dy).sqrt();
                // Strict comparison keeps the earliest index on ties
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((i, distance));
                }
            }
            best
        });

        match best {
            Some((i, _)) => consumed[i] = true,
            None => insertions.push(token.clone()),
        }
    }

    tracing::debug!(page = blank.index, insertions = insertions.len(), "diffed page");
    insertions
}
