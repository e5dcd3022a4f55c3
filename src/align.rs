//! Page aligner: pairs pages by index and removes small coordinate drift

use crate::cancel::CancelFlag;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::labels::normalize_whitespace;
use crate::model::{Document, Outcome, Page, Warning};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Offsets below this are rendering noise the differ absorbs on its own
const MIN_SHIFT: f32 = 0.5;
/// Unique text anchors needed before a drift estimate is trusted
const MIN_ANCHORS: usize = 2;

/// A blank page and its filled counterpart, expressed in blank coordinates
#[derive(Debug, Clone)]
pub struct PagePair<'a> {
    pub blank: &'a Page,
    pub filled: Page,
}

/// Pair `blank` and `filled` page by page.
///
/// Filled pages whose size differs from the blank within
/// `page_size_tolerance` are rescaled; a consistent offset of at most
/// `max_drift` points, measured on text present exactly once on both pages,
/// is subtracted. Every correction is reported as a warning.
pub fn align<'a>(
    blank: &'a Document,
    filled: &Document,
    config: &EngineConfig,
    cancel: &CancelFlag,
) -> Result<Outcome<Vec<PagePair<'a>>>> {
    if blank.page_count() != filled.page_count() {
        return Err(Error::PageCountMismatch {
            blank: blank.page_count(),
            filled: filled.page_count(),
        });
    }

    let mut pairs = Vec::with_capacity(blank.page_count());
    let mut warnings = Vec::new();

    for (blank_page, filled_page) in blank.pages.iter().zip(&filled.pages) {
        cancel.check()?;

        let mut page = filled_page.clone();
        page.index = blank_page.index;

        let (scale_x, scale_y) = page_scale(blank_page, filled_page, config);
        if scale_x != 1.0 || scale_y != 1.0 {
            for token in &mut page.tokens {
                token.x *= scale_x;
                token.y *= scale_y;
                token.width *= scale_x;
                token.height *= scale_y;
            }
            page.width = blank_page.width;
            page.height = blank_page.height;
        }

        let (dx, dy) = estimate_drift(blank_page, &page)
            .filter(|(dx, dy)| dx.abs() <= config.max_drift && dy.abs() <= config.max_drift)
            .map(|(dx, dy)| {
                (
                    if dx.abs() >= MIN_SHIFT { dx } else { 0.0 },
                    if dy.abs() >= MIN_SHIFT { dy } else { 0.0 },
                )
            })
            .unwrap_or((0.0, 0.0));
        if dx != 0.0 || dy != 0.0 {
            for token in &mut page.tokens {
                token.x += dx;
                token.y += dy;
            }
        }

        for token in &mut page.tokens {
            token.page_index = blank_page.index;
        }

        if dx != 0.0 || dy != 0.0 || scale_x != 1.0 || scale_y != 1.0 {
            tracing::debug!(page = blank_page.index, dx, dy, scale_x, scale_y, "corrected drift");
            warnings.push(Warning::PageGeometryDrift {
                page_index: blank_page.index,
                dx,
                dy,
                scale_x,
                scale_y,
            });
        }

        pairs.push(PagePair {
            blank: blank_page,
            filled: page,
        });
    }

    Ok(Outcome::new(pairs, warnings))
}

/// Scale factors mapping filled coordinates onto the blank page, or
/// `(1, 1)` when the sizes already agree or differ beyond tolerance
fn page_scale(blank: &Page, filled: &Page, config: &EngineConfig) -> (f32, f32) {
    if filled.width <= 0.0 || filled.height <= 0.0 {
        return (1.0, 1.0);
    }
    let scale_x = blank.width / filled.width;
    let scale_y = blank.height / filled.height;
    let within = |s: f32| (s - 1.0).abs() <= config.page_size_tolerance;

    if !within(scale_x) || !within(scale_y) {
        tracing::debug!(
            page = blank.index,
            scale_x,
            scale_y,
            "page sizes differ beyond tolerance; not rescaling"
        );
        return (1.0, 1.0);
    }
    if (scale_x - 1.0).abs() < f32::EPSILON && (scale_y - 1.0).abs() < f32::EPSILON {
        return (1.0, 1.0);
    }
    (scale_x, scale_y)
}

/// Median offset (blank minus filled) over texts occurring once on each page
fn estimate_drift(blank: &Page, filled: &Page) -> Option<(f32, f32)> {
    let blank_unique = unique_positions(blank);
    let filled_unique = unique_positions(filled);

    let mut dxs = Vec::new();
    let mut dys = Vec::new();
    for (text, (bx, by)) in &blank_unique {
        if let Some((fx, fy)) = filled_unique.get(text) {
            dxs.push(bx - fx);
            dys.push(by - fy);
        }
    }

    if dxs.len() < MIN_ANCHORS {
        return None;
    }
    Some((median(&mut dxs), median(&mut dys)))
}

fn unique_positions(page: &Page) -> BTreeMap<String, (f32, f32)> {
    let mut seen: BTreeMap<String, Option<(f32, f32)>> = BTreeMap::new();
    for token in &page.tokens {
        let text = normalize_whitespace(&token.text);
        if text.is_empty() {
            continue;
        }
        seen.entry(text)
            .and_modify(|slot| *slot = None)
            .or_insert(Some((token.x, token.y)));
    }
    seen.into_iter()
        .filter_map(|(text, pos)| pos.map(|p| (text, p)))
        .collect()
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    values[values.len() / 2]
}
