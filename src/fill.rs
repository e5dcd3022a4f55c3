//! Filler layout: turns field values into text placements inside regions

use crate::config::EngineConfig;
use crate::fields::FieldKey;
use crate::model::{Document, Outcome, Placement, Region, Warning};
use std::collections::BTreeMap;

/// Smallest font the filler will draw with
const MIN_FONT_SIZE: f32 = 4.0;

/// Lay out `values` into `regions` on `blank`.
///
/// Values are wrapped to the region width using an average glyph advance
/// and cut after the last line that fits the region height. Nothing here
/// fails: every value that cannot be drawn in full yields a warning.
pub fn layout(
    blank: &Document,
    regions: &BTreeMap<FieldKey, Region>,
    values: &BTreeMap<FieldKey, String>,
    config: &EngineConfig,
) -> Outcome<Vec<Placement>> {
    let mut placements = Vec::new();
    let mut warnings = Vec::new();

    for (field, value) in values {
        let Some(region) = regions.get(field) else {
            warnings.push(Warning::ValueWithoutRegion { field: *field });
            continue;
        };
        let Some(page) = blank.page(region.page_index) else {
            warnings.push(Warning::ValueWithoutRegion { field: *field });
            continue;
        };
        if value.trim().is_empty() {
            warnings.push(Warning::EmptyValue { field: *field });
            continue;
        }

        let mut region = *region;
        if !region.is_within(page.width, page.height) {
            warnings.push(Warning::RegionClipped { field: *field });
            region = region.clipped_to(page.width, page.height);
        }

        let font_size = config.fill_font_size.min(region.height).max(MIN_FONT_SIZE);
        let line_height = font_size * config.fill_line_spacing;
        let max_chars =
            ((region.width / (font_size * config.fill_glyph_width)).floor() as usize).max(1);
        let lines = wrap(value, max_chars);

        let fits = if region.height + f32::EPSILON < font_size || region.width <= 0.0 {
            0
        } else {
            ((region.height - font_size) / line_height + 1e-3).floor() as usize + 1
        };

        if lines.len() > fits {
            warnings.push(Warning::ValueTruncated {
                field: *field,
                lines_drawn: fits,
                lines_total: lines.len(),
            });
        }

        for (i, text) in lines.into_iter().take(fits).enumerate() {
            placements.push(Placement {
                page_index: region.page_index,
                x: region.x,
                y: region.y + i as f32 * line_height,
                font_size,
                text,
            });
        }
    }

    tracing::debug!(
        placements = placements.len(),
        warnings = warnings.len(),
        "laid out values"
    );
    Outcome::new(placements, warnings)
}

/// Greedy word wrap at `max_chars` per line; explicit newlines are kept and
/// words longer than a line are split
pub fn wrap(value: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in value.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = chars.split_off(max_chars);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }

            let needed = if current_len == 0 {
                chars.len()
            } else {
                current_len + 1 + chars.len()
            };
            if needed > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += chars.len();
            current.extend(chars);
        }

        if current_len > 0 {
            lines.push(current);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Page;
    use pretty_assertions::assert_eq;

    fn blank() -> Document {
        Document {
            pages: vec![Page {
                index: 0,
                width: 595.0,
                height: 842.0,
                tokens: vec![],
            }],
        }
    }

    fn one(field: FieldKey, region: Region) -> BTreeMap<FieldKey, Region> {
        [(field, region)].into_iter().collect()
    }

    fn value(field: FieldKey, text: &str) -> BTreeMap<FieldKey, String> {
        [(field, text.to_string())].into_iter().collect()
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("Acme Constructors Ltd", 40), vec!["Acme Constructors Ltd"]);
        assert_eq!(
            wrap("Acme Constructors Ltd", 10),
            vec!["Acme", "Constructo", "rs Ltd"]
        );
        assert_eq!(wrap("12 Moi Avenue\nNairobi", 40), vec!["12 Moi Avenue", "Nairobi"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_single_line_placement() {
        let outcome = layout(
            &blank(),
            &one(FieldKey::CompanyName, Region::new(0, 100.0, 200.0, 300.0, 20.0)),
            &value(FieldKey::CompanyName, "Acme Constructors Ltd"),
            &EngineConfig::default(),
        );
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            outcome.value,
            vec![Placement {
                page_index: 0,
                x: 100.0,
                y: 200.0,
                font_size: 10.0,
                text: "Acme Constructors Ltd".to_string(),
            }]
        );
    }

    #[test]
    fn test_overflow_truncated_at_last_full_line() {
        // 100pt wide at 10pt/0.5 -> 20 chars per line; 20pt tall -> 1 line
        let outcome = layout(
            &blank(),
            &one(FieldKey::Address, Region::new(0, 100.0, 300.0, 100.0, 20.0)),
            &value(FieldKey::Address, "Plot 42 Moi Avenue, Industrial Area, Nairobi"),
            &EngineConfig::default(),
        );
        assert_eq!(outcome.value.len(), 1);
        assert_eq!(
            outcome.warnings,
            vec![Warning::ValueTruncated {
                field: FieldKey::Address,
                lines_drawn: 1,
                lines_total: 3,
            }]
        );
    }

    #[test]
    fn test_multi_line_region() {
        let outcome = layout(
            &blank(),
            &one(FieldKey::Address, Region::new(0, 100.0, 300.0, 100.0, 40.0)),
            &value(FieldKey::Address, "12 Moi Avenue\nNairobi"),
            &EngineConfig::default(),
        );
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.value.len(), 2);
        assert_eq!(outcome.value[0].y, 300.0);
        assert!((outcome.value[1].y - 312.0).abs() < 1e-3);
        assert_eq!(outcome.value[1].text, "Nairobi");
    }

    #[test]
    fn test_missing_region_and_empty_value_warn() {
        let mut values = value(FieldKey::Phone, "0712");
        values.insert(FieldKey::CompanyName, "  ".to_string());
        let outcome = layout(
            &blank(),
            &one(FieldKey::CompanyName, Region::new(0, 100.0, 200.0, 300.0, 20.0)),
            &values,
            &EngineConfig::default(),
        );
        assert!(outcome.value.is_empty());
        assert_eq!(
            outcome.warnings,
            vec![
                Warning::EmptyValue {
                    field: FieldKey::CompanyName
                },
                Warning::ValueWithoutRegion {
                    field: FieldKey::Phone
                },
            ]
        );
    }

    #[test]
    fn test_region_off_page_is_clipped() {
        let outcome = layout(
            &blank(),
            &one(FieldKey::Email, Region::new(0, 500.0, 200.0, 300.0, 20.0)),
            &value(FieldKey::Email, "a@b.co"),
            &EngineConfig::default(),
        );
        assert_eq!(
            outcome.warnings,
            vec![Warning::RegionClipped {
                field: FieldKey::Email
            }]
        );
        assert_eq!(outcome.value[0].x, 500.0);
    }
}
