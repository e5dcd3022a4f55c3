//! Metadata scanner: label-anchored search on the cover page

use crate::config::EngineConfig;
use crate::labels::{normalize_whitespace, CoverField, LabelDictionary};
use crate::model::{CoverMetadata, Page, TextToken};
use chrono::NaiveDate;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B, %Y",
];

/// Read title, reference number, issuing body and date from `page`.
///
/// Each line is split into phrases at wide gaps. A phrase starting with a
/// cover label yields the text after the label; a bare label takes the next
/// phrase, on the same line or the line below. The first hit per field
/// wins. Without an organization label, the first phrase naming a known
/// issuing body supplies it. Missing fields stay empty (`date` stays `None`).
pub fn scan_cover_page(
    page: &Page,
    labels: &LabelDictionary,
    config: &EngineConfig,
) -> CoverMetadata {
    let phrases = phrase_texts(&page.tokens, config);
    let mut meta = CoverMetadata::default();

    for (i, phrase) in phrases.iter().enumerate() {
        let Some((field, remainder)) = labels.match_cover(phrase) else {
            continue;
        };
        let value = if remainder.is_empty() {
            match phrases.get(i + 1) {
                Some(next) if labels.match_cover(next).is_none() => next.clone(),
                _ => continue,
            }
        } else {
            remainder
        };

        match field {
            CoverField::Title if meta.title.is_empty() => meta.title = value,
            CoverField::ReferenceNumber if meta.reference_number.is_empty() => {
                meta.reference_number = value
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
            }
            CoverField::Organization if meta.organization.is_empty() => {
                meta.organization = value
            }
            CoverField::Date if meta.date.is_none() => meta.date = Some(normalize_date(&value)),
            _ => {}
        }
    }

    if meta.organization.is_empty() {
        if let Some(name) = phrases.iter().find_map(|p| labels.organization_in(p)) {
            meta.organization = name.to_string();
        }
    }

    tracing::debug!(
        title = %meta.title,
        reference = %meta.reference_number,
        organization = %meta.organization,
        "scanned cover page"
    );
    meta
}

/// Phrase texts in reading order: same-line runs of tokens split at gaps
/// wider than `cluster_horizontal_gap_factor` line heights
fn phrase_texts(tokens: &[TextToken], config: &EngineConfig) -> Vec<String> {
    let mut phrases: Vec<Vec<&TextToken>> = Vec::new();
    for token in tokens {
        let joins = phrases.last().and_then(|p| p.last()).map_or(false, |prev| {
            let height = prev.height.max(token.height);
            prev.same_line(token)
                && token.x - prev.right() <= config.cluster_horizontal_gap_factor * height
        });
        match phrases.last_mut() {
            Some(phrase) if joins => phrase.push(token),
            _ => phrases.push(vec![token]),
        }
    }

    phrases
        .into_iter()
        .map(|p| {
            let joined = p.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
            normalize_whitespace(&joined)
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// ISO-8601 when a known date format parses a leading part of `value`,
/// otherwise `value` unchanged
pub fn normalize_date(value: &str) -> String {
    let cleaned = strip_ordinals(value);
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    for n in (1..=words.len().min(4)).rev() {
        let candidate = words[..n].join(" ");
        let candidate = candidate.trim_end_matches(|c: char| c == ',' || c == '.');
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return date.format("%Y-%m-%d").to_string();
            }
        }
    }
    value.to_string()
}

/// "12th" -> "12", leaving other words alone
fn strip_ordinals(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let lower = word.to_ascii_lowercase();
            for suffix in ["st", "nd", "rd", "th"] {
                if let Some(digits) = lower.strip_suffix(suffix) {
                    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                        return digits.to_string();
                    }
                }
            }
            word.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn line(words: &[&str], y: f32) -> Vec<TextToken> {
        let mut x = 40.0;
        words
            .iter()
            .map(|w| {
                let width = 6.0 * w.chars().count() as f32;
                let token = TextToken {
                    text: w.to_string(),
                    x,
                    y,
                    width,
                    height: 12.0,
                    font_size: 12.0,
                    page_index: 0,
                };
                x += width + 4.0;
                token
            })
            .collect()
    }

    fn page(lines: Vec<Vec<TextToken>>) -> Page {
        Page {
            index: 0,
            width: 595.0,
            height: 842.0,
            tokens: lines.into_iter().flatten().collect(),
        }
    }

    #[test]
    fn test_scan_full_cover() {
        let page = page(vec![
            line(&["KENYA", "URBAN", "ROADS", "AUTHORITY"], 40.0),
            line(&["TENDER", "FOR", "CONSTRUCTION", "OF", "MBALE", "ROAD"], 80.0),
            line(&["TENDER", "NO:", "KURA/2024/001"], 110.0),
            line(&["Procuring", "Entity:"], 140.0),
            line(&["Kenya", "Urban", "Roads", "Authority"], 160.0),
            line(&["Closing", "Date:", "12th", "March", "2024", "at", "10:00"], 200.0),
        ]);
        let meta = scan_cover_page(
            &page,
            &LabelDictionary::builtin().unwrap(),
            &EngineConfig::default(),
        );
        assert_eq!(
            meta,
            CoverMetadata {
                title: "CONSTRUCTION OF MBALE ROAD".to_string(),
                reference_number: "KURA/2024/001".to_string(),
                organization: "Kenya Urban Roads Authority".to_string(),
                date: Some("2024-03-12".to_string()),
            }
        );
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let page = page(vec![line(&["Section", "I:", "Instructions"], 40.0)]);
        let meta = scan_cover_page(
            &page,
            &LabelDictionary::builtin().unwrap(),
            &EngineConfig::default(),
        );
        assert_eq!(meta, CoverMetadata::default());
    }

    #[test]
    fn test_unlabelled_issuing_body() {
        let page = page(vec![
            line(&["REPUBLIC", "OF", "KENYA"], 20.0),
            line(&["KENYA", "URBAN", "ROADS", "AUTHORITY"], 40.0),
            line(&["TENDER", "NO:", "KURA/2024/001"], 80.0),
        ]);
        let meta = scan_cover_page(
            &page,
            &LabelDictionary::builtin().unwrap(),
            &EngineConfig::default(),
        );
        assert_eq!(meta.organization, "Kenya Urban Roads Authority");
        assert_eq!(meta.reference_number, "KURA/2024/001");
    }

    #[test]
    fn test_labelled_organization_beats_known_names() {
        let page = page(vec![
            line(&["MINISTRY", "OF", "TRANSPORT"], 20.0),
            line(&["Procuring", "Entity:", "County", "Government", "of", "Kisumu"], 60.0),
        ]);
        let meta = scan_cover_page(
            &page,
            &LabelDictionary::builtin().unwrap(),
            &EngineConfig::default(),
        );
        assert_eq!(meta.organization, "County Government of Kisumu");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let page = page(vec![
            line(&["REF:", "A/1"], 40.0),
            line(&["REF:", "B/2"], 80.0),
        ]);
        let meta = scan_cover_page(
            &page,
            &LabelDictionary::builtin().unwrap(),
            &EngineConfig::default(),
        );
        assert_eq!(meta.reference_number, "A/1");
    }

    #[rstest]
    #[case("2024-03-12", "2024-03-12")]
    #[case("12/03/2024", "2024-03-12")]
    #[case("12 March 2024", "2024-03-12")]
    #[case("March 12, 2024", "2024-03-12")]
    #[case("1st April 2024 at noon", "2024-04-01")]
    #[case("upon award", "upon award")]
    fn test_normalize_date(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_date(input), expected);
    }
}
