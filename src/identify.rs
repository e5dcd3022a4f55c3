//! Field identifier: names clusters by template overlap or label proximity

use crate::config::EngineConfig;
use crate::fields::FieldKey;
use crate::labels::{is_leader_only, LabelDictionary};
use crate::model::{
    Document, FieldCluster, Outcome, Page, Region, SlotKey, Template, TextToken, Warning,
};
use std::collections::BTreeMap;

/// Longest label phrase tried, in words
const MAX_LABEL_WORDS: usize = 8;

/// Named clusters of one extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identified {
    pub values: BTreeMap<SlotKey, String>,
    /// Cluster regions clipped to the page
    pub regions: BTreeMap<SlotKey, Region>,
    /// Writable regions of the mapped fields; the body of a new template
    pub fields: BTreeMap<FieldKey, Region>,
}

/// A label phrase found on a blank page
#[derive(Debug, Clone, PartialEq)]
pub struct LabelHit {
    pub field: FieldKey,
    pub region: Region,
}

/// Assign a key to every cluster.
///
/// With a `template`, each cluster takes the field whose stored region it
/// overlaps best; without one, the nearest preceding label on the blank
/// page decides, and a cluster with no label in reach is named from the
/// shape of its value. Clusters that resolve to nothing, or to a field an
/// earlier cluster already took, are kept as `unmapped_<n>`.
pub fn identify(
    clusters: &[FieldCluster],
    blank: &Document,
    template: Option<&Template>,
    labels: &LabelDictionary,
    config: &EngineConfig,
) -> Outcome<Identified> {
    let mut out = Identified::default();
    let mut warnings = Vec::new();
    let mut label_cache: BTreeMap<usize, Vec<LabelHit>> = BTreeMap::new();
    let mut unmapped = 0usize;

    for cluster in clusters {
        let page_index = cluster.page_index();
        let Some(page) = blank.page(page_index) else {
            continue;
        };

        let mut by_content = false;
        let resolved = match template {
            Some(template) => match_template(cluster, template, config),
            None => {
                let hits = label_cache
                    .entry(page_index)
                    .or_insert_with(|| find_labels(page, labels, config));
                nearest_label(cluster, hits, config).or_else(|| {
                    let field = labels.field_for_content(&cluster.value);
                    by_content = field.is_some();
                    field
                })
            }
        };

        let region = cluster.region.clipped_to(page.width, page.height);

        let slot = match resolved {
            Some(field) if !out.values.contains_key(&SlotKey::Field(field)) => {
                if by_content {
                    warnings.push(Warning::ClassifiedByContent {
                        field,
                        page_index,
                        text: cluster.value.clone(),
                    });
                }
                if template.is_none() {
                    out.fields.insert(field, writable_region(cluster, page, config));
                }
                SlotKey::Field(field)
            }
            Some(field) => {
                unmapped += 1;
                let slot = SlotKey::Unmapped(unmapped);
                warnings.push(Warning::DuplicateField {
                    field,
                    key: slot.to_string(),
                    page_index,
                });
                slot
            }
            None => {
                unmapped += 1;
                let slot = SlotKey::Unmapped(unmapped);
                let (key, text) = (slot.to_string(), cluster.value.clone());
                warnings.push(if template.is_some() {
                    Warning::UnmatchedTemplateCluster {
                        key,
                        page_index,
                        text,
                    }
                } else {
                    Warning::UnmappedCluster {
                        key,
                        page_index,
                        text,
                    }
                });
                slot
            }
        };

        out.values.insert(slot, cluster.value.clone());
        out.regions.insert(slot, region);
    }

    Outcome::new(out, warnings)
}

/// Field whose template region best covers the cluster, if any qualifies
fn match_template(
    cluster: &FieldCluster,
    template: &Template,
    config: &EngineConfig,
) -> Option<FieldKey> {
    let mut best: Option<(FieldKey, f32)> = None;

    for (field, region) in &template.fields {
        if region.page_index != cluster.page_index() {
            continue;
        }
        let iou = cluster.region.iou(region);
        let inside = cluster
            .region
            .fraction_inside(&region.expanded(config.position_tolerance));
        if iou < config.iou_threshold && inside < config.containment_threshold {
            continue;
        }
        let score = iou + inside;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((*field, score));
        }
    }

    best.map(|(field, _)| field)
}

/// Every dictionary label printed on `page`, in reading order.
///
/// Tokens are grouped into phrases (same line, small gaps); inside a phrase
/// the longest span that names a field wins.
pub fn find_labels(page: &Page, labels: &LabelDictionary, config: &EngineConfig) -> Vec<LabelHit> {
    let mut hits = Vec::new();

    for phrase in phrases(&page.tokens, config) {
        let mut i = 0;
        'outer: while i < phrase.len() {
            let longest = MAX_LABEL_WORDS.min(phrase.len() - i);
            for len in (1..=longest).rev() {
                let span = &phrase[i..i + len];
                let text = span.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
                if let Some(field) = labels.field_for_label(&text) {
                    let region = span
                        .iter()
                        .skip(1)
                        .fold(span[0].region(), |acc, t| acc.union(&t.region()));
                    hits.push(LabelHit { field, region });
                    i += len;
                    continue 'outer;
                }
            }
            i += 1;
        }
    }

    hits
}

fn phrases<'a>(tokens: &'a [TextToken], config: &EngineConfig) -> Vec<Vec<&'a TextToken>> {
    let mut out: Vec<Vec<&TextToken>> = Vec::new();
    for token in tokens {
        let joins = out.last().and_then(|p| p.last()).map_or(false, |prev| {
            let height = prev.height.max(token.height);
            prev.same_line(token)
                && token.x - prev.right() <= config.cluster_horizontal_gap_factor * height
        });
        match out.last_mut() {
            Some(phrase) if joins => phrase.push(token),
            _ => out.push(vec![token]),
        }
    }
    out
}

fn same_band(a: &Region, b: &Region) -> bool {
    let overlap = a.bottom().min(b.bottom()) - a.y.max(b.y);
    overlap >= a.height.min(b.height).max(f32::EPSILON) * 0.5
}

/// Nearest label above the cluster, or left of its first line
fn nearest_label(
    cluster: &FieldCluster,
    hits: &[LabelHit],
    config: &EngineConfig,
) -> Option<FieldKey> {
    let first_line = cluster.tokens[0].region();
    let target = &cluster.region;
    let mut best: Option<(FieldKey, f32)> = None;

    for hit in hits {
        let label = &hit.region;
        let left_of = same_band(label, &first_line) && label.x < first_line.x;
        let above = label.bottom() <= target.y + label.height * 0.5;
        if !left_of && !above {
            continue;
        }

        let dx = (target.x - label.right()).max(label.x - target.right()).max(0.0);
        let dy = if left_of {
            0.0
        } else {
            (target.y - label.bottom()).max(0.0)
        };
        let distance = (dx * dx + dy * dy).sqrt();
        if distance > config.label_search_radius {
            continue;
        }
        // Later labels win ties: they sit closer in reading order
        if best.map_or(true, |(_, d)| distance <= d) {
            best = Some((hit.field, distance));
        }
    }

    best.map(|(field, _)| field)
}

/// Region a template keeps for a mapped cluster.
///
/// The cluster box is widened to the right up to the next printed token on
/// its lines, or to the page's mirrored left margin, so later values longer
/// than the sample still fit.
pub fn writable_region(cluster: &FieldCluster, page: &Page, config: &EngineConfig) -> Region {
    let region = cluster.region;
    let margin = page
        .tokens
        .iter()
        .map(|t| t.x)
        .fold(f32::MAX, f32::min)
        .clamp(0.0, page.width / 4.0);
    let mut right = page.width - margin;

    for token in &page.tokens {
        if token.x <= region.x || is_leader_only(&token.text) {
            continue;
        }
        if !same_band(&token.region(), &region) && !overlaps_vertically(&token.region(), &region)
        {
            continue;
        }
        right = right.min(token.x - config.position_tolerance);
    }

    let widened = Region {
        width: (right - region.x).max(region.width),
        ..region
    };
    widened.clipped_to(page.width, page.height)
}

fn overlaps_vertically(a: &Region, b: &Region) -> bool {
    a.y < b.bottom() && b.y < a.bottom()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::cluster;
    use pretty_assertions::assert_eq;

    fn tok(text: &str, x: f32, y: f32, width: f32) -> TextToken {
        TextToken {
            text: text.to_string(),
            x,
            y,
            width,
            height: 20.0,
            font_size: 12.0,
            page_index: 0,
        }
    }

    fn blank(tokens: Vec<TextToken>) -> Document {
        Document {
            pages: vec![Page {
                index: 0,
                width: 595.0,
                height: 842.0,
                tokens,
            }],
        }
    }

    fn labels() -> LabelDictionary {
        LabelDictionary::builtin().unwrap()
    }

    #[test]
    fn test_label_left_of_value() {
        let doc = blank(vec![tok("Company Name:", 20.0, 200.0, 70.0)]);
        let clusters = cluster(
            &[tok("Acme Constructors Ltd", 100.0, 200.0, 150.0)],
            &EngineConfig::default(),
        );
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());

        assert!(outcome.warnings.is_empty());
        assert_eq!(
            outcome.value.values.get(&SlotKey::Field(FieldKey::CompanyName)),
            Some(&"Acme Constructors Ltd".to_string())
        );
        let stored = outcome.value.fields[&FieldKey::CompanyName];
        assert_eq!(stored.x, 100.0);
        assert!(stored.width >= 150.0);
        assert!(stored.is_within(595.0, 842.0));
    }

    #[test]
    fn test_word_tokens_form_label_phrases() {
        let doc = blank(vec![
            tok("Email", 20.0, 100.0, 30.0),
            tok("Address:", 54.0, 100.0, 46.0),
            tok("Postal", 20.0, 140.0, 34.0),
            tok("Address:", 58.0, 140.0, 46.0),
        ]);
        let hits = find_labels(&doc.pages[0], &labels(), &EngineConfig::default());
        let fields: Vec<FieldKey> = hits.iter().map(|h| h.field).collect();
        assert_eq!(fields, vec![FieldKey::Email, FieldKey::Address]);
        assert_eq!(hits[0].region.x, 20.0);
        assert_eq!(hits[0].region.right(), 100.0);
    }

    #[test]
    fn test_nearest_of_two_labels_wins() {
        let doc = blank(vec![
            tok("Phone:", 20.0, 100.0, 40.0),
            tok("Email:", 300.0, 100.0, 40.0),
        ]);
        let clusters = cluster(
            &[
                tok("0712", 70.0, 100.0, 40.0),
                tok("a@b.co", 350.0, 100.0, 60.0),
            ],
            &EngineConfig::default(),
        );
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());
        let keys: Vec<SlotKey> = outcome.value.values.keys().copied().collect();
        assert_eq!(
            keys,
            vec![SlotKey::Field(FieldKey::Phone), SlotKey::Field(FieldKey::Email)]
        );
    }

    #[test]
    fn test_label_above_value() {
        let doc = blank(vec![tok("Methodology", 20.0, 300.0, 80.0)]);
        let clusters = cluster(
            &[tok("Phased", 20.0, 330.0, 50.0)],
            &EngineConfig::default(),
        );
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());
        assert!(outcome
            .value
            .values
            .contains_key(&SlotKey::Field(FieldKey::Methodology)));
    }

    #[test]
    fn test_unlabelled_cluster_is_unmapped() {
        let doc = blank(vec![tok("Section IV", 20.0, 100.0, 70.0)]);
        let clusters = cluster(
            &[tok("stray note", 300.0, 500.0, 60.0)],
            &EngineConfig::default(),
        );
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());
        assert_eq!(
            outcome.value.values.get(&SlotKey::Unmapped(1)),
            Some(&"stray note".to_string())
        );
        assert!(outcome.value.fields.is_empty());
        assert!(matches!(
            &outcome.warnings[0],
            Warning::UnmappedCluster { key, .. } if key == "unmapped_1"
        ));
    }

    #[test]
    fn test_unlabelled_email_named_by_content() {
        let doc = blank(vec![tok("Section IV", 20.0, 100.0, 70.0)]);
        let clusters = cluster(
            &[tok("tenders@acme.co.ke", 300.0, 500.0, 110.0)],
            &EngineConfig::default(),
        );
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());

        assert_eq!(
            outcome.value.values.get(&SlotKey::Field(FieldKey::Email)),
            Some(&"tenders@acme.co.ke".to_string())
        );
        assert!(outcome.value.fields.contains_key(&FieldKey::Email));
        assert_eq!(
            outcome.warnings,
            vec![Warning::ClassifiedByContent {
                field: FieldKey::Email,
                page_index: 0,
                text: "tenders@acme.co.ke".to_string(),
            }]
        );
    }

    #[test]
    fn test_unlabelled_phone_named_by_content() {
        let doc = blank(vec![tok("Section IV", 20.0, 100.0, 70.0)]);
        let clusters = cluster(
            &[tok("+254 712 000 000", 300.0, 500.0, 100.0)],
            &EngineConfig::default(),
        );
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());

        assert_eq!(
            outcome.value.values.get(&SlotKey::Field(FieldKey::Phone)),
            Some(&"+254 712 000 000".to_string())
        );
        assert!(matches!(
            outcome.warnings[..],
            [Warning::ClassifiedByContent {
                field: FieldKey::Phone,
                ..
            }]
        ));
    }

    #[test]
    fn test_label_beats_value_shape() {
        // A phone number typed next to the email label stays an email value
        let doc = blank(vec![tok("Email:", 20.0, 100.0, 40.0)]);
        let clusters = cluster(
            &[tok("0712 000 000", 70.0, 100.0, 80.0)],
            &EngineConfig::default(),
        );
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());
        assert!(outcome
            .value
            .values
            .contains_key(&SlotKey::Field(FieldKey::Email)));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_field_first_wins() {
        let doc = blank(vec![tok("Phone:", 20.0, 100.0, 40.0)]);
        let clusters = cluster(
            &[
                tok("0712", 70.0, 100.0, 40.0),
                tok("0733", 70.0, 140.0, 40.0),
            ],
            &EngineConfig::default(),
        );
        assert_eq!(clusters.len(), 2);
        let outcome = identify(&clusters, &doc, None, &labels(), &EngineConfig::default());
        assert_eq!(
            outcome.value.values.get(&SlotKey::Field(FieldKey::Phone)),
            Some(&"0712".to_string())
        );
        assert_eq!(
            outcome.value.values.get(&SlotKey::Unmapped(1)),
            Some(&"0733".to_string())
        );
        assert!(matches!(
            outcome.warnings[0],
            Warning::DuplicateField {
                field: FieldKey::Phone,
                ..
            }
        ));
    }

    #[test]
    fn test_template_match_by_containment() {
        let doc = blank(vec![tok("Company Name:", 20.0, 200.0, 70.0)]);
        let template = Template {
            signature: "v1:x".to_string(),
            fields: [(FieldKey::CompanyName, Region::new(0, 100.0, 200.0, 400.0, 20.0))]
                .into_iter()
                .collect(),
        };
        let clusters = cluster(
            &[
                tok("Beta", 100.0, 200.0, 30.0),
                tok("misplaced", 100.0, 600.0, 30.0),
            ],
            &EngineConfig::default(),
        );
        let outcome = identify(
            &clusters,
            &doc,
            Some(&template),
            &labels(),
            &EngineConfig::default(),
        );
        assert_eq!(
            outcome.value.values.get(&SlotKey::Field(FieldKey::CompanyName)),
            Some(&"Beta".to_string())
        );
        assert!(outcome.value.fields.is_empty());
        assert!(matches!(
            outcome.warnings[0],
            Warning::UnmatchedTemplateCluster { .. }
        ));
    }

    #[test]
    fn test_writable_region_stops_at_next_label() {
        let page = Page {
            index: 0,
            width: 595.0,
            height: 842.0,
            tokens: vec![
                tok("Phone:", 20.0, 100.0, 40.0),
                tok("Email:", 300.0, 100.0, 40.0),
            ],
        };
        let clusters = cluster(&[tok("0712", 70.0, 100.0, 40.0)], &EngineConfig::default());
        let region = writable_region(&clusters[0], &page, &EngineConfig::default());
        assert_eq!(region.x, 70.0);
        assert_eq!(region.right(), 297.0);
    }
}
