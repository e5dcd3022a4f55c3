//! Data model shared by every pipeline stage
//!
//! Coordinates are PDF points with a top-left origin: `x` grows to the right,
//! `y` grows downwards. Backends convert from and to PDF user space.

use crate::fields::FieldKey;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One contiguous run of rendered glyphs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    pub page_index: usize,
}

impl TextToken {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Bounding box of this token as a region
    pub fn region(&self) -> Region {
        Region {
            page_index: self.page_index,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Whether two tokens share a text line (vertical overlap of at least
    /// half the shorter box)
    pub fn same_line(&self, other: &TextToken) -> bool {
        let overlap = self.bottom().min(other.bottom()) - self.y.max(other.y);
        let shorter = self.height.min(other.height).max(f32::EPSILON);
        overlap >= shorter * 0.5
    }
}

/// One page of a parsed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    /// Tokens in reading order (top-to-bottom, then left-to-right)
    pub tokens: Vec<TextToken>,
}

/// A parsed document; immutable once produced by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }
}

/// A rectangle on one page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Region {
    /// Zero-based page index
    pub page_index: usize,
    /// Left edge in points from the page's left side
    pub x: f32,
    /// Top edge in points from the page's top side
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(page_index: usize, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            page_index,
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Smallest region covering both; page index is taken from `self`
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Region {
            page_index: self.page_index,
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Area shared with `other`; zero across pages
    pub fn intersection_area(&self, other: &Region) -> f32 {
        if self.page_index != other.page_index {
            return 0.0;
        }
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Intersection over union
    pub fn iou(&self, other: &Region) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Fraction of `self` that lies inside `other`
    pub fn fraction_inside(&self, other: &Region) -> f32 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / area
    }

    /// Grow every edge by `margin`
    pub fn expanded(&self, margin: f32) -> Region {
        Region {
            page_index: self.page_index,
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + 2.0 * margin,
            height: self.height + 2.0 * margin,
        }
    }

    pub fn is_within(&self, page_width: f32, page_height: f32) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width >= 0.0
            && self.height >= 0.0
            && self.right() <= page_width
            && self.bottom() <= page_height
    }

    /// Clamp the region into the page's bounds
    pub fn clipped_to(&self, page_width: f32, page_height: f32) -> Region {
        let x = self.x.clamp(0.0, page_width);
        let y = self.y.clamp(0.0, page_height);
        let right = self.right().clamp(x, page_width);
        let bottom = self.bottom().clamp(y, page_height);
        Region {
            page_index: self.page_index,
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}

/// Inserted tokens believed to form one logical value
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCluster {
    pub tokens: Vec<TextToken>,
    /// Union of member token boxes
    pub region: Region,
    /// Member text in reading order; spaces within a line, newlines between lines
    pub value: String,
}

impl FieldCluster {
    pub fn page_index(&self) -> usize {
        self.region.page_index
    }
}

/// Key of one detected value: a vocabulary field or an unmapped cluster.
///
/// Unmapped clusters serialize as `unmapped_<n>` with `n` counted from 1 in
/// reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKey {
    Field(FieldKey),
    Unmapped(usize),
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Field(key) => f.write_str(key.as_str()),
            SlotKey::Unmapped(n) => write!(f, "unmapped_{}", n),
        }
    }
}

impl std::str::FromStr for SlotKey {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        if let Some(n) = s.strip_prefix("unmapped_").and_then(|n| n.parse().ok()) {
            return Ok(SlotKey::Unmapped(n));
        }
        s.parse().map(SlotKey::Field)
    }
}

impl Serialize for SlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reusable map of field keys to page regions for one blank layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub signature: String,
    pub fields: BTreeMap<FieldKey, Region>,
}

/// Output of a blank/filled comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub field_values: BTreeMap<SlotKey, String>,
    pub regions: BTreeMap<SlotKey, Region>,
    /// Pages with at least one insertion, ascending
    pub pages_touched: Vec<usize>,
    /// Number of detected value clusters, mapped or not
    pub total_differences: usize,
    /// Number of raw inserted tokens behind those clusters
    pub inserted_tokens: usize,
    /// Signature of the blank document
    pub signature: String,
}

impl ExtractionResult {
    /// True when the filled document adds nothing to the blank
    pub fn is_empty(&self) -> bool {
        self.total_differences == 0
    }

    /// Values for vocabulary keys only
    pub fn mapped_values(&self) -> BTreeMap<FieldKey, String> {
        self.field_values
            .iter()
            .filter_map(|(slot, value)| match slot {
                SlotKey::Field(key) => Some((*key, value.clone())),
                SlotKey::Unmapped(_) => None,
            })
            .collect()
    }
}

/// Identification fields read from a cover page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverMetadata {
    pub title: String,
    pub reference_number: String,
    pub organization: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// One line of text to draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub page_index: usize,
    /// Left edge of the line
    pub x: f32,
    /// Top edge of the line box
    pub y: f32,
    pub font_size: f32,
    pub text: String,
}

/// Per-field diagnostic; never fatal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A cluster had no identifiable label
    UnmappedCluster {
        key: String,
        page_index: usize,
        text: String,
    },
    /// A second cluster resolved to an already-claimed field
    DuplicateField {
        field: FieldKey,
        key: String,
        page_index: usize,
    },
    /// A cluster overlapped no region of the stored template
    UnmatchedTemplateCluster {
        key: String,
        page_index: usize,
        text: String,
    },
    /// A value was supplied for a field the layout does not place
    ValueWithoutRegion { field: FieldKey },
    /// A value did not fit its region and was cut at the last full line
    ValueTruncated {
        field: FieldKey,
        lines_drawn: usize,
        lines_total: usize,
    },
    /// A value was blank and nothing was drawn
    EmptyValue { field: FieldKey },
    /// A region extended past its page and was clamped
    RegionClipped { field: FieldKey },
    /// Filled-page coordinates were shifted or rescaled onto the blank page
    PageGeometryDrift {
        page_index: usize,
        dx: f32,
        dy: f32,
        scale_x: f32,
        scale_y: f32,
    },
    /// The new template was not stored because no field was identified
    TemplateNotStored { signature: String },
    /// Clusters were named from the template stored for this signature
    StoredTemplateApplied { signature: String },
    /// A cluster with no nearby label was named from the shape of its value
    ClassifiedByContent {
        field: FieldKey,
        page_index: usize,
        text: String,
    },
}

/// A primary payload plus the per-field warnings gathered while producing it
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

impl Outcome<ExtractionResult> {
    /// Whether identification followed a stored template
    pub fn used_template(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::StoredTemplateApplied { .. }))
    }
}
