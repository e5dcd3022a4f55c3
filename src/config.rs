//! Engine tuning constants

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunable thresholds for every pipeline stage.
///
/// All distances are PDF points. Factors are relative to the taller of the
/// two token boxes being compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max |dx| and |dy| for a filled token to match a blank token
    pub position_tolerance: f32,
    /// Max font size difference for a match
    pub font_size_tolerance: f32,
    /// Ignore inserted tokens made only of leader glyphs (`____`, `....`)
    pub ignore_leader_tokens: bool,

    /// Two consecutive insertions on different lines join one cluster while
    /// the vertical gap stays below `line_gap_factor * height`
    pub cluster_line_gap_factor: f32,
    /// Two insertions on one line split when the horizontal gap exceeds
    /// `horizontal_gap_factor * height`
    pub cluster_horizontal_gap_factor: f32,

    /// Minimum IoU between a cluster and a stored template region
    pub iou_threshold: f32,
    /// Alternative acceptance: share of the cluster inside the template region
    pub containment_threshold: f32,
    /// Labels farther than this from a cluster are not considered
    pub label_search_radius: f32,

    /// Largest median offset treated as rendering drift and corrected
    pub max_drift: f32,
    /// Relative page-size difference tolerated (and rescaled) between pairs
    pub page_size_tolerance: f32,

    /// Font size used when filling, capped by the region height
    pub fill_font_size: f32,
    /// Baseline-to-baseline distance as a multiple of the font size
    pub fill_line_spacing: f32,
    /// Average glyph advance as a multiple of the font size (Helvetica ~0.5)
    pub fill_glyph_width: f32,

    /// Max templates held in the store before least-recent eviction
    pub template_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 3.0,
            font_size_tolerance: 1.0,
            ignore_leader_tokens: true,
            cluster_line_gap_factor: 0.75,
            cluster_horizontal_gap_factor: 4.0,
            iou_threshold: 0.3,
            containment_threshold: 0.6,
            label_search_radius: 250.0,
            max_drift: 4.0,
            page_size_tolerance: 0.02,
            fill_font_size: 10.0,
            fill_line_spacing: 1.2,
            fill_glyph_width: 0.5,
            template_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; absent keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|e| Error::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a stage degenerate
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("position_tolerance", self.position_tolerance),
            ("cluster_line_gap_factor", self.cluster_line_gap_factor),
            ("cluster_horizontal_gap_factor", self.cluster_horizontal_gap_factor),
            ("fill_font_size", self.fill_font_size),
            ("fill_line_spacing", self.fill_line_spacing),
            ("fill_glyph_width", self.fill_glyph_width),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig {
                    reason: format!("{} must be a positive number", name),
                });
            }
        }
        for (name, value) in [
            ("iou_threshold", self.iou_threshold),
            ("containment_threshold", self.containment_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig {
                    reason: format!("{} must be within [0, 1]", name),
                });
            }
        }
        if self.template_capacity == 0 {
            return Err(Error::InvalidConfig {
                reason: "template_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
