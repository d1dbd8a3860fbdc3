//! Per-region occupancy classification.
//!
//! Each region is measured against the global masks independently of every other
//! region. Turning the measurements into a yes/no answer is delegated to an
//! `OccupancyRule`, so the policy can be swapped without touching `Verdict` or the
//! snapshot contracts.

use anyhow::Result;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::OccupancyError;
use crate::mask::Mask;
use crate::preprocess::FrameMasks;
use crate::region::{Region, RegionModel};

/// Raw measurements for one region in one pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RegionMetrics {
    pub slot_area: u64,
    pub foreground_pixel_count: u64,
    pub edge_pixel_count: u64,
    pub occupancy_ratio: f64,
    pub edge_ratio: f64,
}

/// Occupancy policy applied to a region's metrics.
pub trait OccupancyRule: Send + Sync {
    /// Rule identifier, used in logs.
    fn name(&self) -> &'static str;

    fn is_occupied(&self, metrics: &RegionMetrics) -> bool;
}

/// Two independent trip-wires: enough texture OR enough edges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdRule {
    pub texture_ratio_threshold: f64,
    pub edge_ratio_threshold: f64,
}

impl ThresholdRule {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            texture_ratio_threshold: config.texture_ratio_threshold,
            edge_ratio_threshold: config.edge_ratio_threshold,
        }
    }
}

impl Default for ThresholdRule {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl OccupancyRule for ThresholdRule {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn is_occupied(&self, metrics: &RegionMetrics) -> bool {
        metrics.occupancy_ratio > self.texture_ratio_threshold
            || metrics.edge_ratio > self.edge_ratio_threshold
    }
}

/// Occupancy decision for one region, with the numbers it was derived from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub region_id: String,
    pub occupied: bool,
    pub foreground_pixel_count: u64,
    pub occupancy_ratio: f64,
    pub edge_pixel_count: u64,
    pub edge_ratio: f64,
    pub slot_area: u64,
}

impl Verdict {
    pub fn status_label(&self) -> &'static str {
        if self.occupied {
            "Occupied"
        } else {
            "Free"
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    /// The region covers no pixel of the frame; it was reported free.
    EmptyArea,
}

/// Data-quality problem found during a pass that did not stop classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegionWarning {
    pub region_id: String,
    pub kind: WarningKind,
    pub message: String,
}

pub fn measure_region(region: &Region, masks: &FrameMasks) -> Result<RegionMetrics> {
    let area = Mask::from_region(region, masks.texture.width(), masks.texture.height());
    let slot_area = area.count();
    if slot_area == 0 {
        return Ok(RegionMetrics {
            slot_area: 0,
            foreground_pixel_count: 0,
            edge_pixel_count: 0,
            occupancy_ratio: 0.0,
            edge_ratio: 0.0,
        });
    }
    let foreground_pixel_count = area.count_and(&masks.texture)?;
    let edge_pixel_count = area.count_and(&masks.edges)?;
    Ok(RegionMetrics {
        slot_area,
        foreground_pixel_count,
        edge_pixel_count,
        occupancy_ratio: foreground_pixel_count as f64 / slot_area as f64,
        edge_ratio: edge_pixel_count as f64 / slot_area as f64,
    })
}

/// Classify one region. A region without pixels is free plus a warning, or an error
/// when `strict` is set.
pub fn classify_region(
    region: &Region,
    masks: &FrameMasks,
    rule: &dyn OccupancyRule,
    strict: bool,
) -> Result<(Verdict, Option<RegionWarning>)> {
    let metrics = measure_region(region, masks)?;
    let mut warning = None;
    let occupied = if metrics.slot_area == 0 {
        let message = format!(
            "region '{}' covers no pixels of the {}x{} frame",
            region.id(),
            masks.texture.width(),
            masks.texture.height()
        );
        if strict {
            return Err(OccupancyError::invalid_region(message).into());
        }
        log::warn!("{}; reporting it as free", message);
        warning = Some(RegionWarning {
            region_id: region.id().to_string(),
            kind: WarningKind::EmptyArea,
            message,
        });
        false
    } else {
        rule.is_occupied(&metrics)
    };

    log::debug!(
        "region {} rule={} area={} fg={} ({:.3}) edges={} ({:.3}) occupied={}",
        region.id(),
        rule.name(),
        metrics.slot_area,
        metrics.foreground_pixel_count,
        metrics.occupancy_ratio,
        metrics.edge_pixel_count,
        metrics.edge_ratio,
        occupied
    );

    let verdict = Verdict {
        region_id: region.id().to_string(),
        occupied,
        foreground_pixel_count: metrics.foreground_pixel_count,
        occupancy_ratio: metrics.occupancy_ratio,
        edge_pixel_count: metrics.edge_pixel_count,
        edge_ratio: metrics.edge_ratio,
        slot_area: metrics.slot_area,
    };
    Ok((verdict, warning))
}

/// Classify every region in model order.
pub fn classify_regions(
    regions: &RegionModel,
    masks: &FrameMasks,
    rule: &dyn OccupancyRule,
    strict: bool,
) -> Result<(Vec<Verdict>, Vec<RegionWarning>)> {
    let mut verdicts = Vec::with_capacity(regions.len());
    let mut warnings = Vec::new();
    for region in regions {
        let (verdict, warning) = classify_region(region, masks, rule, strict)?;
        verdicts.push(verdict);
        warnings.extend(warning);
    }
    Ok((verdicts, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use crate::region::Point;
    use image::{GrayImage, Luma};

    fn metrics(occupancy_ratio: f64, edge_ratio: f64) -> RegionMetrics {
        RegionMetrics {
            slot_area: 100,
            foreground_pixel_count: (occupancy_ratio * 100.0) as u64,
            edge_pixel_count: (edge_ratio * 100.0) as u64,
            occupancy_ratio,
            edge_ratio,
        }
    }

    fn square(id: &str, x0: i32, y0: i32, side: i32) -> Region {
        Region::new(
            id,
            vec![
                Point::new(x0, y0),
                Point::new(x0 + side, y0),
                Point::new(x0 + side, y0 + side),
                Point::new(x0, y0 + side),
            ],
        )
        .unwrap()
    }

    /// Texture set in the left half, edges set in the top row.
    fn masks() -> FrameMasks {
        let texture = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 255 } else { 0 }]));
        let edges = GrayImage::from_fn(20, 20, |_, y| Luma([if y == 0 { 255 } else { 0 }]));
        FrameMasks {
            texture: Mask::from_gray(texture),
            edges: Mask::from_gray(edges),
        }
    }

    #[test]
    fn rule_is_a_disjunction_with_strict_bounds() {
        let rule = ThresholdRule::default();
        assert!(!rule.is_occupied(&metrics(0.0, 0.0)));
        assert!(!rule.is_occupied(&metrics(0.15, 0.05)));
        assert!(rule.is_occupied(&metrics(0.16, 0.0)));
        assert!(rule.is_occupied(&metrics(0.0, 0.06)));
        assert!(rule.is_occupied(&metrics(0.9, 0.9)));
    }

    #[test]
    fn measures_texture_and_edges_inside_region() -> Result<()> {
        // Columns 0..=9, rows 0..=9: all texture, one edge row.
        let m = measure_region(&square("A", 0, 0, 9), &masks())?;
        assert_eq!(m.slot_area, 100);
        assert_eq!(m.foreground_pixel_count, 100);
        assert_eq!(m.edge_pixel_count, 10);
        assert_eq!(m.occupancy_ratio, 1.0);
        assert_eq!(m.edge_ratio, 0.1);
        Ok(())
    }

    #[test]
    fn region_on_clean_side_is_free() -> Result<()> {
        let (verdict, warning) =
            classify_region(&square("B", 10, 5, 9), &masks(), &ThresholdRule::default(), false)?;
        assert!(!verdict.occupied);
        assert_eq!(verdict.foreground_pixel_count, 0);
        assert_eq!(verdict.status_label(), "Free");
        assert!(warning.is_none());
        Ok(())
    }

    #[test]
    fn off_frame_region_is_free_with_warning() -> Result<()> {
        let (verdict, warning) =
            classify_region(&square("C", 50, 50, 5), &masks(), &ThresholdRule::default(), false)?;
        assert!(!verdict.occupied);
        assert_eq!(verdict.slot_area, 0);
        assert_eq!(verdict.occupancy_ratio, 0.0);
        assert_eq!(verdict.edge_ratio, 0.0);
        assert_eq!(warning.map(|w| w.kind), Some(WarningKind::EmptyArea));
        Ok(())
    }

    #[test]
    fn off_frame_region_fails_in_strict_mode() {
        let err = classify_region(&square("C", 50, 50, 5), &masks(), &ThresholdRule::default(), true)
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    }

    struct NeverOccupied;

    impl OccupancyRule for NeverOccupied {
        fn name(&self) -> &'static str {
            "never"
        }

        fn is_occupied(&self, _metrics: &RegionMetrics) -> bool {
            false
        }
    }

    #[test]
    fn custom_rule_is_used() -> Result<()> {
        let model = RegionModel::new(vec![square("A", 0, 0, 9)])?;
        let (verdicts, _) = classify_regions(&model, &masks(), &NeverOccupied, false)?;
        assert!(!verdicts[0].occupied);
        assert_eq!(verdicts[0].foreground_pixel_count, 100);
        Ok(())
    }
}
