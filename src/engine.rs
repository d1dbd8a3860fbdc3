use anyhow::Result;

use crate::annotate::annotate;
use crate::classify::{classify_regions, OccupancyRule, RegionWarning, ThresholdRule};
use crate::config::EngineConfig;
use crate::frame::Frame;
use crate::preprocess::{preprocess, FrameMasks};
use crate::region::RegionModel;
use crate::status::StatusSnapshot;

/// Result of one classification pass.
#[derive(Clone, Debug)]
pub struct Classification {
    pub annotated: Frame,
    pub snapshot: StatusSnapshot,
    pub warnings: Vec<RegionWarning>,
}

/// Runs preprocess, per-region classification, annotation and aggregation on one frame.
///
/// The engine holds only configuration; every call is independent.
pub struct OccupancyEngine {
    config: EngineConfig,
    rule: Box<dyn OccupancyRule>,
}

impl OccupancyEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let rule = Box::new(ThresholdRule::from_config(&config));
        Ok(Self { config, rule })
    }

    /// Replace the occupancy policy. Thresholds in the config are then only used by
    /// rules that read them.
    pub fn with_rule(mut self, rule: Box<dyn OccupancyRule>) -> Self {
        self.rule = rule;
        self
    }

    pub fn rule_name(&self) -> &'static str {
        self.rule.name()
    }

    pub fn masks(&self, frame: &Frame) -> FrameMasks {
        preprocess(frame, &self.config)
    }

    pub fn classify(&self, frame: &Frame, regions: &RegionModel) -> Result<Classification> {
        let masks = self.masks(frame);
        let (verdicts, warnings) =
            classify_regions(regions, &masks, self.rule.as_ref(), self.config.strict_regions)?;
        let annotated = annotate(frame, regions, &verdicts);
        let snapshot = StatusSnapshot::from_verdicts(verdicts);
        log::info!(
            "classified {} regions on {}x{} frame: {} occupied, {} free, {} warnings",
            snapshot.total,
            frame.width(),
            frame.height(),
            snapshot.occupied,
            snapshot.free,
            warnings.len()
        );
        Ok(Classification {
            annotated,
            snapshot,
            warnings,
        })
    }
}

impl Default for OccupancyEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        let rule = Box::new(ThresholdRule::from_config(&config));
        Self { config, rule }
    }
}

/// Classify with the default configuration.
pub fn classify(frame: &Frame, regions: &RegionModel) -> Result<Classification> {
    OccupancyEngine::default().classify(frame, regions)
}
