//! Status aggregation and the board the service publishes into.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::classify::Verdict;
use crate::region::RegionModel;

/// Lot-wide summary of one classification pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub total: usize,
    pub occupied: usize,
    pub free: usize,
    pub per_region: BTreeMap<String, Verdict>,
}

impl StatusSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reduce verdicts to counts. Later verdicts for the same id replace earlier ones.
    pub fn from_verdicts<I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = Verdict>,
    {
        let per_region: BTreeMap<String, Verdict> = verdicts
            .into_iter()
            .map(|v| (v.region_id.clone(), v))
            .collect();
        let total = per_region.len();
        let occupied = per_region.values().filter(|v| v.occupied).count();
        Self {
            total,
            occupied,
            free: total - occupied,
            per_region,
        }
    }

    /// Every region free with zero metrics, for passes that had no frame to measure.
    pub fn unclassified(regions: &RegionModel) -> Self {
        Self::from_verdicts(regions.iter().map(|region| Verdict {
            region_id: region.id().to_string(),
            occupied: false,
            foreground_pixel_count: 0,
            occupancy_ratio: 0.0,
            edge_pixel_count: 0,
            edge_ratio: 0.0,
            slot_area: 0,
        }))
    }

    pub fn report(&self) -> SlotsReport {
        SlotsReport::from(self)
    }
}

/// Per-slot entry of the `/slots` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub occupied: bool,
    pub count: u64,
    pub occupancy_ratio: f64,
}

/// Wire form served at `/slots` and printed by `slot_classify`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotsReport {
    pub total: usize,
    pub occupied: usize,
    pub free: usize,
    pub slots: BTreeMap<String, SlotStatus>,
}

impl From<&StatusSnapshot> for SlotsReport {
    fn from(snapshot: &StatusSnapshot) -> Self {
        Self {
            total: snapshot.total,
            occupied: snapshot.occupied,
            free: snapshot.free,
            slots: snapshot
                .per_region
                .iter()
                .map(|(id, v)| {
                    (
                        id.clone(),
                        SlotStatus {
                            occupied: v.occupied,
                            count: v.foreground_pixel_count,
                            occupancy_ratio: v.occupancy_ratio,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl SlotsReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One snapshot together with the annotated frame it was computed from.
#[derive(Clone, Debug)]
pub struct Publication {
    pub generation: u64,
    pub snapshot: StatusSnapshot,
    pub report: SlotsReport,
    pub frame_jpeg: Option<Arc<Vec<u8>>>,
    /// Hex SHA-256 of `frame_jpeg`.
    pub etag: Option<String>,
}

impl Publication {
    fn initial() -> Self {
        Self {
            generation: 0,
            snapshot: StatusSnapshot::empty(),
            report: SlotsReport::default(),
            frame_jpeg: None,
            etag: None,
        }
    }
}

/// Latest publication, replaced wholesale on every pass.
pub struct StatusBoard {
    current: RwLock<Arc<Publication>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Publication::initial())),
        }
    }

    /// Swap in a new snapshot and frame. Returns the new generation.
    pub fn publish(&self, snapshot: StatusSnapshot, frame_jpeg: Option<Vec<u8>>) -> Result<u64> {
        let etag = frame_jpeg.as_deref().map(frame_etag);
        let report = SlotsReport::from(&snapshot);
        let mut guard = self
            .current
            .write()
            .map_err(|_| anyhow!("status board lock poisoned"))?;
        let generation = guard.generation + 1;
        *guard = Arc::new(Publication {
            generation,
            snapshot,
            report,
            frame_jpeg: frame_jpeg.map(Arc::new),
            etag,
        });
        log::debug!("published status generation {}", generation);
        Ok(generation)
    }

    pub fn latest(&self) -> Result<Arc<Publication>> {
        let guard = self
            .current
            .read()
            .map_err(|_| anyhow!("status board lock poisoned"))?;
        Ok(Arc::clone(&guard))
    }
}

pub fn frame_etag(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
