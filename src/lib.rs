//! slotwatch: parking-slot occupancy from a single still frame.
//!
//! # Architecture
//!
//! One pass takes a colour frame plus a set of named slot polygons and produces an
//! annotated copy of the frame and a lot-wide status snapshot:
//!
//! 1. **Preprocess** the frame once into a texture mask and an edge mask.
//! 2. **Classify** each region by measuring both masks inside its polygon.
//! 3. **Annotate** a copy of the frame with coloured outlines and labels.
//! 4. **Aggregate** verdicts into totals and a wire report.
//!
//! The core is synchronous, keeps no state between passes and never mutates its inputs.
//!
//! # Module Structure
//!
//! - `region`: slot polygons and the region file
//! - `frame`, `mask`: owned images
//! - `preprocess`, `classify`, `annotate`, `status`: the pipeline stages
//! - `engine`: `classify(frame, regions)` entry point
//! - `config`: engine thresholds and service settings
//! - `service`: one daemon pass from files on disk to the status board
//! - `api`: read-only HTTP view over the latest publication

pub mod annotate;
pub mod api;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod mask;
pub mod preprocess;
pub mod region;
pub mod service;
pub mod status;

pub use classify::{
    OccupancyRule, RegionMetrics, RegionWarning, ThresholdRule, Verdict, WarningKind,
};
pub use config::{EngineConfig, ServiceConfig};
pub use engine::{classify, Classification, OccupancyEngine};
pub use error::{error_kind, ErrorKind, OccupancyError};
pub use frame::Frame;
pub use mask::Mask;
pub use preprocess::FrameMasks;
pub use region::{Point, Region, RegionModel};
pub use status::{SlotStatus, SlotsReport, StatusBoard, StatusSnapshot};
