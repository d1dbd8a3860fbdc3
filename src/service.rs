//! One service pass: read the inputs, classify, publish.

use anyhow::Result;

use crate::annotate::placeholder;
use crate::config::ServiceConfig;
use crate::engine::OccupancyEngine;
use crate::frame::Frame;
use crate::region::RegionModel;
use crate::status::{StatusBoard, StatusSnapshot};

pub const PLACEHOLDER_WIDTH: u32 = 1280;
pub const PLACEHOLDER_HEIGHT: u32 = 720;

/// Classify the configured image against the configured regions and publish the result.
///
/// A missing or unreadable image is not an error: the board gets a placeholder frame
/// naming the problem and a snapshot with every region free. A malformed region file is.
pub fn run_pass(
    config: &ServiceConfig,
    engine: &OccupancyEngine,
    board: &StatusBoard,
) -> Result<u64> {
    let regions = RegionModel::load(&config.regions_path)?;

    let frame = if config.image_path.exists() {
        Frame::open(&config.image_path).map_err(|err| {
            format!(
                "Image file '{}' could not be read: {:#}",
                config.image_path.display(),
                err
            )
        })
    } else {
        Err(format!(
            "Image file '{}' not found",
            config.image_path.display()
        ))
    };
    let frame = match frame {
        Ok(frame) => frame,
        Err(message) => {
            log::warn!("{}", message);
            let notice = placeholder(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, &message)?;
            return board.publish(
                StatusSnapshot::unclassified(&regions),
                Some(notice.encode_jpeg(config.jpeg_quality)?),
            );
        }
    };

    let result = engine.classify(&frame, &regions)?;
    for warning in &result.warnings {
        log::warn!("{}", warning.message);
    }
    let jpeg = result.annotated.encode_jpeg(config.jpeg_quality)?;
    let generation = board.publish(result.snapshot, Some(jpeg))?;
    log::info!("published status generation {}", generation);
    Ok(generation)
}
