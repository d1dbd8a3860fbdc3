//! slotwatchd - parking occupancy service
//!
//! This daemon:
//! 1. Loads the region file and the lot image
//! 2. Classifies every slot and publishes the snapshot plus annotated JPEG
//! 3. Serves `/`, `/slots`, `/video_feed`, `/frame.jpg` and `/health`
//! 4. Optionally re-reads both inputs and reclassifies every `refresh_secs`

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use slotwatch::{
    api::{ApiConfig, ApiServer},
    service::run_pass,
    OccupancyEngine, ServiceConfig, StatusBoard,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    let engine = OccupancyEngine::new(config.engine.clone())?;
    let board = Arc::new(StatusBoard::new());

    run_pass(&config, &engine, &board)?;

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        stream_interval: config.stream_interval,
    };
    let api_handle = ApiServer::new(api_config, board.clone()).spawn()?;
    log::info!(
        "slotwatchd running: image={} regions={} api=http://{}",
        config.image_path.display(),
        config.regions_path.display(),
        api_handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    match config.refresh {
        Some(period) => {
            log::info!("reclassifying every {}s", period.as_secs());
            loop {
                match rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(err) = run_pass(&config, &engine, &board) {
                            log::error!("refresh failed, keeping previous status: {:#}", err);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }
        None => {
            log::info!("slotwatchd waiting for shutdown signal (Ctrl-C)...");
            let _ = rx.recv();
        }
    }

    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;
    Ok(())
}
