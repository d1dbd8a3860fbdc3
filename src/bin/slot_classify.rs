//! slot_classify - classify one image against a region file and print the result.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use slotwatch::{EngineConfig, Frame, OccupancyEngine, RegionModel, ServiceConfig};

#[derive(Parser, Debug)]
#[command(
    name = "slot_classify",
    about = "Classify parking slots in a single image"
)]
struct Args {
    /// Lot image (JPEG or PNG)
    #[arg(long, env = "SLOTWATCH_IMAGE", default_value = "parking.jpg")]
    image: PathBuf,

    /// Region file with slot polygons
    #[arg(long, env = "SLOTWATCH_REGIONS", default_value = "slots.json")]
    regions: PathBuf,

    /// Service config file; only its engine section is used
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the annotated frame here (format from extension)
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Print the slots report as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Fail on regions that cover no pixels of the image
    #[arg(long)]
    strict: bool,

    /// Classify on the texture signal only
    #[arg(long)]
    no_edges: bool,

    /// Write texture.png and edges.png masks into this directory
    #[arg(long, value_name = "DIR")]
    dump_masks: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut engine_config = match &args.config {
        Some(path) => ServiceConfig::from_path(path)?.engine,
        None => EngineConfig::default(),
    };
    if args.strict {
        engine_config.strict_regions = true;
    }
    if args.no_edges {
        engine_config.edge_detection = false;
    }
    let engine = OccupancyEngine::new(engine_config)?;

    let regions = RegionModel::load(&args.regions)?;
    let frame = Frame::open(&args.image)?;

    if let Some(dir) = &args.dump_masks {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let masks = engine.masks(&frame);
        masks.texture.as_gray().save(dir.join("texture.png"))?;
        masks.edges.as_gray().save(dir.join("edges.png"))?;
        log::info!("masks written to {}", dir.display());
    }

    let result = engine.classify(&frame, &regions)?;
    for warning in &result.warnings {
        eprintln!("warning: {}", warning.message);
    }

    if let Some(out) = &args.out {
        result.annotated.save(out)?;
        eprintln!("annotated frame written to {}", out.display());
    }

    let report = result.snapshot.report();
    if args.json {
        println!("{}", report.to_json_pretty()?);
        return Ok(());
    }

    println!(
        "{} slots: {} occupied, {} free",
        report.total, report.occupied, report.free
    );
    for verdict in result.snapshot.per_region.values() {
        println!(
            "  {:<12} {:<8} fg={:<6} ({:.3})  edges={:<6} ({:.3})  area={}",
            verdict.region_id,
            verdict.status_label(),
            verdict.foreground_pixel_count,
            verdict.occupancy_ratio,
            verdict.edge_pixel_count,
            verdict.edge_ratio,
            verdict.slot_area
        );
    }
    Ok(())
}
