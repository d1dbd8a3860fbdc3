//! slot_marker - create and inspect region files
//!
//! Regions are edited in place: every command loads the file, applies one change and
//! writes it back only if the result validates.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use slotwatch::{annotate, Frame, Point, Region, RegionModel};

#[derive(Parser, Debug)]
#[command(name = "slot_marker", about = "Edit parking slot region files")]
struct Args {
    /// Region file to edit
    #[arg(long, env = "SLOTWATCH_REGIONS", default_value = "slots.json", global = true)]
    regions: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a slot polygon (three or more points)
    Add {
        #[arg(long)]
        id: String,
        /// Vertex as x,y; repeat in drawing order
        #[arg(
            long = "point",
            value_name = "X,Y",
            required = true,
            num_args = 1..,
            allow_hyphen_values = true
        )]
        points: Vec<Point>,
        /// Replace an existing slot with the same id
        #[arg(long)]
        replace: bool,
    },

    /// Remove a slot by id
    Remove {
        #[arg(long)]
        id: String,
    },

    /// List slots in file order
    List,

    /// Draw every slot onto an image
    Preview {
        #[arg(long, env = "SLOTWATCH_IMAGE", default_value = "parking.jpg")]
        image: PathBuf,
        #[arg(long, default_value = "slots_preview.png")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let model = RegionModel::load(&args.regions)?;

    match args.command {
        Command::Add {
            id,
            points,
            replace,
        } => {
            let base = if replace && model.get(&id).is_some() {
                model.without_region(&id)?
            } else {
                model
            };
            let region = Region::new(id.clone(), points)?;
            let updated = base.with_region(region)?;
            updated.save(&args.regions)?;
            println!(
                "slot '{}' saved to {} ({} slots)",
                id,
                args.regions.display(),
                updated.len()
            );
        }
        Command::Remove { id } => {
            let updated = model.without_region(&id)?;
            updated.save(&args.regions)?;
            println!(
                "slot '{}' removed from {} ({} slots)",
                id,
                args.regions.display(),
                updated.len()
            );
        }
        Command::List => {
            if model.is_empty() {
                println!("no slots in {}", args.regions.display());
            }
            for region in &model {
                let points: Vec<String> = region
                    .polygon()
                    .iter()
                    .map(|p| format!("{},{}", p.x, p.y))
                    .collect();
                println!("{:<12} {}", region.id(), points.join(" "));
            }
        }
        Command::Preview { image, out } => {
            if !image.exists() {
                return Err(anyhow!("image file '{}' not found", image.display()));
            }
            let frame = Frame::open(&image)?;
            annotate::preview(&frame, &model).save(&out)?;
            println!("preview of {} slots written to {}", model.len(), out.display());
        }
    }
    Ok(())
}
