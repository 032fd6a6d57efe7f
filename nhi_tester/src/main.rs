mod manifest;

use anyhow::{Context, Result};
use clap::Parser;
use image::{GrayImage, Luma};
use manifest::Manifest;
use nhi_vision::core_modules::scene_summarizer::TABLE_HEADER;
use nhi_vision::parallel_pipeline::ParallelPipeline;
use nhi_vision::pipeline::{FlaggedScene, PipelineConfig, Severity};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const SEVERITY_SHADE_HOT: u8 = 128;
const SEVERITY_SHADE_EXTREME: u8 = 255;

/// Runs a series of radiance scenes through the NHI engine and writes the
/// hotspot table, region masks and region outlines.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON scene manifest.
    manifest: PathBuf,

    /// Output directory, created if missing.
    #[arg(short, long, default_value = "nhi_output")]
    output: PathBuf,

    /// JSON engine configuration. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker count, overriding the configuration.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip the per-region PNG masks.
    #[arg(long)]
    no_masks: bool,
}

#[derive(Serialize)]
struct OutlineDump<'a> {
    flagged: &'a [FlaggedScene],
    skipped: &'a [nhi_vision::pipeline::SkippedScene],
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating output directory {}", args.output.display()))?;

    // --- 2. Engine Configuration ---
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.workers.is_some() {
        config.worker_count = args.workers;
    }

    // --- 3. Scene Loading ---
    let loaded = Manifest::load(&args.manifest)?.into_frames();
    log::info!(
        "loaded {} scenes from {} ({} unreadable)",
        loaded.frames.len(),
        args.manifest.display(),
        loaded.skipped.len()
    );

    // --- 4. Parallel Processing ---
    let pipeline = ParallelPipeline::new(config)?;
    let mut report = pipeline.process_series(loaded.frames).await?;
    pipeline.shutdown().await;
    report.skipped.extend(loaded.skipped);
    report.skipped.sort_by_key(|s| s.timestamp);

    // --- 5. Tabular Export ---
    let table_path = args.output.join("nhi_series.csv");
    let mut writer = csv::Writer::from_path(&table_path)
        .with_context(|| format!("creating {}", table_path.display()))?;
    writer.write_record(TABLE_HEADER)?;
    for record in &report.series {
        writer.write_record(record.table_row())?;
    }
    writer.flush()?;

    // --- 6. Raster Export ---
    if !args.no_masks {
        for scene in &report.flagged {
            write_masks(&args.output, scene)?;
        }
    }

    // --- 7. Vector Export ---
    let outline_path = args.output.join("nhi_regions.json");
    let file = File::create(&outline_path)
        .with_context(|| format!("creating {}", outline_path.display()))?;
    serde_json::to_writer_pretty(
        BufWriter::new(file),
        &OutlineDump {
            flagged: &report.flagged,
            skipped: &report.skipped,
        },
    )?;

    println!(
        "Processing complete. {} scenes recorded, {} flagged, {} skipped. Output saved to {}",
        report.series.len(),
        report.flagged.len(),
        report.skipped.len(),
        args.output.display()
    );
    Ok(())
}

/// Writes one severity overview per scene plus one mask per region.
fn write_masks(dir: &Path, scene: &FlaggedScene) -> Result<()> {
    let (w, h) = (scene.width as u32, scene.height as u32);
    let stamp = scene.timestamp.format("%Y%m%dT%H%M%S");

    let mut overview = GrayImage::new(w, h);
    for region in scene.regions.iter() {
        let shade = match region.severity {
            Severity::Extreme => SEVERITY_SHADE_EXTREME,
            Severity::Hot => SEVERITY_SHADE_HOT,
            Severity::Background => continue,
        };
        for cell in &region.cells {
            overview.put_pixel(cell.x as u32, cell.y as u32, Luma([shade]));
        }

        let label = region.severity.label();
        let mask_path = dir.join(format!("{stamp}_{label}_{}.png", region.id));
        region
            .save_mask(&mask_path, w, h, &scene.transform)
            .with_context(|| format!("writing {}", mask_path.display()))?;
    }

    let overview_path = dir.join(format!("{stamp}_severity.png"));
    overview
        .save(&overview_path)
        .with_context(|| format!("writing {}", overview_path.display()))?;
    let world_path = overview_path.with_extension("pgw");
    std::fs::write(&world_path, scene.transform.world_file())
        .with_context(|| format!("writing {}", world_path.display()))?;
    Ok(())
}
