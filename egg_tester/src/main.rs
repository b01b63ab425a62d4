use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use egg_vision::{BatchPipeline, Detection, Detector, DetectorConfig, EggDetector, Grade, Image};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "egg_tester", version, about = "Detect and grade eggs in still images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grade the eggs in one image and print the report as JSON.
    Detect {
        image: PathBuf,
        /// JSON detector configuration; missing fields keep their defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write a copy of the image with every detection outlined.
        #[arg(long, value_name = "OUT.png")]
        annotate: Option<PathBuf>,
        /// Print single-line JSON.
        #[arg(long)]
        compact: bool,
    },
    /// Grade many images concurrently and print a combined summary.
    Batch {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Worker count; defaults to one per logical CPU.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Describe the detector and its grade table.
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Detect {
            image,
            config,
            annotate,
            compact,
        } => detect(&image, config.as_deref(), annotate.as_deref(), compact),
        Command::Batch {
            images,
            config,
            workers,
        } => batch(images, config.as_deref(), workers).await,
        Command::Info => {
            let info = EggDetector::default().info();
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays valid JSON. Filter with `RUST_LOG`.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_detector(config_path: Option<&Path>) -> Result<EggDetector> {
    let config = match config_path {
        Some(path) => DetectorConfig::from_json_file(path)
            .with_context(|| format!("loading detector config {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    Ok(EggDetector::new(config)?)
}

fn load_image(path: &Path) -> Result<Image> {
    let decoded = image::open(path).with_context(|| format!("opening image {}", path.display()))?;
    Ok(Image::from_dynamic(decoded)?)
}

fn detect(path: &Path, config: Option<&Path>, annotate: Option<&Path>, compact: bool) -> Result<()> {
    // --- 2. Detector & Image Loading ---
    let detector = build_detector(config)?;
    let image = load_image(path)?;

    // --- 3. Detection ---
    let outcome = detector.detect(&image);
    tracing::info!(
        image = %path.display(),
        total_eggs = outcome.report().total_eggs,
        completed = outcome.is_completed(),
        "detection finished"
    );

    // --- 4. Visualization ---
    if let Some(out_path) = annotate {
        let mut canvas = image.to_rgb_image();
        draw_detections(&mut canvas, &outcome.report().detections);
        canvas
            .save(out_path)
            .with_context(|| format!("writing annotated image {}", out_path.display()))?;
    }

    let json = if compact {
        serde_json::to_string(&outcome)?
    } else {
        serde_json::to_string_pretty(&outcome)?
    };
    println!("{json}");
    Ok(())
}

async fn batch(paths: Vec<PathBuf>, config: Option<&Path>, workers: Option<usize>) -> Result<()> {
    let detector: Arc<dyn Detector> = Arc::new(build_detector(config)?);
    let pipeline = match workers {
        Some(count) => BatchPipeline::with_workers(detector, count),
        None => BatchPipeline::new(detector),
    };

    let images = paths
        .iter()
        .map(|path| Ok((path.display().to_string(), load_image(path)?)))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(images = images.len(), workers = pipeline.worker_count(), "starting batch");
    let summary = pipeline.process_batch(images).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Outlines each detection, coloured from green (largest) to red (smallest).
fn draw_detections(canvas: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        let color = grade_color(detection.grade);
        let bbox = detection.bbox;
        // Two nested outlines so the box stays visible on large photos.
        for inset in 0..2u32 {
            if bbox.width <= inset * 2 || bbox.height <= inset * 2 {
                break;
            }
            let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32)
                .of_size(bbox.width - inset * 2, bbox.height - inset * 2);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }
}

fn grade_color(grade: Grade) -> Rgb<u8> {
    // Green to yellow to red across the six grades.
    let score = grade.index() as f64 / (Grade::ALL.len() - 1) as f64 * 10.0;
    let (r, g) = if score <= 5.0 {
        let ratio = score / 5.0;
        (255.0 * ratio, 255.0)
    } else {
        let ratio = (score - 5.0) / 5.0;
        (255.0, 255.0 * (1.0 - ratio))
    };
    Rgb([r as u8, g as u8, 0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use egg_vision::BoundingBox;

    #[test]
    fn grade_colors_run_green_to_red() {
        assert_eq!(grade_color(Grade::Grade0), Rgb([0, 255, 0]));
        assert_eq!(grade_color(Grade::Grade5), Rgb([255, 0, 0]));
    }

    #[test]
    fn detections_are_outlined() {
        let mut canvas = RgbImage::new(40, 40);
        let detection = Detection {
            id: 1,
            grade: Grade::Grade0,
            confidence: 0.95,
            area: 400,
            bbox: BoundingBox { x: 5, y: 5, width: 20, height: 20 },
        };
        draw_detections(&mut canvas, &[detection]);
        assert_eq!(*canvas.get_pixel(5, 5), Rgb([0, 255, 0]));
        assert_eq!(*canvas.get_pixel(6, 10), Rgb([0, 255, 0]));
        assert_eq!(*canvas.get_pixel(15, 15), Rgb([0, 0, 0]));
    }

    #[test]
    fn cli_parses_detect_flags() {
        let cli = Cli::parse_from(["egg_tester", "detect", "tray.jpg", "--annotate", "out.png", "--compact"]);
        match cli.command {
            Command::Detect { image, annotate, compact, config } => {
                assert_eq!(image, PathBuf::from("tray.jpg"));
                assert_eq!(annotate, Some(PathBuf::from("out.png")));
                assert!(compact);
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
