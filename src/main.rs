//! CLI Entry Point for thermcam
//!
//! Provides command-line interface for:
//! - Scanning a region and saving the grid (and optionally an image)
//! - Watching the device log
//! - Rendering and inspecting saved `.qtcd` scans
//!
//! # Usage
//!
//! Scan the whole field of view:
//! ```bash
//! thermcam scan --output room.qtcd --image room.png
//! ```
//!
//! Render a saved scan with two labelled cells:
//! ```bash
//! thermcam render room.qtcd room.png --show 90,90 --show 100,95
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thermcam::config::ThermCamConfig;
use thermcam::device::{Connected, Region, ThermCam};
use thermcam::view::{export_image, load_scan, save_scan, TempView};
use thermcam::{tracing_setup, Session};
use tracing::warn;

#[derive(Parser)]
#[command(name = "thermcam")]
#[command(about = "Pan/tilt infrared thermal scanner host", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/thermcam.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a region and save the result
    Scan {
        /// Serial device (overrides the configuration)
        #[arg(long)]
        port: Option<PathBuf>,

        /// First column (defaults to the field of view)
        #[arg(long, allow_hyphen_values = true)]
        xmin: Option<i32>,

        /// Last column
        #[arg(long, allow_hyphen_values = true)]
        xmax: Option<i32>,

        /// First row
        #[arg(long, allow_hyphen_values = true)]
        ymin: Option<i32>,

        /// Last row
        #[arg(long, allow_hyphen_values = true)]
        ymax: Option<i32>,

        /// Scan document to write (.qtcd)
        #[arg(long, short)]
        output: PathBuf,

        /// Also export the rendered image
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Connect and log device traffic until Ctrl-C
    Monitor {
        /// Serial device (overrides the configuration)
        #[arg(long)]
        port: Option<PathBuf>,
    },

    /// Render a saved scan to an image
    Render {
        /// Scan document (.qtcd)
        scan: PathBuf,

        /// Image to write; format from the extension, PNG otherwise
        image: PathBuf,

        /// Label the cell at x,y (repeatable)
        #[arg(long, value_parser = parse_point)]
        show: Vec<(i32, i32)>,
    },

    /// Print a summary of a saved scan
    Info {
        /// Scan document (.qtcd)
        scan: PathBuf,
    },
}

fn parse_point(s: &str) -> Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("invalid x: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("invalid y: {e}"))?;
    Ok((x, y))
}

/// Completes on Ctrl-C. If the handler cannot be installed it never completes.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ThermCamConfig::load_from(path),
        None => ThermCamConfig::load(),
    }
    .context("Cannot load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;
    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Scan {
            port,
            xmin,
            xmax,
            ymin,
            ymax,
            output,
            image,
        } => {
            let bounds = [xmin, xmax, ymin, ymax];
            scan(&config, port, bounds, &output, image.as_deref()).await
        }
        Commands::Monitor { port } => monitor(&config, port).await,
        Commands::Render { scan, image, show } => render(&config, &scan, &image, &show),
        Commands::Info { scan } => info(&scan),
    }
}

async fn connect(config: &ThermCamConfig, port: Option<PathBuf>) -> Result<(Session, Connected)> {
    let port = port.unwrap_or_else(|| PathBuf::from(&config.serial.port));
    let mut cam = ThermCam::new(config);
    let connected = cam
        .connect(&port)
        .await
        .with_context(|| format!("Cannot connect to {}", port.display()))?;
    println!("🔌 Connected to {} ({})", port.display(), connected.settings);
    Ok((Session::new(cam, (config.view.width, config.view.height)), connected))
}

async fn scan(
    config: &ThermCamConfig,
    port: Option<PathBuf>,
    bounds: [Option<i32>; 4],
    output: &Path,
    image: Option<&Path>,
) -> Result<()> {
    let (mut session, Connected { mut reader, .. }) = connect(config, port).await?;

    println!("⏳ Waiting for the device to finish its setup...");
    let fov = match session.wait_until_ready(&mut reader, ctrl_c()).await {
        Ok(Some(fov)) => fov,
        Ok(None) => {
            session.close().await;
            println!("👋 Interrupted before the device was ready");
            return Ok(());
        }
        Err(e) => {
            session.close().await;
            return Err(e).context("Device stopped responding");
        }
    };

    let [xmin, xmax, ymin, ymax] = bounds;
    let Some(region) = Region::new(
        xmin.unwrap_or(fov.xmin()),
        xmax.unwrap_or(fov.xmax()),
        ymin.unwrap_or(fov.ymin()),
        ymax.unwrap_or(fov.ymax()),
    ) else {
        session.close().await;
        bail!("Scan region has inverted bounds");
    };

    println!("📡 Scanning {region} (Ctrl-C cancels)");
    let result = session.run_scan(&mut reader, Some(region), ctrl_c()).await;
    let mut view = session.close().await;

    if view.buffer().is_some() {
        save_scan(&view, output)
            .with_context(|| format!("Cannot save {}", output.display()))?;
        println!("💾 Saved {}", output.display());
        if let Some(image) = image {
            export_image(&mut view, image, config.view.width, config.view.height)
                .with_context(|| format!("Cannot export {}", image.display()))?;
            println!("🖼️  Exported {}", image.display());
        }
    }

    let outcome = result.context("Scan aborted")?;
    if outcome.completed {
        println!("✅ Scan complete: {} samples", outcome.samples);
    } else {
        println!(
            "⚠️  Scan cancelled: {} of {} samples",
            outcome.samples,
            outcome.region.area()
        );
    }
    Ok(())
}

async fn monitor(config: &ThermCamConfig, port: Option<PathBuf>) -> Result<()> {
    let (mut session, Connected { mut reader, .. }) = connect(config, port).await?;
    println!("📡 Monitoring - Press Ctrl+C to stop");

    let result = session.monitor(&mut reader, ctrl_c()).await;
    println!("{}", session.controller().status());
    session.close().await;
    result.context("Device stopped responding")
}

fn render(config: &ThermCamConfig, scan: &Path, image: &Path, show: &[(i32, i32)]) -> Result<()> {
    let mut view = TempView::new();
    load_scan(&mut view, scan).with_context(|| format!("Cannot load {}", scan.display()))?;
    for &(x, y) in show {
        if !view.annotate(x, y) {
            bail!("{x},{y} lies outside the scanned region");
        }
    }
    export_image(&mut view, image, config.view.width, config.view.height)
        .with_context(|| format!("Cannot export {}", image.display()))?;
    println!("🖼️  Exported {}", image.display());
    Ok(())
}

fn info(scan: &Path) -> Result<()> {
    let mut view = TempView::new();
    load_scan(&mut view, scan).with_context(|| format!("Cannot load {}", scan.display()))?;
    let Some(buffer) = view.buffer() else {
        bail!("{} holds no data", scan.display());
    };

    println!("Region:      {}", buffer.region());
    println!(
        "Samples:     {} set, {} unset",
        buffer.set_count(),
        buffer.region().area() - buffer.set_count()
    );
    match buffer.range() {
        Some((tmin, tmax)) => println!("Range:       {tmin:.2} .. {tmax:.2} °C"),
        None => println!("Range:       -"),
    }
    match view.highlight() {
        Some((x, y)) => println!("Highlight:   {x},{y}"),
        None => println!("Highlight:   -"),
    }
    let shown: Vec<String> = view.annotations().map(|(x, y)| format!("{x},{y}")).collect();
    println!("Annotations: {}", if shown.is_empty() { "-".to_string() } else { shown.join(" ") });
    Ok(())
}
