use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use page_compare::config::{self, RunConfig};
use page_compare::diff::{DiffImages, VisualizerOptions, compare, decode_raster, visualize};
use page_compare::runner::{RunReport, launch_sessions, run_comparison};
use page_compare::snapshot::{DriverOptions, MockFramebuffer, install_browsers};
use page_compare::{ZipArchiveSink, default_routes, load_routes, parse_viewport};

/// Page Compare - visual regression between two web origins
#[derive(Parser, Debug)]
#[command(
    name = "page-compare",
    about = "Capture routes on two origins, diff them pixel by pixel and package the results",
    after_help = "ENVIRONMENT VARIABLES:\n\
        PAGE_COMPARE_BEFORE_URL     Origin rendered as \"before\"\n\
        PAGE_COMPARE_AFTER_URL      Origin rendered as \"after\"\n\
        PAGE_COMPARE_OUTPUT_DIR     Directory holding the archive\n\
        PAGE_COMPARE_ARCHIVE_NAME   Archive file name\n\
        PAGE_COMPARE_TOLERANCE      Per-channel tolerance\n\
        PAGE_COMPARE_MARGIN         Gap in the side-by-side image\n\
        PAGE_COMPARE_MAX_RETRIES    Attempts per route\n\
        PAGE_COMPARE_HEADLESS       Run the browser headless\n\
        PAGE_COMPARE_NODE           JavaScript runtime hosting the driver\n\
        RUST_LOG                    Log filter (overrides --log-level)"
)]
struct Args {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare every route on the before and after origins
    Run {
        /// Origin rendered as "before"
        #[arg(long, env = "PAGE_COMPARE_BEFORE_URL")]
        before_url: Option<String>,

        /// Origin rendered as "after"
        #[arg(long, env = "PAGE_COMPARE_AFTER_URL")]
        after_url: Option<String>,

        /// JSON route list (default: built-in Bootstrap docs routes)
        #[arg(short, long)]
        routes: Option<PathBuf>,

        /// Directory holding the archive
        #[arg(short, long, env = "PAGE_COMPARE_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Archive file name
        #[arg(long, env = "PAGE_COMPARE_ARCHIVE_NAME")]
        archive_name: Option<String>,

        /// Per-channel tolerance (0-255)
        #[arg(short, long, env = "PAGE_COMPARE_TOLERANCE")]
        tolerance: Option<u8>,

        /// Gap between halves of the compare image (px)
        #[arg(long, env = "PAGE_COMPARE_MARGIN")]
        margin: Option<u32>,

        /// Attempts per route before the run aborts
        #[arg(long, env = "PAGE_COMPARE_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Desktop viewport as WxH
        #[arg(long)]
        desktop_size: Option<String>,

        /// Mobile viewport as WxH
        #[arg(long)]
        mobile_size: Option<String>,

        /// Skip the mobile device pair
        #[arg(long)]
        desktop_only: bool,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// JavaScript runtime hosting the Playwright driver
        #[arg(long, env = "PAGE_COMPARE_NODE")]
        node: Option<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diff two local screenshots
    Diff {
        #[arg(short, long)]
        before: PathBuf,

        #[arg(short, long)]
        after: PathBuf,

        /// Directory for compare.png, diff.png and diff-shifted.png
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Per-channel tolerance (0-255)
        #[arg(short, long, env = "PAGE_COMPARE_TOLERANCE")]
        tolerance: Option<u8>,

        /// Gap between halves of the compare image (px)
        #[arg(long, env = "PAGE_COMPARE_MARGIN")]
        margin: Option<u32>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install the Chromium build Playwright drives
    Install {
        /// npx executable
        #[arg(long, default_value = "npx")]
        npx: String,
    },

    /// Create a mock framebuffer screenshot for fixtures
    Mock {
        /// Width in pixels
        #[arg(short = 'W', long, default_value = "800")]
        width: u32,

        /// Height in pixels
        #[arg(short = 'H', long, default_value = "600")]
        height: u32,

        /// Output file path
        #[arg(short, long, default_value = "./mock_screenshot.png")]
        output: PathBuf,

        /// Fill color as hex, RGB or RGBA (e.g., "ff0000" or "ff000080")
        #[arg(short, long, default_value = "ffffff")]
        color: String,

        /// Caption drawn in the top-left corner
        #[arg(long, default_value = "Mock Page")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Some(Commands::Run {
            before_url,
            after_url,
            routes,
            output_dir,
            archive_name,
            tolerance,
            margin,
            max_retries,
            desktop_size,
            mobile_size,
            desktop_only,
            headed,
            node,
            json,
        }) => {
            let cfg = config::get();
            let mut run = RunConfig::from_config(cfg);
            if let Some(url) = before_url {
                run.before_origin = url;
            }
            if let Some(url) = after_url {
                run.after_origin = url;
            }
            if let Some(tolerance) = tolerance {
                run.tolerance = tolerance;
            }
            if let Some(margin) = margin {
                run.margin = margin;
            }
            if let Some(attempts) = max_retries {
                run.max_retries = attempts;
            }
            if let Some(size) = desktop_size {
                let (w, h) = viewport_arg(&size)?;
                run.desktop = run.desktop.viewport(w, h);
            }
            if desktop_only {
                run.mobile = None;
            } else if let Some(size) = mobile_size {
                let (w, h) = viewport_arg(&size)?;
                run.mobile = run.mobile.map(|profile| profile.viewport(w, h));
            }
            run.validate()?;

            let routes = match routes {
                Some(path) => load_routes(&path)?,
                None => default_routes(),
            };

            let archive_path = output_dir
                .unwrap_or_else(|| cfg.output.dir.clone())
                .join(archive_name.unwrap_or_else(|| cfg.output.archive_name.clone()));
            let options = DriverOptions {
                node: node.unwrap_or_else(|| cfg.run.node.clone()),
                headless: cfg.run.headless && !headed,
            };

            let mut sink = ZipArchiveSink::create(&archive_path)?;
            let mut sessions = launch_sessions(&options, &run).await?;
            let report = run_comparison(&run, &routes, &mut sessions, &mut sink).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
                println!("\nArchive: {}", sink.path().display());
            }
        }

        Some(Commands::Diff {
            before,
            after,
            out,
            tolerance,
            margin,
            json,
        }) => {
            let cfg = config::get();
            let options = VisualizerOptions {
                margin: margin.unwrap_or(cfg.diff.margin),
                tolerance: tolerance.unwrap_or(cfg.diff.tolerance),
                white_threshold: cfg.diff.white_threshold,
            };

            let before_img = decode_raster("before", &std::fs::read(&before)?)?;
            let after_img = decode_raster("after", &std::fs::read(&after)?)?;
            let result = compare(&before_img, &after_img, options.tolerance);
            let images = visualize(&before_img, &after_img, options)?;
            write_diff_images(&out, &images)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{}% different ({} of {} pixels)",
                    result.rounded_percentage(),
                    result.different_pixels,
                    result.total_pixels
                );
                println!("  Images: {}", out.display());
            }
        }

        Some(Commands::Install { npx }) => {
            install_browsers(&npx).await?;
            println!("Chromium installed");
        }

        Some(Commands::Mock {
            width,
            height,
            output,
            color,
            text,
        }) => {
            let color_bytes = parse_hex_color(&color)?;
            let mut fb = MockFramebuffer::new(width, height);
            fb.fill(color_bytes);

            fb.draw_text(10, 10, &text, [0, 0, 0, 255], color_bytes);
            fb.draw_rect(10, 30, 100, 50, [128, 128, 128, 255]);

            std::fs::write(&output, fb.to_png()?)?;

            println!("Created mock screenshot: {}", output.display());
            println!("  Size: {}x{}", fb.width(), fb.height());
        }

        None => {
            println!("Page Compare - visual regression between two web origins");
            println!();
            println!("Usage: page-compare <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run      Compare every route on the before and after origins");
            println!("  diff     Diff two local screenshots");
            println!("  install  Install the Chromium build Playwright drives");
            println!("  mock     Create a mock framebuffer screenshot for fixtures");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

fn viewport_arg(size: &str) -> Result<(u32, u32), Box<dyn Error>> {
    parse_viewport(size).ok_or_else(|| format!("Invalid viewport '{}'. Use WxH (e.g., 1280x720)", size).into())
}

fn write_diff_images(dir: &Path, images: &DiffImages) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join("compare.png"), &images.compare)?;
    std::fs::write(dir.join("diff.png"), &images.diff)?;
    std::fs::write(dir.join("diff-shifted.png"), &images.shifted)?;
    info!("Wrote diff images to {}", dir.display());
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{:<28} {:<8} {:>6} {:>12} {:>9}", "Route", "Device", "Diff", "Pixels", "Attempts");
    for route in &report.routes {
        for device in &route.devices {
            println!(
                "{:<28} {:<8} {:>5}% {:>12} {:>9}",
                route.name,
                device.device,
                device.difference_percentage,
                format!("{}/{}", device.different_pixels, device.total_pixels),
                route.attempts
            );
        }
    }
    println!(
        "\n{} routes, {} entries in {:.1}s",
        report.routes.len(),
        report.entries,
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
}

fn parse_hex_color(hex: &str) -> Result<[u8; 4], Box<dyn Error>> {
    let hex = hex.trim_start_matches('#');
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return Err("Color must be 6 or 8 hex digits (e.g., 'ff0000' or 'ff000080')".into());
    }
    let r = u8::from_str_radix(&hex[0..2], 16)?;
    let g = u8::from_str_radix(&hex[2..4], 16)?;
    let b = u8::from_str_radix(&hex[4..6], 16)?;
    let a = if hex.len() == 8 {
        u8::from_str_radix(&hex[6..8], 16)?
    } else {
        255
    };
    Ok([r, g, b, a])
}
