//! Renders one view of a tile map to a PNG file.
//!
//! Remote sources are redrawn as tiles arrive until the view is complete or
//! the deadline passes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use image::Rgba;
use log::{info, warn};

use tilemap::logging::{self, LogMode};
use tilemap::{
    Canvas, EmbeddedDatabase, EngineConfig, ImageCanvas, LatLng, LocalPyramid, MapError,
    RemoteProvider, TileEvent, TileMap, TileSource, TileSourceConfig, Viewport,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogArg {
    Full,
    Light,
    None,
}

impl From<LogArg> for LogMode {
    fn from(arg: LogArg) -> Self {
        match arg {
            LogArg::Full => LogMode::Full,
            LogArg::Light => LogMode::Light,
            LogArg::None => LogMode::None,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tilemap-render", version, about = "Render a raster tile map view to PNG")]
struct Args {
    /// Provider line: name, code, min, max, size, uri, servers..., ellipsoid, yinverse, secret, threads, ttl
    #[arg(long, conflicts_with_all = ["mbtiles", "local"])]
    provider: Option<String>,

    /// MBTiles or RMaps SQLite database
    #[arg(long, conflicts_with = "local")]
    mbtiles: Option<PathBuf>,

    /// Local tile tree with z{N}/.../y{N}.ext layout
    #[arg(long)]
    local: Option<PathBuf>,

    /// File extension of local tiles
    #[arg(long, default_value = ".png")]
    ext: String,

    /// Local tree numbers zoom levels from 1
    #[arg(long)]
    sas: bool,

    /// Directory for downloaded tiles
    #[arg(long, default_value = "tile-cache")]
    cache_dir: PathBuf,

    #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
    lon: f64,

    /// Pyramid level shown unscaled; defaults to the finest level
    #[arg(long)]
    level: Option<u8>,

    /// Zoom factor relative to the level
    #[arg(long, default_value_t = 1.0)]
    zoom: f64,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    #[arg(short, long, default_value = "map.png")]
    out: PathBuf,

    /// Seconds to wait for remote tiles
    #[arg(long, default_value_t = 30)]
    deadline: u64,

    /// Print map details as JSON and exit
    #[arg(long)]
    info: bool,

    #[arg(long, value_enum, default_value_t = LogArg::Light)]
    log: LogArg,
}

fn open_source(args: &Args, config: &EngineConfig) -> Result<Arc<dyn TileSource>> {
    if let Some(line) = &args.provider {
        let source_config = TileSourceConfig::from_provider_line(line)
            .with_context(|| format!("invalid provider line: {}", line))?;
        let provider = RemoteProvider::new(source_config, &args.cache_dir, &config.fetch)?;
        return Ok(Arc::new(provider));
    }
    if let Some(path) = &args.mbtiles {
        let database = EmbeddedDatabase::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        return Ok(Arc::new(database));
    }
    if let Some(root) = &args.local {
        let offset = if args.sas { 1 } else { 0 };
        let pyramid = LocalPyramid::scan(root, args.ext.clone(), offset)
            .with_context(|| format!("failed to scan {}", root.display()))?;
        return Ok(Arc::new(pyramid));
    }
    bail!("one of --provider, --mbtiles or --local is required")
}

fn downloads_settled(map: &TileMap) -> bool {
    map.pipeline()
        .map_or(true, |p| p.pending_count() + p.in_flight_count() == 0)
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log.into());

    let config = EngineConfig::default();
    let source = open_source(&args, &config)?;
    let mut map = match args.level {
        Some(level) => TileMap::with_default_zoom(source, config, level),
        None => TileMap::new(source, config),
    };
    map.activate(args.width, args.height, args.zoom)?;

    if args.info {
        println!("{}", map.info().to_json()?);
        return Ok(());
    }

    let mut viewport = Viewport::new(LatLng::new(args.lat, args.lon), args.width, args.height);
    let mut canvas = ImageCanvas::new(args.width, args.height);
    let events = map.events();
    let deadline = Instant::now() + Duration::from_secs(args.deadline);

    loop {
        let complete = match map.draw(&mut viewport, &mut canvas) {
            Ok(complete) => complete,
            Err(MapError::OutOfMemory(message)) => {
                warn!("{}", message);
                canvas.clear(Rgba([0, 0, 0, 0]));
                break;
            }
            Err(e) => return Err(e.into()),
        };
        // Stretched stand-ins count as complete, so wait for their downloads too
        if downloads_settled(&map) {
            if !complete {
                warn!("No imagery for part of the view");
            }
            break;
        }

        let Some(events) = &events else {
            break;
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(TileEvent::Loaded(_)) => {}
            Ok(TileEvent::Failed { coord, error }) => warn!("Tile {:?} failed: {}", coord, error),
            Err(_) => {
                warn!("Deadline passed with the view incomplete");
                break;
            }
        }
        // Coalesce a burst of arrivals into one redraw
        while events.try_recv().is_ok() {}
    }

    canvas
        .into_image()
        .save(&args.out)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    info!("Wrote {} ({})", args.out.display(), map.title());
    Ok(())
}
