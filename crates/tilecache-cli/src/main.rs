//! tilecache - command line front end for the offline tile cache.
//!
//! Fetches single tiles, seeds the cache for offline use, mounts a headless
//! map to show how a viewport resolves, and inspects or clears the cache.

mod commands;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tilecache_core::Config;

// ============================================================================
// Command line
// ============================================================================

#[derive(Parser)]
#[command(name = "tilecache", version)]
#[command(about = "Offline-capable map tile cache", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one tile and report where it came from
    Fetch {
        zoom: u8,
        x: u32,
        y: u32,

        /// Skip the network and answer from cache or placeholder
        #[arg(long)]
        offline: bool,

        /// Write the tile image here
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Download the tiles around a point so they are available offline
    Prefetch {
        #[command(flatten)]
        area: AreaArgs,

        /// Maximum downloads in flight
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },

    /// Mount a headless map and list how each tile was resolved
    Render {
        #[command(flatten)]
        area: AreaArgs,

        #[arg(long)]
        offline: bool,
    },

    /// Print network status and cache size
    Status,

    /// Inspect or maintain the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// A square block of tiles around a point.
#[derive(Args, Debug, Clone, Copy)]
struct AreaArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    #[arg(long, default_value_t = 12)]
    zoom: u8,

    /// Tiles on each side of the center tile
    #[arg(long, default_value_t = 1)]
    radius: u32,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Count and size of live cached tiles
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Delete expired entries
    Sweep,
    /// Delete every cached tile
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Startup
// ============================================================================

/// Initialize the tracing subscriber. Logs go to stderr, and to `log_file`
/// when given; the returned guard must live until exit to flush the file.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // RUST_LOG controls the level (e.g. RUST_LOG=tilecache_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;
    info!("tilecache starting");

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Fetch { zoom, x, y, offline, output } => {
            commands::fetch(&config, zoom, x, y, offline, output.as_deref()).await
        }
        Command::Prefetch { area, concurrency } => commands::prefetch(&config, area.into(), concurrency).await,
        Command::Render { area, offline } => commands::render(&config, area.into(), offline).await,
        Command::Status => commands::status(&config).await,
        Command::Cache { action } => match action {
            CacheAction::Stats { json } => commands::cache_stats(&config, json).await,
            CacheAction::Sweep => commands::cache_sweep(&config).await,
            CacheAction::Clear => commands::cache_clear(&config).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config),
            ConfigAction::Init { force } => {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                commands::config_init(&path, force)
            }
        },
    }
}

impl From<AreaArgs> for commands::Area {
    fn from(args: AreaArgs) -> Self {
        Self {
            lat: args.lat,
            lon: args.lon,
            zoom: args.zoom,
            radius: args.radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from(["tilecache", "fetch", "3", "1", "2", "--offline"]).unwrap();
        match cli.command {
            Command::Fetch { zoom, x, y, offline, output } => {
                assert_eq!((zoom, x, y), (3, 1, 2));
                assert!(offline);
                assert!(output.is_none());
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_parse_area_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "tilecache", "prefetch", "--lat", "-33.86", "--lon", "151.2", "--zoom", "10",
        ])
        .unwrap();
        match cli.command {
            Command::Prefetch { area, concurrency } => {
                assert_eq!(area.lat, -33.86);
                assert_eq!(area.radius, 1);
                assert_eq!(concurrency, 8);
            }
            _ => panic!("expected prefetch"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["tilecache", "cache", "stats", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }
}
