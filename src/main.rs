//! photoscroll simulator - drives one engine against an in-memory collection
//! and prints the settled viewport as JSON.

use clap::Parser;
use photoscroll::auth::{JsonFileTokenStore, TokenManager, TokenStore};
use photoscroll::engine::{ScrollEngine, Snapshot};
use photoscroll::model::{IsolationId, ItemIndex, SnapshotId};
use photoscroll::view_state::types::ContainerWidth;
use photoscroll::view_state::viewport::ViewportWindow;
use photoscroll::worker::{ImmediatePool, MemoryService, ThreadTransport, Worker, WorkerTransport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Aspect ratios cycled through when no dimensions file is given.
const DIMENSION_CYCLE: [(u32, u32); 5] = [
    (4000, 3000),
    (3000, 4000),
    (6000, 4000),
    (4000, 4000),
    (1080, 1920),
];

/// Virtual-scrolling simulator for large photo collections
#[derive(Parser, Debug)]
#[command(name = "photoscroll")]
#[command(version)]
#[command(about = "Lay out and lazily fetch a simulated photo collection, then print the viewport")]
pub struct Args {
    /// Number of items in the simulated collection
    #[arg(long, default_value = "1000")]
    pub items: usize,

    /// JSON file with `[[width, height], ...]` item dimensions (overrides --items)
    #[arg(long)]
    pub collection: Option<PathBuf>,

    /// Snapshot identifier of the simulated collection
    #[arg(long, default_value = "simulated")]
    pub snapshot: String,

    /// Container width in pixels
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,

    /// Viewport height in pixels
    #[arg(long)]
    pub viewport_height: Option<i64>,

    /// Scroll to this offset before settling
    #[arg(long, conflicts_with = "locate")]
    pub scroll_to: Option<i64>,

    /// Jump to the row containing this item before settling
    #[arg(long)]
    pub locate: Option<usize>,

    /// Give up settling after this many milliseconds
    #[arg(long, default_value = "5000")]
    pub timeout_ms: u64,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Settled engine state printed on stdout.
#[derive(Debug, Serialize)]
struct Report<'a> {
    snapshot: &'a str,
    item_count: usize,
    total_height: i64,
    measured_rows: usize,
    metadata_loaded: usize,
    markers: usize,
    settled: bool,
    window: &'a ViewportWindow,
}

fn load_dimensions(path: &Path) -> Result<Vec<(u32, u32)>, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let dimensions: Vec<(u32, u32)> = serde_json::from_str(&contents)?;
    Ok(dimensions)
}

fn cycled_dimensions(count: usize) -> Vec<(u32, u32)> {
    DIMENSION_CYCLE.iter().copied().cycle().take(count).collect()
}

/// Tick until the engine settles or `timeout` elapses. Returns whether it settled.
fn settle<T: WorkerTransport>(
    engine: &mut ScrollEngine<T>,
    timeout: Duration,
) -> Result<bool, Box<dyn std::error::Error>> {
    let give_up = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        engine.tick(now)?;
        if engine.is_settled() {
            return Ok(true);
        }
        if now >= give_up {
            return Ok(false);
        }
        let wait = engine
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(Duration::from_millis(5))
            .clamp(Duration::from_millis(1), Duration::from_millis(50));
        std::thread::sleep(wait);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Defaults → Config File → Env Vars → CLI Args
    let config = photoscroll::config::resolve(args.config.clone(), args.width, args.viewport_height)?;

    if args.log_stderr {
        photoscroll::logging::init_stderr()?;
    } else {
        photoscroll::logging::init(&config.log_file_path)?;
    }

    info!(config = ?config, "Configuration loaded and resolved");

    let dimensions = match &args.collection {
        Some(path) => load_dimensions(path)?,
        None => cycled_dimensions(args.items),
    };
    let snapshot_id = SnapshotId::new(args.snapshot.clone())?;

    let service = MemoryService::new(snapshot_id.clone(), &dimensions, config.row_capacity);
    let login = service.login();

    let store = JsonFileTokenStore::open(&config.token_store_path)?;
    let mut tokens = TokenManager::new(TokenStore::File(store));
    let restored = tokens.restore();
    info!(restored, path = %config.token_store_path.display(), "Token store opened");

    let worker = Worker::new(service, ImmediatePool::new(), tokens, config.worker_config());
    let transport = ThreadTransport::spawn(worker);

    let mut engine = ScrollEngine::new(IsolationId::main(), config.engine_config(), transport);
    let now = Instant::now();
    engine.establish(
        Snapshot {
            id: snapshot_id,
            item_count: dimensions.len(),
            token: Some(login),
        },
        now,
    )?;
    engine.set_container_width(ContainerWidth::new(config.container_width)?, now)?;
    engine.set_viewport_height(config.viewport_height, now);

    if let Some(item) = args.locate {
        let row = engine.locate(ItemIndex::new(item), now)?;
        info!(item, row = row.get(), "Locating item");
    } else if let Some(scroll_top) = args.scroll_to {
        let input = engine.scroll_to(scroll_top, now);
        info!(scroll_top, ?input, "Scrolling");
    }

    let settled = settle(&mut engine, Duration::from_millis(args.timeout_ms))?;
    if !settled {
        warn!(timeout_ms = args.timeout_ms, "Engine did not settle before the timeout");
    }

    let report = Report {
        snapshot: &args.snapshot,
        item_count: engine.item_count(),
        total_height: engine.total_height(),
        measured_rows: engine.ledger().measured_count(),
        metadata_loaded: engine.metadata_len(),
        markers: engine.markers().len(),
        settled,
        window: engine.window(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    engine.teardown()?;
    Ok(())
}
