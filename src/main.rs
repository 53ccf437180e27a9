//! # Butterfly-cells CLI
//!
//! Command-line interface for the butterfly-cells library.
//! Inspects cell ids and keys, covers triangles, and simplifies index streams.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use butterfly_cells::{
    try_optimize, CellIdConverter, Covering, Error, RectId, StreamOptions, StreamSimplifier,
    RECT_ID_DEPTH,
};
use clap::{Parser, Subcommand};
use geo::Coord;
use log::{debug, error};
use serde::Serialize;

mod cli;

/// Command-line interface for butterfly-cells
#[derive(Parser)]
#[command(name = "butterfly-cells")]
#[command(about = "Quadtree cell ids and coverings for OpenStreetMap feature indexing")]
#[command(long_about = "Works with depth-19 quadtree cells over the Mercator plane:
  butterfly-cells cell 0123                    # Describe a cell as JSON
  butterfly-cells cell --key 72200890973       # Decode a storage key
  butterfly-cells cover --triangle 4.3,50.8,4.45,50.8,4.3,50.9 --level 12
  butterfly-cells optimize ids.txt --min-id 0  # Simplify one feature's keys
  butterfly-cells simplify index.txt           # Simplify an \"id value\" stream")]
#[command(version = env!("BUTTERFLY_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a cell given as a digit string or a storage key
    Cell {
        /// Digit string over 0..=3, or an integer key with --key
        id: String,

        /// Interpret ID as a pre-order integer key
        #[arg(long)]
        key: bool,

        /// Depth of the key numbering
        #[arg(long, default_value_t = RECT_ID_DEPTH)]
        depth: u32,
    },

    /// Cover a triangle given in world coordinates
    Cover {
        /// Triangle vertices as X1,Y1,X2,Y2,X3,Y3
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        triangle: Vec<f64>,

        /// Deepest cell level of the covering
        #[arg(long)]
        level: u32,

        /// Print sorted storage keys instead of digit strings
        #[arg(long)]
        keys: bool,
    },

    /// Simplify one sorted list of keys, one per line
    Optimize {
        /// Input file, or "-" for stdin
        input: Option<PathBuf>,

        /// Keys below this floor are never merged away
        #[arg(long, default_value_t = 0)]
        min_id: i64,
    },

    /// Simplify a sorted stream of "id value" lines
    Simplify {
        /// Input file, or "-" for stdin
        input: Option<PathBuf>,

        /// Maximum buffered entries
        #[arg(long)]
        window_size: Option<usize>,

        /// Occurrences of one value that trigger simplification
        #[arg(long)]
        max_duplicates: Option<usize>,

        /// Show a progress bar while reading a file
        #[arg(long)]
        progress: bool,
    },
}

/// JSON description of one cell
#[derive(Debug, Serialize)]
struct CellInfo {
    id: String,
    level: u32,
    bits: u64,
    x: u32,
    y: u32,
    radius: u32,
    key: i64,
    parent: Option<String>,
}

impl CellInfo {
    fn new(cell: &RectId, depth: u32) -> Self {
        let (x, y) = cell.xy();
        Self {
            id: cell.to_string(),
            level: cell.level(),
            bits: cell.bits(),
            x,
            y,
            radius: cell.radius(),
            key: cell.to_int64(depth),
            parent: (!cell.is_root()).then(|| cell.parent().to_string()),
        }
    }
}

fn main() {
    if let Err(e) = run() {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.target(env_logger::Target::Stderr).init();

    if cli.verbose {
        eprintln!("🦋 Butterfly-cells v{} starting...", env!("BUTTERFLY_VERSION"));
    }

    match cli.command {
        Commands::Cell { id, key, depth } => describe_cell(&id, key, depth),
        Commands::Cover {
            triangle,
            level,
            keys,
        } => cover_triangle(&triangle, level, keys),
        Commands::Optimize { input, min_id } => optimize_keys(input.as_deref(), min_id),
        Commands::Simplify {
            input,
            window_size,
            max_duplicates,
            progress,
        } => {
            let defaults = StreamOptions::default();
            let options = StreamOptions {
                window_size: window_size.unwrap_or(defaults.window_size),
                max_duplicates: max_duplicates.unwrap_or(defaults.max_duplicates),
            };
            simplify_stream(input.as_deref(), options, progress)
        }
    }
}

fn describe_cell(id: &str, key: bool, depth: u32) -> Result<()> {
    if depth == 0 || depth > RECT_ID_DEPTH {
        return Err(Error::InvalidDepth {
            depth,
            max: RECT_ID_DEPTH,
        }
        .into());
    }

    let cell = if key {
        let key: i64 = id.parse().with_context(|| format!("Invalid cell key '{id}'"))?;
        RectId::try_from_int64(key, depth)?
    } else {
        id.parse::<RectId>()?
    };

    println!("{}", serde_json::to_string_pretty(&CellInfo::new(&cell, depth))?);
    Ok(())
}

fn cover_triangle(triangle: &[f64], level: u32, keys: bool) -> Result<()> {
    if triangle.len() != 6 {
        bail!("--triangle needs exactly six numbers, got {}", triangle.len());
    }
    if level >= RECT_ID_DEPTH {
        return Err(Error::InvalidLevel {
            level,
            max: RECT_ID_DEPTH,
        }
        .into());
    }

    let converter = CellIdConverter::<RECT_ID_DEPTH>::default();
    let [a, b, c] = [0, 2, 4].map(|i| {
        converter.to_cell_space(Coord {
            x: triangle[i],
            y: triangle[i + 1],
        })
    });
    let covering = Covering::<RECT_ID_DEPTH>::from_triangle(a, b, c, level);
    debug!("Triangle covered by {} cells", covering.size());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if keys {
        let mut ids = covering.to_int64_vec(RECT_ID_DEPTH);
        ids.sort_unstable();
        for id in ids {
            writeln!(out, "{id}")?;
        }
    } else {
        for cell in covering.iter() {
            writeln!(out, "{cell}")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn optimize_keys(input: Option<&Path>, min_id: i64) -> Result<()> {
    let reader = open_input(input)?;
    let mut ids = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id: i64 = line
            .parse()
            .with_context(|| format!("line {}: invalid key '{line}'", n + 1))?;
        ids.push(id);
    }

    let optimized = try_optimize::<RECT_ID_DEPTH>(&ids, min_id)?;
    debug!("Optimized {} keys into {}", ids.len(), optimized.len());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for id in optimized {
        writeln!(out, "{id}")?;
    }
    out.flush()?;
    Ok(())
}

fn simplify_stream(input: Option<&Path>, options: StreamOptions, progress: bool) -> Result<()> {
    let mut progress_manager = None;
    let reader: Box<dyn BufRead> = match input {
        Some(path) if progress && path != Path::new("-") => {
            let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
            let size = file.metadata()?.len();
            let manager = cli::ProgressManager::new(size, &format!("📖 Simplifying {}", path.display()));
            let reader = Box::new(BufReader::new(manager.wrap_read(file)));
            progress_manager = Some(manager);
            reader
        }
        _ => open_input(input)?,
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_error: Option<io::Error> = None;
    let mut added = 0usize;
    {
        let mut simplifier = StreamSimplifier::<RECT_ID_DEPTH, String, _>::try_new(options, |id, value| {
            if write_error.is_none() {
                if let Err(e) = writeln!(out, "{id} {value}") {
                    write_error = Some(e);
                }
            }
        })?;

        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (id, value) = line
                .split_once(char::is_whitespace)
                .with_context(|| format!("line {}: expected \"id value\"", n + 1))?;
            let id: i64 = id
                .parse()
                .with_context(|| format!("line {}: invalid key '{id}'", n + 1))?;
            simplifier
                .try_add(id, value.trim().to_string())
                .with_context(|| format!("line {}", n + 1))?;
            added += 1;
        }

        simplifier.flush();
        debug!("Simplified {added} entries into {}", simplifier.emitted());
    }

    if let Some(e) = write_error {
        return Err(e.into());
    }
    out.flush()?;
    if let Some(manager) = progress_manager {
        manager.finish("✅ Simplification completed!");
    }
    Ok(())
}

/// File reader, or stdin for `None` and "-"
fn open_input(input: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match input {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(io::stdin().lock()))),
    }
}
