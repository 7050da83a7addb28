use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cxgraph::analyzer::{Analyzer, TreeSitterAnalyzer};
use cxgraph::cache::CacheStore;
use cxgraph::config::Settings;
use cxgraph::delta::diff;
use cxgraph::db::Db;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cxgraph", about = "C-family indexing core demo CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a single C source file or a directory of them and print
    /// summary counts.
    Index {
        path: PathBuf,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Print summary stats from a persisted cache directory.
    Stats { cache_dir: PathBuf },
}

fn main() -> Result<()> {
    cxgraph::logging::init();
    let cli = Cli::parse();
    let settings = Settings::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Index { path, cache_dir } => run_index(path, cache_dir, &settings),
        Commands::Stats { cache_dir } => run_stats(cache_dir),
    }
}

fn run_index(path: PathBuf, cache_dir: Option<PathBuf>, settings: &Settings) -> Result<()> {
    let analyzer = TreeSitterAnalyzer::new();
    let cache = CacheStore::new(
        cache_dir.or_else(|| settings.cache.directory.clone()),
        settings.cache.format(),
        settings.cache.layout(),
        settings.cache.retention(),
    );

    let mut db = Db::new();
    let files = collect_c_files(&path)?;
    tracing::info!(count = files.len(), "discovered source files");

    for file in files {
        let result = analyzer
            .analyze(&[], &file, &[])
            .with_context(|| format!("analyzing {}", file.display()))?;
        for index in &result.indexes {
            let prev = cache.load("", &index.path);
            let update = diff(prev.as_ref(), index);
            db.apply(&update);
            let _ = cache.save("", &index.path, index, 1);
        }
    }

    println!(
        "indexed: {} funcs, {} types, {} vars, {} files",
        db.funcs.len(),
        db.types.len(),
        db.vars.len(),
        db.files.len()
    );
    Ok(())
}

fn run_stats(cache_dir: PathBuf) -> Result<()> {
    let count = std::fs::read_dir(&cache_dir)
        .with_context(|| format!("reading {}", cache_dir.display()))?
        .count();
    println!("{count} cache entries under {}", cache_dir.display());
    Ok(())
}

fn collect_c_files(path: &PathBuf) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if path.is_file() {
        out.push(path.clone());
        return Ok(out);
    }
    let mut stack = vec![path.clone()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
            let entry = entry?;
            let p = entry.path();
            if p.is_dir() {
                stack.push(p);
            } else if p.extension().and_then(|e| e.to_str()) == Some("c") {
                out.push(p);
            }
        }
    }
    Ok(out)
}
