use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use mien_cache::{AlignmentCache, CacheSource, EmbeddingCache, FaceCache};
use mien_client::HttpModelClient;

mod config;
use config::Config;

#[derive(Parser)]
#[command(name = "mien", about = "Mien face alignment & embedding cache CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align and embed every image under a dataset directory
    Setup {
        /// Directory scanned recursively for jpg/jpeg/png files
        dataset: PathBuf,
    },
    /// Detect faces in every image under a dataset directory
    Align { dataset: PathBuf },
    /// Compute embeddings for every face found in a dataset directory
    Embed { dataset: PathBuf },
    /// Report the number of entries in a cache
    Count { cache: CacheRole },
    /// Irreversibly clear a cache
    Destroy { cache: CacheRole },
    /// Check whether the model service is reachable
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CacheRole {
    Alignment,
    Embedding,
    Face,
}

struct Caches {
    alignment: AlignmentCache<HttpModelClient>,
    embedding: EmbeddingCache<HttpModelClient>,
    faces: FaceCache,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();
    // The CLI owns the cache root; the stores themselves never create
    // their parent directory.
    tokio::fs::create_dir_all(&config.cache_dir)
        .await
        .with_context(|| format!("creating cache dir {}", config.cache_dir.display()))?;

    match cli.command {
        Commands::Setup { dataset } => {
            let caches = open_caches(&config).await?;
            run_align(&caches, &dataset).await?;
            run_embed(&caches, &dataset).await?;
        }
        Commands::Align { dataset } => {
            let caches = open_caches(&config).await?;
            run_align(&caches, &dataset).await?;
        }
        Commands::Embed { dataset } => {
            let caches = open_caches(&config).await?;
            run_embed(&caches, &dataset).await?;
        }
        Commands::Count { cache } => {
            let caches = open_caches(&config).await?;
            let count = match cache {
                CacheRole::Alignment => caches.alignment.count().await?,
                CacheRole::Embedding => caches.embedding.count().await?,
                CacheRole::Face => caches.faces.count().await?,
            };
            println!("{count}");
        }
        Commands::Destroy { cache } => {
            let caches = open_caches(&config).await?;
            match cache {
                CacheRole::Alignment => caches.alignment.destroy().await?,
                CacheRole::Embedding => caches.embedding.destroy().await?,
                CacheRole::Face => caches.faces.destroy().await?,
            }
            tracing::info!(cache = ?cache, "cache destroyed");
        }
        Commands::Status => {
            let client = HttpModelClient::from_env()?;
            if client.health_check().await {
                println!("model service: ok");
            } else {
                bail!("model service unreachable");
            }
        }
    }
    Ok(())
}

async fn open_caches(config: &Config) -> Result<Caches> {
    let client = HttpModelClient::from_env()?;
    let faces = FaceCache::with_max_crop_dim(&config.cache_dir, config.max_crop_dim).await?;
    let alignment =
        AlignmentCache::open(&config.cache_dir, faces.clone(), client.clone()).await?;
    let embedding = EmbeddingCache::open(&config.cache_dir, client).await?;
    Ok(Caches {
        alignment,
        embedding,
        faces,
    })
}

/// Align every dataset image, reporting hit/miss/face tallies.
async fn run_align(caches: &Caches, dataset: &Path) -> Result<()> {
    let files = collect_images(dataset)?;
    tracing::info!(dataset = %dataset.display(), images = files.len(), "alignment run");

    let (mut hits, mut misses, mut faces) = (0usize, 0usize, 0usize);
    for file in &files {
        let lookup = caches
            .alignment
            .align_path(file)
            .await
            .with_context(|| format!("aligning {}", file.display()))?;
        match lookup.source {
            CacheSource::Hit => hits += 1,
            CacheSource::Miss => misses += 1,
        }
        faces += lookup.value.len();
    }

    tracing::info!(hits, misses, faces, "alignment run complete");
    println!("aligned {} images ({hits} cached, {misses} computed), {faces} faces", files.len());
    Ok(())
}

/// Embed every face of every dataset image.
async fn run_embed(caches: &Caches, dataset: &Path) -> Result<()> {
    let files = collect_images(dataset)?;
    tracing::info!(dataset = %dataset.display(), images = files.len(), "embedding run");

    let (mut hits, mut misses) = (0usize, 0usize);
    for file in &files {
        let aligned = caches
            .alignment
            .align_path(file)
            .await
            .with_context(|| format!("aligning {}", file.display()))?;
        for face in &aligned.value {
            let lookup = caches
                .embedding
                .embedding(face)
                .await
                .with_context(|| format!("embedding face {} of {}", face.id(), file.display()))?;
            match lookup.source {
                CacheSource::Hit => hits += 1,
                CacheSource::Miss => misses += 1,
            }
        }
    }

    tracing::info!(hits, misses, "embedding run complete");
    println!("embedded {} faces ({hits} cached, {misses} computed)", hits + misses);
    Ok(())
}

/// Recursively collect image files (jpg/jpeg/png), sorted for stable runs.
fn collect_images(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("dataset directory does not exist: {}", root.display());
    }
    let mut stack = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_image(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            e == "jpg" || e == "jpeg" || e == "png"
        })
        .unwrap_or(false)
}
