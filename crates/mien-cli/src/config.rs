use std::path::PathBuf;

use mien_cache::DEFAULT_MAX_CROP_DIM;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Root directory holding every cache store and the face image tree.
    pub cache_dir: PathBuf,
    /// Maximum side-car image dimension for cached face crops.
    pub max_crop_dim: u32,
}

impl Config {
    /// Load configuration from `MIEN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("mien");

        let cache_dir = std::env::var("MIEN_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(data_dir);

        Self {
            cache_dir,
            max_crop_dim: env_u32("MIEN_MAX_CROP_DIM", DEFAULT_MAX_CROP_DIM),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
