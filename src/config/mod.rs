mod file_config;

pub use file_config::FileConfig;

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Where every artifact lives. Built once at startup and handed by reference to
/// the placement resolver and the directory provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub root: PathBuf,
}

impl ArchiveConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.root.join("music")
    }

    /// Per-collection directory holding track audio and the bundle.
    pub fn collection_dir(&self, collection_id: &str) -> PathBuf {
        self.music_dir().join(collection_id)
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos")
    }

    pub fn sheets_dir(&self) -> PathBuf {
        self.root.join("sheets")
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub archive_root: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub archive: ArchiveConfig,
    pub db_path: PathBuf,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let archive_root = file
            .archive_root
            .map(PathBuf::from)
            .or_else(|| cli.archive_root.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "archive_root must be specified via --archive-root or in config file"
                )
            })?;

        if archive_root.exists() && !archive_root.is_dir() {
            bail!("archive_root is not a directory: {:?}", archive_root);
        }

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| default_db_path(&archive_root));

        Ok(Self {
            archive: ArchiveConfig::new(archive_root),
            db_path,
        })
    }
}

fn default_db_path(archive_root: &Path) -> PathBuf {
    archive_root.join("archive.db")
}
