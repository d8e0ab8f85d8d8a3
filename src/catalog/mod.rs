//! Track catalog
//!
//! Enumerates the playable files of the station and hands out byte
//! sources for them. Each listing is fresh, so a shuffled station gets a
//! new order on every loop cycle.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

use crate::config::StationConfig;
use crate::error::CatalogError;

/// Forward-only byte source for one track
pub type TrackReader = Box<dyn AsyncRead + Send + Unpin>;

/// One playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Track {
    /// File name, used as the track identifier
    pub name: String,
    /// Absolute path of the file
    pub path: PathBuf,
}

impl Track {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Source of tracks and their bytes
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// List every playable track in play order.
    ///
    /// An empty list is not an error here; the engine decides what an
    /// empty station means.
    async fn list_tracks(&self) -> Result<Vec<Track>, CatalogError>;

    /// Open the byte source of a listed track
    async fn open(&self, track: &Track) -> std::io::Result<TrackReader>;
}

/// Catalog backed by a directory of audio files
pub struct DirectoryCatalog {
    dir: PathBuf,
    extension: String,
    shuffle: bool,
}

impl DirectoryCatalog {
    pub fn new(dir: impl Into<PathBuf>, extension: &str, shuffle: bool) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            shuffle,
        }
    }

    pub fn from_config(config: &StationConfig) -> Self {
        Self::new(&config.music_dir, &config.extension, config.shuffle)
    }

    fn is_playable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    fn unavailable(&self, source: std::io::Error) -> CatalogError {
        CatalogError::Unavailable {
            path: self.dir.clone(),
            source,
        }
    }
}

#[async_trait]
impl TrackCatalog for DirectoryCatalog {
    async fn list_tracks(&self) -> Result<Vec<Track>, CatalogError> {
        let dir = tokio::fs::canonicalize(&self.dir)
            .await
            .map_err(|e| self.unavailable(e))?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| self.unavailable(e))?;

        let mut tracks = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.unavailable(e))? {
            let path = entry.path();
            if !self.is_playable(&path) {
                continue;
            }
            // Follows symlinks, unlike DirEntry::file_type
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!("Skipping non UTF-8 file name: {}", path.display());
                continue;
            };
            tracks.push(Track::new(name, &path));
        }

        arrange(&mut tracks, self.shuffle, &mut rand::rng());
        tracing::debug!("Listed {} tracks from {}", tracks.len(), dir.display());
        Ok(tracks)
    }

    async fn open(&self, track: &Track) -> std::io::Result<TrackReader> {
        let file = tokio::fs::File::open(&track.path).await?;
        Ok(Box::new(file))
    }
}

/// Put tracks in play order: lexical by name, then a uniform
/// Fisher-Yates shuffle when requested.
pub fn arrange<R: Rng + ?Sized>(tracks: &mut [Track], shuffle: bool, rng: &mut R) {
    tracks.sort_by(|a, b| a.name.cmp(&b.name));
    if shuffle {
        tracks.shuffle(rng);
    }
}
