//! Media sources and the decode cache
//!
//! The renderer never opens files itself: it asks a [`MediaSource`] for a
//! decoded buffer by media id and memoizes the result in a [`DecodeCache`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use walkdir::WalkDir;

use crate::engine::io::import_wav;
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};

/// Supplies decoded PCM for media ids
pub trait MediaSource: Send + Sync {
    /// Decode the media behind `media_id`
    ///
    /// Unknown ids fail with `NotFound`; unreadable media with `Decode`.
    fn decode(&self, media_id: &str) -> Result<AudioBuffer>;
}

/// Media held in memory, keyed by id
#[derive(Debug, Clone, Default)]
pub struct InMemoryMediaSource {
    buffers: HashMap<String, AudioBuffer>,
}

impl InMemoryMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, media_id: impl Into<String>, buffer: AudioBuffer) {
        self.buffers.insert(media_id.into(), buffer);
    }

    pub fn with(mut self, media_id: impl Into<String>, buffer: AudioBuffer) -> Self {
        self.insert(media_id, buffer);
        self
    }
}

impl MediaSource for InMemoryMediaSource {
    fn decode(&self, media_id: &str) -> Result<AudioBuffer> {
        self.buffers
            .get(media_id)
            .cloned()
            .ok_or_else(|| SpliceError::not_found("media", media_id))
    }
}

/// WAV files under a directory, addressed by file stem
///
/// The directory is indexed once at construction; nested directories are
/// included. When two files share a stem the first one walked wins.
#[derive(Debug, Clone)]
pub struct DirectoryMediaSource {
    root: PathBuf,
    index: HashMap<String, PathBuf>,
}

impl DirectoryMediaSource {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(SpliceError::not_found("media directory", root.display().to_string()));
        }

        let mut index = HashMap::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let path = entry.path();
            let is_wav = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false);
            if !is_wav {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                index
                    .entry(stem.to_string_lossy().into_owned())
                    .or_insert_with(|| path.to_path_buf());
            }
        }
        debug!(root = %root.display(), files = index.len(), "indexed media directory");

        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Indexed media ids, sorted
    pub fn media_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.index.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl MediaSource for DirectoryMediaSource {
    fn decode(&self, media_id: &str) -> Result<AudioBuffer> {
        let path = self
            .index
            .get(media_id)
            .ok_or_else(|| SpliceError::not_found("media", media_id))?;
        import_wav(path)
    }
}

/// Decode-once memo of media buffers
///
/// Failures are not cached, so a later call retries the source.
#[derive(Debug, Default)]
pub struct DecodeCache {
    entries: Mutex<HashMap<String, Arc<AudioBuffer>>>,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_decode(
        &self,
        media_id: &str,
        source: &dyn MediaSource,
    ) -> Result<Arc<AudioBuffer>> {
        if let Some(hit) = self.lock().get(media_id) {
            return Ok(Arc::clone(hit));
        }

        // Decoding happens outside the lock; a racing miss decodes twice and
        // keeps the first result.
        let decoded = Arc::new(source.decode(media_id)?);
        debug!(
            media_id,
            channels = decoded.num_channels(),
            frames = decoded.num_frames(),
            "decoded media"
        );
        Ok(Arc::clone(
            self.lock().entry(media_id.to_string()).or_insert(decoded),
        ))
    }

    pub fn contains(&self, media_id: &str) -> bool {
        self.lock().contains_key(media_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<AudioBuffer>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
