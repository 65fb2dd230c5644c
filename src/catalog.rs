use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::media::{has_extension, MediaItem, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};

/// Ordered, duplicate-free list of playable items. A catalog is never edited
/// in place: a folder change or a new search produces a fresh one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    root: Option<PathBuf>,
    items: Vec<MediaItem>,
}

impl Catalog {
    /// Recursively collects every image and video under `root`, sorted by path.
    /// An unreadable root simply produces an empty catalog.
    pub fn scan(root: &Path) -> Self {
        let mut playable = Vec::with_capacity(IMAGE_EXTENSIONS.len() + VIDEO_EXTENSIONS.len());
        playable.extend_from_slice(IMAGE_EXTENSIONS);
        playable.extend_from_slice(VIDEO_EXTENSIONS);

        let items = scan_files(root, &playable)
            .into_iter()
            .filter_map(MediaItem::from_path)
            .collect();

        Self {
            root: Some(root.to_path_buf()),
            items,
        }
    }

    /// Builds a path-sorted catalog from an explicit path list.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut items: Vec<MediaItem> = paths
            .into_iter()
            .filter_map(|path| MediaItem::from_path(path))
            .collect();
        items.sort_by(|a, b| a.path().cmp(b.path()));
        items.dedup_by(|a, b| a.path() == b.path());

        Self { root: None, items }
    }

    /// Keeps the given order and drops later duplicates, e.g. for a playlist
    /// the user arranged by hand.
    pub fn from_ordered_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut items: Vec<MediaItem> = Vec::new();
        for item in paths.into_iter().filter_map(|path| MediaItem::from_path(path)) {
            if !items.iter().any(|seen| seen.path() == item.path()) {
                items.push(item);
            }
        }

        Self { root: None, items }
    }

    /// Case-insensitive substring match on the file name. A blank query
    /// returns the catalog unchanged.
    pub fn filter(&self, query: &str) -> Self {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.clone();
        }

        let items = self
            .items
            .iter()
            .filter(|item| item.file_name().to_lowercase().contains(&query))
            .cloned()
            .collect();

        Self {
            root: self.root.clone(),
            items,
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&MediaItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, path: &Path) -> Option<usize> {
        self.items.iter().position(|item| item.path() == path)
    }

    pub fn has_videos(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.kind() == crate::media::MediaKind::Video)
    }

    /// Name shown in listings: relative to the scanned root when there is one.
    pub fn display_name(&self, item: &MediaItem) -> String {
        self.root
            .as_deref()
            .and_then(|root| item.path().strip_prefix(root).ok())
            .map(|relative| relative.to_string_lossy().to_string())
            .unwrap_or_else(|| item.path().to_string_lossy().to_string())
    }
}

/// Recursive listing of the files under `root` whose extension is one of
/// `extensions`, sorted and deduplicated. Walk errors are skipped.
pub fn scan_files(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, extensions))
        .collect();

    files.sort();
    files.dedup();
    files
}
