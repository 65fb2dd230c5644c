use std::path::{Path, PathBuf};

use serde::Serialize;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "webm"];
pub const SFX_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac", "m4a", "aac"];
pub const BGM_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        if has_extension(path, IMAGE_EXTENSIONS) {
            Some(Self::Image)
        } else if has_extension(path, VIDEO_EXTENSIONS) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    path: PathBuf,
    kind: MediaKind,
}

impl MediaItem {
    /// Returns `None` for files that are neither images nor videos.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = MediaKind::from_path(&path)?;
        Some(Self { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_extension_case_insensitively() {
        assert_eq!(MediaKind::from_path(Path::new("a.PNG")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("dir/b.Mp4")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("c.webp")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaKind::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn unplayable_paths_are_not_media_items() {
        assert!(MediaItem::from_path("song.mp3").is_none());
        let item = MediaItem::from_path("/memes/cat.gif").unwrap();
        assert_eq!(item.kind(), MediaKind::Image);
        assert_eq!(item.file_name(), "cat.gif");
    }
}
