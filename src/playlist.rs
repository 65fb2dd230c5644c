use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{PlayerError, PlayerResult};

/// Named lists of file paths, saved as one JSON object
/// (`{ "name": ["path", ...] }`) that is rewritten after every change.
#[derive(Debug)]
pub struct PlaylistStore {
    path: PathBuf,
    playlists: BTreeMap<String, Vec<PathBuf>>,
}

impl PlaylistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            playlists: BTreeMap::new(),
        }
    }

    /// Opens the document at `path`. A missing, unreadable or corrupt
    /// document yields an empty store; the file is left untouched until the
    /// next mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        if let Err(e) = store.load() {
            warn!("Failed to load playlists from {}: {}", store.path.display(), e);
            store.playlists.clear();
        }
        store
    }

    pub fn load(&mut self) -> PlayerResult<()> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.playlists.clear();
                return Ok(());
            }
            Err(e) => return Err(PlayerError::io(&self.path, e)),
        };

        self.playlists = serde_json::from_str(&text)?;
        info!("Loaded {} playlists from {}", self.playlists.len(), self.path.display());
        Ok(())
    }

    pub fn save(&self) -> PlayerResult<()> {
        write_document(&self.path, &self.playlists)
    }

    /// Applies `change` to a copy of the playlists and keeps the copy only
    /// once it is on disk.
    fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut BTreeMap<String, Vec<PathBuf>>) -> PlayerResult<T>,
    ) -> PlayerResult<T> {
        let mut updated = self.playlists.clone();
        let outcome = change(&mut updated)?;
        write_document(&self.path, &updated)?;
        self.playlists = updated;
        Ok(outcome)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn names(&self) -> Vec<String> {
        self.playlists.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&[PathBuf]> {
        self.playlists.get(name).map(Vec::as_slice)
    }

    pub fn create(&mut self, name: &str) -> PlayerResult<()> {
        let name = validate_name(name)?;
        if self.playlists.contains_key(name) {
            return Err(PlayerError::DuplicateName(name.to_string()));
        }
        self.commit(|playlists| {
            playlists.insert(name.to_string(), Vec::new());
            Ok(())
        })
    }

    /// Appends the paths not already in the playlist. Returns how many were added.
    pub fn add_paths<I, P>(&mut self, name: &str, paths: I) -> PlayerResult<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.commit(|playlists| {
            let entries = playlists
                .get_mut(name)
                .ok_or_else(|| PlayerError::UnknownPlaylist(name.to_string()))?;

            let mut added = 0;
            for path in paths {
                let path = path.into();
                if !entries.contains(&path) {
                    entries.push(path);
                    added += 1;
                }
            }
            Ok(added)
        })
    }

    pub fn remove_paths<I, P>(&mut self, name: &str, paths: I) -> PlayerResult<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.commit(|playlists| {
            let entries = playlists
                .get_mut(name)
                .ok_or_else(|| PlayerError::UnknownPlaylist(name.to_string()))?;

            let doomed: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
            let before = entries.len();
            entries.retain(|path| !doomed.contains(path));
            Ok(before - entries.len())
        })
    }

    pub fn rename(&mut self, from: &str, to: &str) -> PlayerResult<()> {
        let to = validate_name(to)?;
        if !self.playlists.contains_key(from) {
            return Err(PlayerError::UnknownPlaylist(from.to_string()));
        }
        if from == to {
            return Ok(());
        }
        if self.playlists.contains_key(to) {
            return Err(PlayerError::DuplicateName(to.to_string()));
        }

        self.commit(|playlists| {
            if let Some(entries) = playlists.remove(from) {
                playlists.insert(to.to_string(), entries);
            }
            Ok(())
        })
    }

    pub fn remove(&mut self, name: &str) -> PlayerResult<()> {
        if !self.playlists.contains_key(name) {
            return Err(PlayerError::UnknownPlaylist(name.to_string()));
        }
        self.commit(|playlists| {
            playlists.remove(name);
            Ok(())
        })
    }

    /// Working view for a playlist: only entries that still exist on disk.
    /// The stored list keeps every entry.
    pub fn activate(&self, name: &str) -> PlayerResult<Catalog> {
        let entries = self
            .playlists
            .get(name)
            .ok_or_else(|| PlayerError::UnknownPlaylist(name.to_string()))?;

        let existing: Vec<&PathBuf> = entries.iter().filter(|path| path.exists()).collect();
        if existing.len() < entries.len() {
            info!(
                "Playlist \"{}\": skipping {} missing files",
                name,
                entries.len() - existing.len()
            );
        }

        Ok(Catalog::from_ordered_paths(existing.into_iter().cloned()))
    }
}

fn write_document(path: &Path, playlists: &BTreeMap<String, Vec<PathBuf>>) -> PlayerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PlayerError::io(parent, e))?;
    }
    let text = serde_json::to_string_pretty(playlists)?;
    fs::write(path, text).map_err(|e| PlayerError::io(path, e))
}

fn validate_name(name: &str) -> PlayerResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        Err(PlayerError::InvalidName)
    } else {
        Ok(name)
    }
}
