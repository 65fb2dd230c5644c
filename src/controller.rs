use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use crate::audio::{BackgroundMusic, BgmCommand};
use crate::catalog::Catalog;
use crate::error::{PlayerError, PlayerResult};
use crate::playlist::PlaylistStore;
use crate::sequencer::{PlayerSnapshot, Sequencer, ViewSource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub interval_seconds: Option<u64>,
    pub shuffle: Option<bool>,
    pub loop_videos: Option<bool>,
    pub image_sfx: Option<bool>,
    pub volume: Option<u8>,
    pub sfx_volume: Option<u8>,
    pub bgm_volume: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Start,
    Stop,
    Pause,
    Resume,
    TogglePause,
    Next,
    Previous,
    Select(usize),
    UpdateConfig(ConfigUpdate),
    Search(String),
    OpenFolder(PathBuf),
    Rescan,
    ReloadAssets,
    Bgm(BgmCommand),
    ListItems,
    ListPlaylists,
    CreatePlaylist(String),
    AddToPlaylist { name: String, paths: Vec<PathBuf> },
    RemoveFromPlaylist { name: String, paths: Vec<PathBuf> },
    RenamePlaylist { from: String, to: String },
    DeletePlaylist(String),
    ActivatePlaylist(String),
    Shutdown,
}

/// Successful outcome of a command: a status message plus optional payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl Reply {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    fn with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

pub type CommandOutcome = Result<Reply, String>;

/// A command together with the channel its outcome is reported on.
pub struct CommandRequest {
    pub command: PlayerCommand,
    pub reply: Option<oneshot::Sender<CommandOutcome>>,
}

impl CommandRequest {
    pub fn new(command: PlayerCommand) -> (Self, oneshot::Receiver<CommandOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command,
                reply: Some(tx),
            },
            rx,
        )
    }
}

/// Everything the event loop owns: the sequencer, the playlist store and
/// the background music handle.
pub struct PlayerController {
    sequencer: Sequencer,
    playlists: PlaylistStore,
    bgm: BackgroundMusic,
    shutdown_requested: bool,
}

impl PlayerController {
    pub fn new(sequencer: Sequencer, playlists: PlaylistStore, bgm: BackgroundMusic) -> Self {
        Self {
            sequencer,
            playlists,
            bgm,
            shutdown_requested: false,
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    pub fn playlists(&self) -> &PlaylistStore {
        &self.playlists
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            player: self.sequencer.snapshot(),
            bgm: self.bgm.status(),
            playlists: self.playlists.names(),
        }
    }

    /// Runs one command. Failures become the status line and an `Err`
    /// message; they never escape as panics or abort the loop.
    pub fn handle(&mut self, command: PlayerCommand) -> CommandOutcome {
        debug!("Handling command: {:?}", command);
        match self.dispatch(command) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.sequencer.report(&e);
                Err(e.to_string())
            }
        }
    }

    /// Runs a queued command and publishes the resulting snapshot before
    /// answering, so a caller never reads a status older than its reply.
    pub fn handle_request(
        &mut self,
        request: CommandRequest,
        status: &watch::Sender<StatusSnapshot>,
    ) {
        let outcome = self.handle(request.command);
        status.send_replace(self.snapshot());
        if let Some(reply) = request.reply {
            // the HTTP caller may have gone away
            let _ = reply.send(outcome);
        }
    }

    fn dispatch(&mut self, command: PlayerCommand) -> PlayerResult<Reply> {
        let reply = match command {
            PlayerCommand::Start => {
                self.sequencer.start()?;
                Reply::message(self.sequencer.status())
            }
            PlayerCommand::Stop => {
                self.sequencer.stop();
                Reply::message("Stopped")
            }
            PlayerCommand::Pause => {
                self.sequencer.pause();
                Reply::message(self.sequencer.status())
            }
            PlayerCommand::Resume => {
                self.sequencer.resume();
                Reply::message(self.sequencer.status())
            }
            PlayerCommand::TogglePause => {
                self.sequencer.toggle_pause();
                Reply::message(self.sequencer.status())
            }
            PlayerCommand::Next => {
                self.sequencer.next()?;
                Reply::message(self.sequencer.status())
            }
            PlayerCommand::Previous => {
                self.sequencer.prev()?;
                Reply::message(self.sequencer.status())
            }
            PlayerCommand::Select(index) => {
                self.sequencer.select(index)?;
                Reply::message(self.sequencer.status())
            }
            PlayerCommand::UpdateConfig(update) => self.update_config(update),
            PlayerCommand::Search(query) => {
                self.sequencer.set_search(&query);
                Reply::message(format!("{} matching files", self.sequencer.view().len()))
            }
            PlayerCommand::OpenFolder(folder) => self.open_folder(folder),
            PlayerCommand::Rescan => self.rescan(),
            PlayerCommand::ReloadAssets => {
                let sfx = self.sequencer.reload_sfx();
                let bgm = self.bgm.reload();
                Reply::message(format!("Loaded {} SFX files and {} BGM tracks", sfx, bgm))
            }
            PlayerCommand::Bgm(command) => {
                if !self.bgm.is_available() {
                    return Err(PlayerError::BackendUnavailable);
                }
                self.bgm.send(command);
                Reply::message(format!("BGM {:?}", command).to_lowercase())
            }
            PlayerCommand::ListItems => Reply::with_data(
                format!("{} items", self.sequencer.view().len()),
                json!(self.sequencer.items()),
            ),
            PlayerCommand::ListPlaylists => {
                let playlists: serde_json::Map<String, serde_json::Value> = self
                    .playlists
                    .names()
                    .into_iter()
                    .map(|name| {
                        let paths = self.playlists.get(&name).unwrap_or_default();
                        (name, json!(paths))
                    })
                    .collect();
                Reply::with_data(format!("{} playlists", playlists.len()), json!(playlists))
            }
            PlayerCommand::CreatePlaylist(name) => {
                self.playlists.create(&name)?;
                Reply::message(format!("Playlist \"{}\" created", name.trim()))
            }
            PlayerCommand::AddToPlaylist { name, paths } => {
                let requested = paths.len();
                let added = self.playlists.add_paths(&name, paths)?;
                Reply::message(format!(
                    "Added {} files to playlist \"{}\" ({} already present)",
                    added,
                    name,
                    requested - added
                ))
            }
            PlayerCommand::RemoveFromPlaylist { name, paths } => {
                let removed = self.playlists.remove_paths(&name, paths)?;
                Reply::message(format!("Removed {} files from playlist \"{}\"", removed, name))
            }
            PlayerCommand::RenamePlaylist { from, to } => {
                self.playlists.rename(&from, &to)?;
                if self.sequencer.source() == &ViewSource::Playlist(from.clone()) {
                    self.sequencer
                        .relabel_source(ViewSource::Playlist(to.trim().to_string()));
                }
                Reply::message(format!("Playlist \"{}\" renamed to \"{}\"", from, to.trim()))
            }
            PlayerCommand::DeletePlaylist(name) => {
                self.playlists.remove(&name)?;
                Reply::message(format!("Playlist \"{}\" removed", name))
            }
            PlayerCommand::ActivatePlaylist(name) => self.activate_playlist(&name)?,
            PlayerCommand::Shutdown => {
                self.shutdown();
                Reply::message("Shutting down")
            }
        };
        Ok(reply)
    }

    fn update_config(&mut self, update: ConfigUpdate) -> Reply {
        let mut changes = Vec::new();

        if let Some(seconds) = update.interval_seconds {
            let applied = self.sequencer.set_interval(seconds);
            changes.push(format!("interval={}s", applied));
        }
        if let Some(shuffle) = update.shuffle {
            self.sequencer.set_shuffle(shuffle);
            changes.push(format!("shuffle={}", shuffle));
        }
        if let Some(loop_videos) = update.loop_videos {
            self.sequencer.set_loop_videos(loop_videos);
            changes.push(format!("loop_videos={}", loop_videos));
        }
        if let Some(image_sfx) = update.image_sfx {
            self.sequencer.set_image_sfx(image_sfx);
            changes.push(format!("image_sfx={}", image_sfx));
        }
        if let Some(volume) = update.volume {
            self.sequencer.set_volume(volume);
            changes.push(format!("volume={}", volume.min(100)));
        }
        if let Some(volume) = update.sfx_volume {
            self.sequencer.set_sfx_volume(volume);
            changes.push(format!("sfx_volume={}", volume.min(100)));
        }
        if let Some(volume) = update.bgm_volume {
            self.bgm.send(BgmCommand::SetVolume(volume));
            changes.push(format!("bgm_volume={}", volume.min(100)));
        }

        if changes.is_empty() {
            Reply::message("Nothing to update")
        } else {
            info!("Updated configuration: {}", changes.join(", "));
            Reply::message(format!("Updated {}", changes.join(", ")))
        }
    }

    fn open_folder(&mut self, folder: PathBuf) -> Reply {
        let catalog = Catalog::scan(&folder);
        let count = catalog.len();
        self.sequencer
            .load_catalog(catalog, ViewSource::Folder(folder.clone()));
        let message = format!("Selected {} - {} playable files", folder.display(), count);
        info!("{}", message);
        Reply::message(message)
    }

    /// Rebuilds the working view from the folder it was scanned from.
    /// Playlists are left alone.
    pub fn rescan(&mut self) -> Reply {
        match self.sequencer.source().clone() {
            ViewSource::Folder(folder) => self.open_folder(folder),
            _ => Reply::message("Working view is not a folder; nothing to rescan"),
        }
    }

    fn activate_playlist(&mut self, name: &str) -> PlayerResult<Reply> {
        let catalog = self.playlists.activate(name)?;
        let count = catalog.len();
        self.sequencer
            .load_catalog(catalog, ViewSource::Playlist(name.to_string()));
        Ok(Reply::message(format!("Loaded playlist \"{}\" ({} files)", name, count)))
    }

    /// Cancels the countdown, halts every player and releases the handles.
    pub fn shutdown(&mut self) {
        if self.shutdown_requested {
            return;
        }
        self.shutdown_requested = true;
        self.sequencer.shutdown();
        self.bgm.shutdown();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub player: PlayerSnapshot,
    pub bgm: crate::audio::BgmStatus,
    pub playlists: Vec<String>,
}
