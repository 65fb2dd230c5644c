//! Reaction sound effects and background music.
//!
//! Both run beside the sequencer on their own threads and talk to the media
//! backend only. They never see playback state: everything they need (file
//! path, volume) is handed over when the work is started.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{PlayerHandle, SharedBackend};
use crate::catalog::scan_files;
use crate::media::{BGM_EXTENSIONS, SFX_EXTENSIONS};

const SFX_FALLBACK: Duration = Duration::from_secs(2);
const BGM_FALLBACK: Duration = Duration::from_secs(30);
const BGM_POLL: Duration = Duration::from_millis(500);

/// How long a reaction sound is left playing before its player is stopped.
pub fn sfx_hold(duration_seconds: Option<u64>) -> Duration {
    match duration_seconds {
        Some(seconds) if seconds > 0 => Duration::from_secs(seconds).mul_f64(1.1),
        _ => SFX_FALLBACK,
    }
}

/// Random sound effect played whenever an image is shown.
pub struct ReactionSounds {
    dir: PathBuf,
    files: Vec<PathBuf>,
    backend: Option<SharedBackend>,
    volume: u8,
    enabled: bool,
    rng: fastrand::Rng,
}

impl ReactionSounds {
    pub fn new(dir: impl Into<PathBuf>, backend: Option<SharedBackend>, volume: u8, enabled: bool) -> Self {
        let mut sounds = Self {
            dir: dir.into(),
            files: Vec::new(),
            backend,
            volume: volume.min(100),
            enabled,
            rng: fastrand::Rng::new(),
        };
        sounds.reload();
        sounds
    }

    pub fn reload(&mut self) -> usize {
        self.files = scan_files(&self.dir, SFX_EXTENSIONS);
        info!("Loaded {} SFX files from {}", self.files.len(), self.dir.display());
        self.files.len()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Affects effects fired from now on.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn pick(&mut self) -> Option<PathBuf> {
        if self.files.is_empty() {
            return None;
        }
        Some(self.files[self.rng.usize(..self.files.len())].clone())
    }

    /// Starts a random effect on a detached thread. Returns the chosen file,
    /// or `None` when disabled, empty or without a backend.
    pub fn fire(&mut self) -> Option<PathBuf> {
        if !self.enabled || self.is_empty() {
            return None;
        }
        let backend = self.backend.clone()?;
        let path = self.pick().filter(|path| path.exists())?;

        let mut player = match backend.create_player() {
            Ok(player) => player,
            Err(e) => {
                warn!("Could not create SFX player: {}", e);
                return None;
            }
        };
        player.set_volume(self.volume);
        if let Err(e) = player.load(&path).and_then(|_| player.play()) {
            warn!("Could not play SFX {}: {}", path.display(), e);
            return None;
        }

        // an effect still ringing at shutdown is abandoned
        let worker_path = path.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let seconds = player.wait_for_duration(SFX_FALLBACK);
            thread::sleep(sfx_hold(seconds).saturating_sub(started.elapsed()));
            if let Err(e) = player.stop() {
                debug!("Stopping SFX {} failed: {}", worker_path.display(), e);
            }
        });

        Some(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgmCommand {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    SetVolume(u8),
}

enum WorkerMessage {
    Command(BgmCommand),
    Reload(Vec<PathBuf>),
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BgmStatus {
    pub tracks: usize,
    pub index: usize,
    pub playing: bool,
    pub current: Option<String>,
    pub volume: u8,
}

/// Looping background playlist from the `bgm` assets folder, played on its
/// own worker thread with its own player handle.
pub struct BackgroundMusic {
    dir: PathBuf,
    sender: Option<Sender<WorkerMessage>>,
    status: Arc<Mutex<BgmStatus>>,
}

impl BackgroundMusic {
    pub fn spawn(dir: impl Into<PathBuf>, backend: Option<SharedBackend>, volume: u8) -> Self {
        Self::spawn_with_poll(dir, backend, volume, BGM_POLL)
    }

    pub fn spawn_with_poll(
        dir: impl Into<PathBuf>,
        backend: Option<SharedBackend>,
        volume: u8,
        poll: Duration,
    ) -> Self {
        let dir = dir.into();
        let tracks = scan_files(&dir, BGM_EXTENSIONS);
        info!("Loaded {} BGM tracks from {}", tracks.len(), dir.display());

        let status = Arc::new(Mutex::new(BgmStatus {
            tracks: tracks.len(),
            volume: volume.min(100),
            ..BgmStatus::default()
        }));

        let player = backend.and_then(|backend| match backend.create_player() {
            Ok(player) => Some(player),
            Err(e) => {
                warn!("Background music disabled: {}", e);
                None
            }
        });

        let sender = player.map(|player| {
            let (tx, rx) = mpsc::channel();
            let worker = BgmWorker {
                tracks,
                index: 0,
                player,
                volume: volume.min(100),
                playing: false,
                paused: false,
                started: None,
                length: None,
                status: status.clone(),
            };
            // not joined on shutdown; the worker exits once the channel closes
            thread::spawn(move || worker.run(rx, poll));
            tx
        });

        Self { dir, sender, status }
    }

    pub fn is_available(&self) -> bool {
        self.sender.is_some()
    }

    pub fn send(&self, command: BgmCommand) {
        if let Some(sender) = self.sender.as_ref() {
            if sender.send(WorkerMessage::Command(command)).is_err() {
                warn!("Background music worker is gone; dropping {:?}", command);
            }
        }
    }

    pub fn reload(&self) -> usize {
        let tracks = scan_files(&self.dir, BGM_EXTENSIONS);
        let count = tracks.len();
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(WorkerMessage::Reload(tracks));
        } else if let Ok(mut status) = self.status.lock() {
            status.tracks = count;
        }
        count
    }

    pub fn status(&self) -> BgmStatus {
        self.status.lock().map(|status| status.clone()).unwrap_or_default()
    }

    pub fn shutdown(&self) {
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(WorkerMessage::Shutdown);
        }
    }
}

impl Drop for BackgroundMusic {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct BgmWorker {
    tracks: Vec<PathBuf>,
    index: usize,
    player: Box<dyn PlayerHandle>,
    volume: u8,
    playing: bool,
    paused: bool,
    started: Option<Instant>,
    length: Option<Duration>,
    status: Arc<Mutex<BgmStatus>>,
}

impl BgmWorker {
    fn run(mut self, rx: Receiver<WorkerMessage>, poll: Duration) {
        loop {
            match rx.recv_timeout(poll) {
                Ok(WorkerMessage::Command(command)) => self.handle(command),
                Ok(WorkerMessage::Reload(tracks)) => {
                    self.stop();
                    self.tracks = tracks;
                    self.index = 0;
                }
                Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.playing && self.track_done() {
                        self.index = (self.index + 1) % self.tracks.len();
                        self.play_current();
                    }
                }
            }
            self.publish();
        }

        self.stop();
        debug!("Background music worker stopped");
    }

    fn handle(&mut self, command: BgmCommand) {
        match command {
            BgmCommand::Play => {
                if self.tracks.is_empty() || self.playing {
                    return;
                }
                if self.paused {
                    if let Err(e) = self.player.play() {
                        warn!("Resuming background music failed: {}", e);
                    }
                    self.paused = false;
                    self.playing = true;
                } else {
                    self.play_current();
                }
            }
            BgmCommand::Pause => {
                if self.playing {
                    if let Err(e) = self.player.pause() {
                        warn!("Pausing background music failed: {}", e);
                    }
                    self.playing = false;
                    self.paused = true;
                }
            }
            BgmCommand::Stop => self.stop(),
            BgmCommand::Next | BgmCommand::Previous => {
                if self.tracks.is_empty() {
                    return;
                }
                let len = self.tracks.len();
                self.index = if command == BgmCommand::Next {
                    (self.index + 1) % len
                } else {
                    (self.index + len - 1) % len
                };
                self.play_current();
            }
            BgmCommand::SetVolume(volume) => {
                self.volume = volume.min(100);
                self.player.set_volume(self.volume);
            }
        }
    }

    fn play_current(&mut self) {
        let Some(track) = self.tracks.get(self.index).cloned() else {
            return;
        };
        self.player.set_volume(self.volume);
        match self.player.load(&track).and_then(|_| self.player.play()) {
            Ok(()) => {
                info!("BGM playing {}", track.display());
                self.playing = true;
                self.paused = false;
                self.started = Some(Instant::now());
                self.length = self.player.duration_seconds().map(Duration::from_secs);
            }
            Err(e) => {
                warn!("Could not play BGM track {}: {}", track.display(), e);
                self.playing = false;
            }
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.player.stop() {
            debug!("Stopping background music failed: {}", e);
        }
        self.playing = false;
        self.paused = false;
        self.started = None;
    }

    /// The backend's own report decides; a track of unknown length is cut
    /// after a fixed fallback.
    fn track_done(&mut self) -> bool {
        if self.player.is_finished() {
            return true;
        }
        if self.length.is_none() {
            self.length = self.player.duration_seconds().map(Duration::from_secs);
        }
        match (self.started, self.length) {
            (Some(started), None) => started.elapsed() >= BGM_FALLBACK,
            _ => false,
        }
    }

    fn publish(&self) {
        if let Ok(mut status) = self.status.lock() {
            *status = BgmStatus {
                tracks: self.tracks.len(),
                index: self.index,
                playing: self.playing,
                current: self
                    .tracks
                    .get(self.index)
                    .and_then(|track| track.file_name())
                    .map(|name| name.to_string_lossy().to_string()),
                volume: self.volume,
            };
        }
    }
}
