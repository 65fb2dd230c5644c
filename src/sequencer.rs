use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::ReactionSounds;
use crate::backend::{PlayerHandle, SharedBackend};
use crate::catalog::Catalog;
use crate::countdown::{Countdown, CountdownId, CountdownProgress, Tick};
use crate::display::{Display, Frame};
use crate::error::{PlayerError, PlayerResult};
use crate::media::{MediaItem, MediaKind};
use crate::selection::{Direction, SelectionPolicy};

pub const MIN_INTERVAL_SECONDS: u64 = 5;
pub const MAX_INTERVAL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideshowState {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub current_index: Option<usize>,
    pub running: bool,
    pub paused: bool,
    pub shuffle: bool,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub interval_seconds: u64,
    pub shuffle: bool,
    pub loop_videos: bool,
    pub volume: u8,
    pub surface: Option<u64>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            shuffle: true,
            loop_videos: false,
            volume: 50,
            surface: None,
        }
    }
}

/// Where the working view came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum ViewSource {
    None,
    Folder(PathBuf),
    Playlist(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub state: SlideshowState,
    pub current_index: Option<usize>,
    pub current_item: Option<String>,
    pub current_kind: Option<MediaKind>,
    pub total_items: usize,
    pub countdown: CountdownProgress,
    pub shuffle: bool,
    pub interval_seconds: u64,
    pub loop_videos: bool,
    pub image_sfx: bool,
    pub volume: u8,
    pub sfx_volume: u8,
    pub query: String,
    pub source: ViewSource,
    pub backend: Option<String>,
    pub frame: Frame,
    pub status: String,
    pub uptime: u64,
    pub timestamp: String,
}

/// The slideshow state machine. It alone owns the playback and countdown
/// state; callers drive it from a single event loop.
pub struct Sequencer {
    state: PlaybackState,
    loop_videos: bool,
    volume: u8,
    surface: Option<u64>,
    countdown: Countdown,
    selection: SelectionPolicy,
    source: Catalog,
    source_label: ViewSource,
    query: String,
    view: Catalog,
    backend: Option<SharedBackend>,
    player: Option<Box<dyn PlayerHandle>>,
    display: Box<dyn Display>,
    reactions: ReactionSounds,
    video_active: bool,
    looping_video: bool,
    clip_length_pending: bool,
    status: String,
    start_time: Instant,
}

impl Sequencer {
    pub fn new(
        config: SequencerConfig,
        backend: Option<SharedBackend>,
        display: Box<dyn Display>,
        reactions: ReactionSounds,
        selection: SelectionPolicy,
    ) -> Self {
        // one video player for the whole session, released in shutdown()
        let player = backend.as_ref().and_then(|backend| match backend.create_player() {
            Ok(player) => Some(player),
            Err(e) => {
                warn!("Media backend {} could not create a player: {}", backend.name(), e);
                None
            }
        });

        Self {
            state: PlaybackState {
                current_index: None,
                running: false,
                paused: false,
                shuffle: config.shuffle,
                interval_seconds: clamp_interval(config.interval_seconds),
            },
            loop_videos: config.loop_videos,
            volume: config.volume.min(100),
            surface: config.surface,
            countdown: Countdown::new(),
            selection,
            source: Catalog::default(),
            source_label: ViewSource::None,
            query: String::new(),
            view: Catalog::default(),
            backend,
            player,
            display,
            reactions,
            video_active: false,
            looping_video: false,
            clip_length_pending: false,
            status: "No folder selected".to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn state(&self) -> SlideshowState {
        match (self.state.running, self.state.paused) {
            (false, _) => SlideshowState::Stopped,
            (true, false) => SlideshowState::Running,
            (true, true) => SlideshowState::Paused,
        }
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.state
    }

    pub fn view(&self) -> &Catalog {
        &self.view
    }

    pub fn source(&self) -> &ViewSource {
        &self.source_label
    }

    pub fn current_item(&self) -> Option<&MediaItem> {
        self.state.current_index.and_then(|index| self.view.get(index))
    }

    pub fn countdown(&self) -> CountdownProgress {
        self.countdown.progress()
    }

    /// Id of the armed countdown, used by the scheduler to tag its ticks.
    pub fn countdown_id(&self) -> Option<CountdownId> {
        self.countdown.current()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn backend_available(&self) -> bool {
        self.player.is_some()
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        info!("{}", self.status);
    }

    /// Records an operation failure as the status line.
    pub fn report(&mut self, error: &PlayerError) {
        warn!("{}", error);
        self.status = error.to_string();
    }

    pub fn start(&mut self) -> PlayerResult<()> {
        if self.view.is_empty() {
            self.set_status("No playable files loaded");
            return Err(PlayerError::EmptyCatalog);
        }
        match self.state() {
            SlideshowState::Running => return Ok(()),
            SlideshowState::Paused => {
                self.resume();
                return Ok(());
            }
            SlideshowState::Stopped => {}
        }

        self.state.running = true;
        self.state.paused = false;
        if self.state.current_index.is_none() {
            self.state.current_index = Some(0);
        }
        self.set_status("Running");
        self.play_current();
        if self.player.is_none() && self.view.has_videos() {
            self.status = "Running (video files found but no media backend is available)".to_string();
            warn!("{}", self.status);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.state.running = false;
        self.state.paused = false;
        self.countdown.cancel();
        self.stop_video();
        self.display.clear();
        self.set_status("Stopped");
    }

    /// Remaining time is dropped; `resume` starts a full countdown again.
    pub fn pause(&mut self) {
        if self.state() != SlideshowState::Running {
            return;
        }
        self.state.paused = true;
        self.countdown.cancel();
        if self.video_active {
            if let Some(player) = self.player.as_mut() {
                if let Err(e) = player.pause() {
                    warn!("Pausing video failed: {}", e);
                }
            }
        }
        self.set_status("Paused");
    }

    pub fn resume(&mut self) {
        if self.state() != SlideshowState::Paused {
            return;
        }
        self.state.paused = false;
        if self.looping_video {
            self.arm_for_clip();
        } else {
            self.countdown.arm(self.state.interval_seconds);
        }
        if self.video_active {
            if let Some(player) = self.player.as_mut() {
                if let Err(e) = player.play() {
                    warn!("Resuming video failed: {}", e);
                }
            }
        }
        self.set_status("Resumed");
    }

    pub fn toggle_pause(&mut self) {
        match self.state() {
            SlideshowState::Running => self.pause(),
            SlideshowState::Paused => self.resume(),
            SlideshowState::Stopped => {}
        }
    }

    pub fn next(&mut self) -> PlayerResult<()> {
        self.advance(Direction::Forward)
    }

    pub fn prev(&mut self) -> PlayerResult<()> {
        self.advance(Direction::Backward)
    }

    fn advance(&mut self, direction: Direction) -> PlayerResult<()> {
        let index = self
            .selection
            .pick(self.view.len(), self.state.current_index, self.state.shuffle, direction)
            .ok_or(PlayerError::EmptyCatalog)?;
        self.state.current_index = Some(index);
        self.play_current();
        Ok(())
    }

    /// Jumps to an explicit position of the working view.
    pub fn select(&mut self, index: usize) -> PlayerResult<()> {
        if index >= self.view.len() {
            return Err(PlayerError::OutOfRange {
                index,
                len: self.view.len(),
            });
        }
        self.state.current_index = Some(index);
        self.play_current();
        Ok(())
    }

    /// Feeds one scheduler step to the countdown and advances on expiry.
    pub fn tick(&mut self, id: CountdownId) -> Tick {
        if self.state() != SlideshowState::Running {
            return Tick::Ignored;
        }
        let tick = self.countdown.tick(id);
        match tick {
            Tick::Expired => self.on_expired(),
            Tick::Running { .. } if self.clip_length_pending => self.refresh_clip_length(),
            _ => {}
        }
        tick
    }

    /// A looping clip armed with the interval switches to its own length
    /// once the backend knows it. Time already shown counts against it.
    fn refresh_clip_length(&mut self) {
        let Some(seconds) = self.known_clip_length() else {
            return;
        };
        self.clip_length_pending = false;
        let elapsed = self.countdown.progress().elapsed;
        debug!("Clip length now known: {}s, {}s already shown", seconds, elapsed);
        self.countdown.arm(seconds.saturating_sub(elapsed).max(1));
    }

    fn on_expired(&mut self) {
        if self.looping_video {
            self.restart_video();
            return;
        }
        if let Err(e) = self.next() {
            self.report(&e);
        }
    }

    pub fn load_catalog(&mut self, catalog: Catalog, source: ViewSource) {
        self.source = catalog;
        self.source_label = source;
        self.rebuild_view();
    }

    /// Renames the source of the working view without rebuilding it.
    pub fn relabel_source(&mut self, source: ViewSource) {
        self.source_label = source;
    }

    pub fn set_search(&mut self, query: &str) {
        self.query = query.trim().to_string();
        self.rebuild_view();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Recomputes the working view. The current index follows its item when
    /// the item survives and is cleared otherwise.
    fn rebuild_view(&mut self) {
        let current_path = self.current_item().map(|item| item.path().to_path_buf());
        self.view = self.source.filter(&self.query);
        self.state.current_index = current_path.and_then(|path| self.view.position(&path));

        debug!(
            "Working view rebuilt: {} of {} items, query {:?}",
            self.view.len(),
            self.source.len(),
            self.query
        );

        if self.view.is_empty() && self.state.running {
            self.stop();
            self.report(&PlayerError::EmptyCatalog);
        }
    }

    pub fn set_interval(&mut self, seconds: u64) -> u64 {
        self.state.interval_seconds = clamp_interval(seconds);
        self.state.interval_seconds
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.state.shuffle = shuffle;
    }

    pub fn set_loop_videos(&mut self, loop_videos: bool) {
        self.loop_videos = loop_videos;
    }

    pub fn set_image_sfx(&mut self, enabled: bool) {
        self.reactions.set_enabled(enabled);
    }

    pub fn set_sfx_volume(&mut self, volume: u8) {
        self.reactions.set_volume(volume);
    }

    pub fn reload_sfx(&mut self) -> usize {
        self.reactions.reload()
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        if let Some(player) = self.player.as_mut() {
            player.set_volume(self.volume);
        }
    }

    fn arm_if_running(&mut self, seconds: u64) {
        if self.state() == SlideshowState::Running {
            self.countdown.arm(seconds);
        }
    }

    fn play_current(&mut self) {
        self.countdown.cancel();
        self.looping_video = false;
        self.clip_length_pending = false;

        let Some(item) = self.current_item().cloned() else {
            return;
        };
        let name = item.file_name();

        match item.kind() {
            MediaKind::Image => {
                self.stop_video();
                match self.display.show_image(item.path()) {
                    Ok(()) => self.set_status(format!("Displaying image: {}", name)),
                    Err(e) => self.set_status(format!("Error showing image: {}", e)),
                }
                if let Some(sfx) = self.reactions.fire() {
                    debug!("Reaction sound {}", sfx.display());
                }
                self.arm_if_running(self.state.interval_seconds);
            }
            MediaKind::Video if self.player.is_none() => {
                self.stop_video();
                self.display
                    .show_placeholder(&format!("Video file\n{}\n(no video backend)", name));
                self.set_status(format!("Video file (no video backend): {}", name));
                self.arm_if_running(self.state.interval_seconds);
            }
            MediaKind::Video => {
                if let Err(e) = self.start_video(&item) {
                    self.stop_video();
                    self.display
                        .show_placeholder(&format!("Video file\n{}\n({})", name, e));
                    self.set_status(format!("Error playing video: {}", e));
                    self.arm_if_running(self.state.interval_seconds);
                    return;
                }
                self.set_status(format!("Playing video: {}", name));
                if self.loop_videos {
                    self.looping_video = true;
                    self.arm_for_clip();
                } else {
                    self.arm_if_running(self.state.interval_seconds);
                }
            }
        }
    }

    fn start_video(&mut self, item: &MediaItem) -> PlayerResult<()> {
        let player = self.player.as_mut().ok_or(PlayerError::BackendUnavailable)?;
        player.load(item.path())?;
        if let Some(surface) = self.surface {
            player.attach_to_surface(surface);
        }
        player.set_volume(self.volume);
        player.play()?;
        // a paused slideshow shows the new clip without running it
        if self.state.paused {
            player.pause()?;
        }
        self.video_active = true;
        self.display.show_video(item.path());
        Ok(())
    }

    fn restart_video(&mut self) {
        let Some(item) = self.current_item().cloned() else {
            return;
        };
        debug!("Looping video {}", item.path().display());
        if let Err(e) = self.start_video(&item) {
            self.report(&e);
            if let Err(e) = self.next() {
                self.report(&e);
            }
            return;
        }
        self.arm_for_clip();
    }

    fn known_clip_length(&mut self) -> Option<u64> {
        self.player
            .as_mut()
            .and_then(|player| player.duration_seconds())
            .filter(|seconds| *seconds > 0)
    }

    /// Arms for the loaded clip's length. Until the length is known the
    /// interval stands in and later ticks keep asking for it.
    fn arm_for_clip(&mut self) {
        match self.known_clip_length() {
            Some(seconds) => {
                self.clip_length_pending = false;
                self.arm_if_running(seconds);
            }
            None => {
                self.clip_length_pending = true;
                self.arm_if_running(self.state.interval_seconds);
            }
        }
    }

    fn stop_video(&mut self) {
        if !self.video_active {
            return;
        }
        if let Some(player) = self.player.as_mut() {
            if let Err(e) = player.stop() {
                warn!("Stopping video failed: {}", e);
            }
        }
        self.video_active = false;
        self.looping_video = false;
        self.clip_length_pending = false;
    }

    /// Stops playback and releases the player handle.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(mut player) = self.player.take() {
            if let Err(e) = player.stop() {
                warn!("Stopping player on shutdown failed: {}", e);
            }
        }
        info!("Sequencer shut down");
    }

    pub fn items(&self) -> Vec<ItemSummary> {
        self.view
            .items()
            .iter()
            .enumerate()
            .map(|(index, item)| ItemSummary {
                index,
                name: self.view.display_name(item),
                path: item.path().to_path_buf(),
                kind: item.kind(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let current = self.current_item();
        PlayerSnapshot {
            state: self.state(),
            current_index: self.state.current_index,
            current_item: current.map(|item| self.view.display_name(item)),
            current_kind: current.map(MediaItem::kind),
            total_items: self.view.len(),
            countdown: self.countdown.progress(),
            shuffle: self.state.shuffle,
            interval_seconds: self.state.interval_seconds,
            loop_videos: self.loop_videos,
            image_sfx: self.reactions.enabled(),
            volume: self.volume,
            sfx_volume: self.reactions.volume(),
            query: self.query.clone(),
            source: self.source_label.clone(),
            backend: self
                .player
                .as_ref()
                .and(self.backend.as_ref())
                .map(|backend| backend.name().to_string()),
            frame: self.display.current().clone(),
            status: self.status.clone(),
            uptime: self.start_time.elapsed().as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub fn clamp_interval(seconds: u64) -> u64 {
    seconds.clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::display::testing::RecordingDisplay;
    use std::path::Path;
    use std::sync::Arc;

    struct Harness {
        sequencer: Sequencer,
        display: RecordingDisplay,
        backend: Option<FakeBackend>,
    }

    fn harness(config: SequencerConfig, backend: Option<FakeBackend>) -> Harness {
        let display = RecordingDisplay::new();
        let shared = backend
            .clone()
            .map(|backend| Arc::new(backend) as SharedBackend);
        let reactions = ReactionSounds::new("/nonexistent/sfx", None, 80, false);
        let sequencer = Sequencer::new(
            config,
            shared,
            Box::new(display.clone()),
            reactions,
            SelectionPolicy::with_seed(3),
        );
        Harness {
            sequencer,
            display,
            backend,
        }
    }

    fn sequential(interval_seconds: u64) -> SequencerConfig {
        SequencerConfig {
            interval_seconds,
            shuffle: false,
            ..SequencerConfig::default()
        }
    }

    fn abc() -> Catalog {
        Catalog::from_paths(["/m/a.png", "/m/b.mp4", "/m/c.jpg"])
    }

    fn frame(h: &Harness) -> Frame {
        h.display.frame.lock().unwrap().clone()
    }

    fn still(path: &str) -> Frame {
        Frame::Still {
            path: PathBuf::from(path),
            width: 0,
            height: 0,
        }
    }

    fn run_ticks(sequencer: &mut Sequencer, ticks: usize) {
        for _ in 0..ticks {
            let id = sequencer.countdown_id().expect("countdown armed");
            sequencer.tick(id);
        }
    }

    #[test]
    fn start_shows_first_item_and_advances_after_interval() {
        let mut h = harness(sequential(5), Some(FakeBackend::default()));
        h.sequencer.load_catalog(abc(), ViewSource::Folder(PathBuf::from("/m")));

        h.sequencer.start().unwrap();
        assert_eq!(h.sequencer.state(), SlideshowState::Running);
        assert_eq!(frame(&h), still("/m/a.png"));
        let progress = h.sequencer.countdown();
        assert_eq!((progress.total, progress.remaining, progress.active), (5, 5, true));

        run_ticks(&mut h.sequencer, 4);
        assert_eq!(h.sequencer.playback().current_index, Some(0));
        run_ticks(&mut h.sequencer, 1);

        assert_eq!(h.sequencer.playback().current_index, Some(1));
        assert_eq!(
            frame(&h),
            Frame::Video {
                path: PathBuf::from("/m/b.mp4")
            }
        );
        let calls = h.backend.as_ref().unwrap().calls();
        assert!(calls.contains(&"load /m/b.mp4".to_string()));
        assert!(calls.contains(&"play".to_string()));
        assert_eq!(h.sequencer.countdown().remaining, 5);
    }

    #[test]
    fn start_on_empty_catalog_reports_and_stays_stopped() {
        let mut h = harness(sequential(5), None);
        let err = h.sequencer.start().unwrap_err();

        assert!(matches!(err, PlayerError::EmptyCatalog));
        assert_eq!(h.sequencer.state(), SlideshowState::Stopped);
        assert_eq!(h.sequencer.playback().current_index, None);
        assert!(!h.sequencer.countdown().active);
        assert_eq!(frame(&h), Frame::Blank);
    }

    #[test]
    fn resume_restarts_a_full_countdown() {
        let mut h = harness(sequential(8), None);
        h.sequencer.load_catalog(abc(), ViewSource::None);
        h.sequencer.start().unwrap();
        run_ticks(&mut h.sequencer, 3);
        assert_eq!(h.sequencer.countdown().remaining, 5);

        h.sequencer.pause();
        assert_eq!(h.sequencer.state(), SlideshowState::Paused);
        assert!(!h.sequencer.countdown().active);

        h.sequencer.resume();
        let progress = h.sequencer.countdown();
        assert_eq!(h.sequencer.state(), SlideshowState::Running);
        assert_eq!((progress.total, progress.remaining), (8, 8));
    }

    #[test]
    fn tick_armed_before_pause_does_not_advance() {
        let mut h = harness(sequential(5), None);
        h.sequencer.load_catalog(abc(), ViewSource::None);
        h.sequencer.start().unwrap();
        let stale = h.sequencer.countdown_id().unwrap();
        run_ticks(&mut h.sequencer, 4);

        h.sequencer.pause();
        h.sequencer.resume();
        assert_eq!(h.sequencer.tick(stale), Tick::Ignored);
        assert_eq!(h.sequencer.playback().current_index, Some(0));
    }

    #[test]
    fn navigation_while_paused_does_not_arm() {
        let mut h = harness(sequential(5), None);
        h.sequencer.load_catalog(abc(), ViewSource::None);
        h.sequencer.start().unwrap();
        h.sequencer.pause();

        h.sequencer.next().unwrap();
        assert_eq!(h.sequencer.playback().current_index, Some(1));
        assert_eq!(h.sequencer.state(), SlideshowState::Paused);
        assert!(!h.sequencer.countdown().active);

        h.sequencer.prev().unwrap();
        h.sequencer.prev().unwrap();
        assert_eq!(h.sequencer.playback().current_index, Some(2));
        assert_eq!(frame(&h), still("/m/c.jpg"));
    }

    #[test]
    fn stop_cancels_countdown_halts_video_and_clears_display() {
        let mut h = harness(sequential(5), Some(FakeBackend::default()));
        h.sequencer.load_catalog(abc(), ViewSource::None);
        h.sequencer.start().unwrap();
        h.sequencer.select(1).unwrap();
        h.backend.as_ref().unwrap().clear();

        h.sequencer.stop();

        assert_eq!(h.sequencer.state(), SlideshowState::Stopped);
        assert!(!h.sequencer.countdown().active);
        assert_eq!(frame(&h), Frame::Blank);
        assert_eq!(h.backend.as_ref().unwrap().calls(), vec!["stop".to_string()]);
    }

    #[test]
    fn pause_and_resume_drive_the_video_player() {
        let backend = FakeBackend::default();
        let mut h = harness(sequential(5), Some(backend.clone()));
        h.sequencer
            .load_catalog(Catalog::from_paths(["/m/clip.mp4"]), ViewSource::None);
        h.sequencer.start().unwrap();
        backend.clear();

        h.sequencer.toggle_pause();
        h.sequencer.toggle_pause();
        assert_eq!(backend.calls(), vec!["pause".to_string(), "play".to_string()]);
    }

    #[test]
    fn video_without_backend_shows_placeholder() {
        let mut h = harness(sequential(5), None);
        h.sequencer
            .load_catalog(Catalog::from_paths(["/m/clip.mp4"]), ViewSource::None);
        h.sequencer.start().unwrap();

        assert!(matches!(frame(&h), Frame::Placeholder { text } if text.contains("clip.mp4")));
        assert_eq!(h.sequencer.countdown().total, 5);
        assert!(!h.sequencer.backend_available());
        assert!(h.sequencer.status().contains("no media backend"));
    }

    #[test]
    fn looping_video_arms_for_clip_duration_and_replays() {
        let backend = FakeBackend::with_duration(Some(12));
        let config = SequencerConfig {
            loop_videos: true,
            ..sequential(5)
        };
        let mut h = harness(config, Some(backend.clone()));
        h.sequencer.load_catalog(abc(), ViewSource::None);
        h.sequencer.start().unwrap();
        h.sequencer.next().unwrap();
        assert_eq!(h.sequencer.countdown().total, 12);

        backend.clear();
        run_ticks(&mut h.sequencer, 12);

        // still on the clip, which was started again
        assert_eq!(h.sequencer.playback().current_index, Some(1));
        assert!(backend.calls().contains(&"load /m/b.mp4".to_string()));
        assert_eq!(h.sequencer.countdown().remaining, 12);

        h.sequencer.next().unwrap();
        assert_eq!(frame(&h), still("/m/c.jpg"));
        assert_eq!(h.sequencer.countdown().total, 5);
    }

    #[test]
    fn looping_video_of_unknown_length_uses_interval() {
        let config = SequencerConfig {
            loop_videos: true,
            ..sequential(7)
        };
        let mut h = harness(config, Some(FakeBackend::with_duration(None)));
        h.sequencer
            .load_catalog(Catalog::from_paths(["/m/clip.webm"]), ViewSource::None);
        h.sequencer.start().unwrap();
        assert_eq!(h.sequencer.countdown().total, 7);
    }

    #[test]
    fn looping_video_switches_to_clip_length_once_known() {
        let backend = FakeBackend::with_duration(None);
        let config = SequencerConfig {
            loop_videos: true,
            ..sequential(7)
        };
        let mut h = harness(config, Some(backend.clone()));
        h.sequencer
            .load_catalog(Catalog::from_paths(["/m/clip.webm"]), ViewSource::None);
        h.sequencer.start().unwrap();
        run_ticks(&mut h.sequencer, 2);
        assert_eq!(h.sequencer.countdown().remaining, 5);

        backend.set_duration(Some(12));
        run_ticks(&mut h.sequencer, 1);

        let progress = h.sequencer.countdown();
        assert_eq!((progress.total, progress.remaining), (9, 9));
        run_ticks(&mut h.sequencer, 9);
        assert_eq!(h.sequencer.playback().current_index, Some(0));
        assert_eq!(h.sequencer.countdown().total, 12);
    }

    #[test]
    fn search_keeps_current_item_or_clears_index() {
        let mut h = harness(sequential(5), None);
        h.sequencer.load_catalog(
            Catalog::from_paths(["/m/cat1.png", "/m/dog.png", "/m/cat2.png"]),
            ViewSource::None,
        );
        h.sequencer.select(2).unwrap();
        assert_eq!(h.sequencer.current_item().unwrap().path(), Path::new("/m/dog.png"));

        h.sequencer.set_search("dog");
        assert_eq!(h.sequencer.playback().current_index, Some(0));

        h.sequencer.set_search("cat");
        assert_eq!(h.sequencer.playback().current_index, None);
        assert_eq!(h.sequencer.view().len(), 2);

        h.sequencer.set_search("");
        assert_eq!(h.sequencer.view().len(), 3);
    }

    #[test]
    fn view_emptied_while_running_stops_playback() {
        let mut h = harness(sequential(5), None);
        h.sequencer.load_catalog(abc(), ViewSource::None);
        h.sequencer.start().unwrap();

        h.sequencer.set_search("no match");

        assert_eq!(h.sequencer.state(), SlideshowState::Stopped);
        assert_eq!(h.sequencer.playback().current_index, None);
        assert_eq!(h.sequencer.status(), PlayerError::EmptyCatalog.to_string());
    }

    #[test]
    fn navigation_on_empty_view_is_rejected() {
        let mut h = harness(sequential(5), None);
        assert!(matches!(h.sequencer.next(), Err(PlayerError::EmptyCatalog)));
        assert!(matches!(h.sequencer.select(0), Err(PlayerError::OutOfRange { index: 0, len: 0 })));
    }

    #[test]
    fn interval_is_clamped() {
        let mut h = harness(sequential(1), None);
        assert_eq!(h.sequencer.playback().interval_seconds, 5);
        assert_eq!(h.sequencer.set_interval(10_000), 3600);
        assert_eq!(h.sequencer.set_interval(42), 42);
    }

    #[test]
    fn shutdown_releases_the_player() {
        let backend = FakeBackend::default();
        let mut h = harness(sequential(5), Some(backend.clone()));
        h.sequencer.load_catalog(abc(), ViewSource::None);
        h.sequencer.start().unwrap();

        h.sequencer.shutdown();
        assert!(!h.sequencer.backend_available());
        assert_eq!(h.sequencer.state(), SlideshowState::Stopped);
        assert_eq!(backend.calls().last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn snapshot_reports_progress_and_current_item() {
        let mut h = harness(sequential(6), None);
        h.sequencer.load_catalog(abc(), ViewSource::Playlist("faves".into()));
        h.sequencer.start().unwrap();
        run_ticks(&mut h.sequencer, 2);

        let snapshot = h.sequencer.snapshot();
        assert_eq!(snapshot.state, SlideshowState::Running);
        assert_eq!(snapshot.current_item.as_deref(), Some("/m/a.png"));
        assert_eq!(snapshot.countdown.elapsed, 2);
        assert_eq!(snapshot.total_items, 3);
        assert_eq!(snapshot.source, ViewSource::Playlist("faves".into()));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["current_kind"], "image");
    }
}
