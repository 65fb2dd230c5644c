//! Media backend seam.
//!
//! Video and audio playback is delegated to an external player. The
//! sequencer and the audio workers only see the [`MediaBackend`] and
//! [`PlayerHandle`] traits; when no backend is available they hold `None`
//! and fall back to placeholders or silence.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{PlayerError, PlayerResult};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_POLL: Duration = Duration::from_millis(20);

pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;
    fn create_player(&self) -> PlayerResult<Box<dyn PlayerHandle>>;
}

/// One playback slot. Every call is best effort: a handle that cannot play
/// a file reports an error, it never panics.
pub trait PlayerHandle: Send {
    fn load(&mut self, path: &Path) -> PlayerResult<()>;
    fn play(&mut self) -> PlayerResult<()>;
    fn pause(&mut self) -> PlayerResult<()>;
    fn stop(&mut self) -> PlayerResult<()>;
    /// Volume in percent, clamped to 0..=100.
    fn set_volume(&mut self, volume: u8);
    fn attach_to_surface(&mut self, surface: u64);
    /// Whole seconds of the loaded media, when already known. Never blocks;
    /// a length still being worked out reads as `None`.
    fn duration_seconds(&mut self) -> Option<u64>;

    /// Waits up to `timeout` for the length of the loaded media.
    fn wait_for_duration(&mut self, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(seconds) = self.duration_seconds() {
                return Some(seconds);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(PROBE_POLL);
        }
    }
    /// True once the loaded media played to the end (or nothing is playing).
    fn is_finished(&mut self) -> bool;
}

pub type SharedBackend = Arc<dyn MediaBackend>;

/// Settings for [`CommandBackend`].
#[derive(Debug, Clone)]
pub struct CommandBackendConfig {
    pub player: String,
    pub probe: String,
}

impl Default for CommandBackendConfig {
    fn default() -> Self {
        Self {
            player: "mpv".to_string(),
            probe: "ffprobe".to_string(),
        }
    }
}

/// Drives a command-line media player, one child process per loaded file.
/// Pause and resume are `SIGSTOP`/`SIGCONT` on the child; durations come
/// from the probe tool, run on a helper thread per newly loaded file.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    config: CommandBackendConfig,
}

impl CommandBackend {
    /// Returns `None` when the player binary cannot be found.
    pub fn detect(config: CommandBackendConfig) -> Option<Self> {
        if find_executable(&config.player).is_none() {
            warn!("Media player '{}' not found; videos will show a placeholder", config.player);
            return None;
        }
        if find_executable(&config.probe).is_none() {
            warn!("Probe tool '{}' not found; clip durations will fall back to the interval", config.probe);
        }
        Some(Self { config })
    }
}

impl MediaBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.config.player
    }

    fn create_player(&self) -> PlayerResult<Box<dyn PlayerHandle>> {
        Ok(Box::new(CommandPlayer::new(self.config.clone())))
    }
}

struct CommandPlayer {
    config: CommandBackendConfig,
    media: Option<PathBuf>,
    child: Option<Child>,
    volume: u8,
    surface: Option<u64>,
    suspended: bool,
    probing: Option<(PathBuf, Receiver<Option<u64>>)>,
    durations: HashMap<PathBuf, Option<u64>>,
}

impl CommandPlayer {
    fn new(config: CommandBackendConfig) -> Self {
        Self {
            config,
            media: None,
            child: None,
            volume: 100,
            surface: None,
            suspended: false,
            probing: None,
            durations: HashMap::new(),
        }
    }

    fn start_probe(&mut self, media: &Path) {
        let already_probing = matches!(&self.probing, Some((path, _)) if path == media);
        if self.durations.contains_key(media) || already_probing {
            return;
        }
        let (tx, rx) = mpsc::channel();
        let probe = self.config.probe.clone();
        let target = media.to_path_buf();
        thread::spawn(move || {
            let _ = tx.send(probe_duration(&probe, &target));
        });
        self.probing = Some((media.to_path_buf(), rx));
    }

    fn signal_child(&self, signal: libc::c_int) -> PlayerResult<()> {
        match self.child.as_ref() {
            Some(child) => send_signal(child.id(), signal)
                .map_err(|e| PlayerError::Backend(format!("signal {} to pid {} failed: {}", signal, child.id(), e))),
            None => Ok(()),
        }
    }

    fn spawn(&mut self, media: &Path) -> PlayerResult<()> {
        let mut command = Command::new(&self.config.player);
        command
            .arg("--no-terminal")
            .arg("--really-quiet")
            .arg(format!("--volume={}", self.volume));
        if let Some(surface) = self.surface {
            command.arg(format!("--wid={}", surface));
        }
        command
            .arg(media)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command
            .spawn()
            .map_err(|e| PlayerError::Backend(format!("failed to start {}: {}", self.config.player, e)))?;
        debug!("Started {} (pid {}) for {}", self.config.player, child.id(), media.display());
        self.child = Some(child);
        self.suspended = false;
        Ok(())
    }

    fn child_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | Some(Err(_)) => {
                self.child = None;
                false
            }
            None => false,
        }
    }
}

impl PlayerHandle for CommandPlayer {
    fn load(&mut self, path: &Path) -> PlayerResult<()> {
        self.stop()?;
        self.media = Some(path.to_path_buf());
        self.start_probe(path);
        Ok(())
    }

    fn play(&mut self) -> PlayerResult<()> {
        if self.child_running() {
            if self.suspended {
                self.signal_child(libc::SIGCONT)?;
                self.suspended = false;
            }
            return Ok(());
        }
        match self.media.clone() {
            Some(media) => self.spawn(&media),
            None => Ok(()),
        }
    }

    fn pause(&mut self) -> PlayerResult<()> {
        if self.child_running() && !self.suspended {
            self.signal_child(libc::SIGSTOP)?;
            self.suspended = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> PlayerResult<()> {
        if let Some(mut child) = self.child.take() {
            if self.suspended {
                // a stopped process would not see the kill until continued
                let _ = send_signal(child.id(), libc::SIGCONT);
            }
            if let Err(e) = child.kill() {
                debug!("Player already exited: {}", e);
            }
            let _ = child.wait();
        }
        self.suspended = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) {
        // applies to the next spawned process
        self.volume = volume.min(100);
    }

    fn attach_to_surface(&mut self, surface: u64) {
        self.surface = Some(surface);
    }

    fn duration_seconds(&mut self) -> Option<u64> {
        let media = self.media.clone()?;
        if let Some(known) = self.durations.get(&media) {
            return *known;
        }

        let (path, rx) = self.probing.as_ref()?;
        if *path != media {
            return None;
        }
        let seconds = match rx.try_recv() {
            Ok(seconds) => seconds,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => None,
        };
        self.probing = None;
        self.durations.insert(media, seconds);
        seconds
    }

    fn is_finished(&mut self) -> bool {
        !self.child_running()
    }
}

/// Runs the probe tool on `media`. A probe still running after
/// [`PROBE_TIMEOUT`] is killed and the length counts as unknown.
fn probe_duration(probe: &str, media: &Path) -> Option<u64> {
    let mut child = Command::new(probe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(media)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| debug!("Probe {} failed to start: {}", probe, e))
        .ok()?;

    let deadline = Instant::now() + PROBE_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => thread::sleep(PROBE_POLL),
            Ok(None) | Err(_) => {
                warn!("Probing {} timed out", media.display());
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }

    let output = child.wait_with_output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

fn send_signal(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    // SAFETY: kill(2) on a pid we spawned; a reaped pid only yields ESRCH.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Parses the probe's duration output (fractional seconds) into whole
/// seconds. Zero or unparsable durations count as unknown.
pub fn parse_probe_duration(output: &str) -> Option<u64> {
    let seconds: f64 = output.lines().next()?.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 1.0 {
        Some(seconds.floor() as u64)
    } else {
        None
    }
}

fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths: OsString = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_duration_is_truncated_to_whole_seconds() {
        assert_eq!(parse_probe_duration("12.840000\n"), Some(12));
        assert_eq!(parse_probe_duration("3600\n"), Some(3600));
    }

    #[test]
    fn unusable_probe_output_is_unknown() {
        assert_eq!(parse_probe_duration(""), None);
        assert_eq!(parse_probe_duration("N/A\n"), None);
        assert_eq!(parse_probe_duration("0.4"), None);
    }

    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn player_with_length_tool(tool: String) -> CommandPlayer {
        CommandPlayer::new(CommandBackendConfig {
            player: "/definitely/not/here/mpv".to_string(),
            probe: tool,
        })
    }

    #[test]
    fn load_does_not_wait_for_a_slow_length_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player_with_length_tool(script(dir.path(), "slow", "sleep 5\necho 30"));

        let started = Instant::now();
        player.load(&dir.path().join("clip.mp4")).unwrap();
        assert_eq!(player.duration_seconds(), None);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn length_arrives_in_the_background_and_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player_with_length_tool(script(dir.path(), "quick", "echo 12.5"));
        let clip = dir.path().join("clip.mp4");

        player.load(&clip).unwrap();
        assert_eq!(player.wait_for_duration(Duration::from_secs(5)), Some(12));

        player.load(&clip).unwrap();
        assert!(player.probing.is_none());
        assert_eq!(player.duration_seconds(), Some(12));
    }

    #[test]
    fn failing_length_lookup_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player_with_length_tool(script(dir.path(), "broken", "exit 1"));

        player.load(&dir.path().join("clip.mp4")).unwrap();
        assert_eq!(player.wait_for_duration(Duration::from_secs(2)), None);
        assert!(player.durations.contains_key(&dir.path().join("clip.mp4")));
    }

    #[test]
    fn missing_player_is_not_detected() {
        let config = CommandBackendConfig {
            player: "/definitely/not/here/mpv".to_string(),
            probe: "ffprobe".to_string(),
        };
        assert!(CommandBackend::detect(config).is_none());
    }
}
