use clap::Parser;
use notify::event::ModifyKind;
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod audio;
mod backend;
mod catalog;
mod config;
mod controller;
mod countdown;
mod display;
mod error;
mod http_server;
mod media;
mod playlist;
mod selection;
mod sequencer;

use audio::{BackgroundMusic, BgmCommand, ReactionSounds};
use backend::{CommandBackend, SharedBackend};
use config::{Args, PlayerConfig};
use controller::{CommandRequest, PlayerCommand, PlayerController};
use display::HeadlessDisplay;
use http_server::CommandSender;
use media::MediaKind;
use playlist::PlaylistStore;
use selection::SelectionPolicy;
use sequencer::Sequencer;

type BoxError = Box<dyn Error + Send + Sync>;

fn setup_filesystem_watcher(
    tx: mpsc::UnboundedSender<()>,
    watch_dir: &Path,
) -> NotifyResult<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: NotifyResult<Event>| match res {
        Ok(event) => {
            let changes_listing = matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
            );
            if changes_listing
                && event
                    .paths
                    .iter()
                    .any(|path| MediaKind::from_path(path).is_some())
            {
                let _ = tx.send(());
            }
        }
        Err(e) => warn!("Filesystem watch error: {:?}", e),
    })?;

    watcher.watch(watch_dir, RecursiveMode::Recursive)?;
    Ok(watcher)
}

fn setup_signal_handler(commands: CommandSender) -> std::io::Result<thread::JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    Ok(thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, shutting down...", signal);
            let _ = commands.blocking_send(CommandRequest {
                command: PlayerCommand::Shutdown,
                reply: None,
            });
        }
    }))
}

fn build_controller(config: &PlayerConfig) -> PlayerController {
    let backend: Option<SharedBackend> = config
        .backend
        .clone()
        .and_then(CommandBackend::detect)
        .map(|backend| Arc::new(backend) as SharedBackend);
    match backend.as_ref() {
        Some(backend) => info!("Media backend: {}", backend.name()),
        None => warn!("No media backend available; videos will show a placeholder"),
    }

    let display = HeadlessDisplay::new(config.viewport, config.frame_output.clone());
    let reactions = ReactionSounds::new(
        &config.sfx_dir,
        backend.clone(),
        config.sfx_volume,
        config.image_sfx,
    );
    let sequencer = Sequencer::new(
        config.sequencer.clone(),
        backend.clone(),
        Box::new(display),
        reactions,
        SelectionPolicy::new(),
    );
    let playlists = PlaylistStore::open(&config.playlists_path);
    let bgm = BackgroundMusic::spawn(&config.bgm_dir, backend, config.bgm_volume);

    PlayerController::new(sequencer, playlists, bgm)
}

fn load_initial_view(controller: &mut PlayerController, config: &PlayerConfig) {
    let opened = match &config.playlist {
        Some(name) => controller
            .handle(PlayerCommand::ActivatePlaylist(name.clone()))
            .map_err(|e| warn!("Cannot activate playlist \"{}\": {}", name, e))
            .is_ok(),
        None => false,
    };
    if !opened {
        let _ = controller.handle(PlayerCommand::OpenFolder(config.image_dir.clone()));
    }

    let mut startup = Vec::new();
    if let Some(query) = &config.search {
        startup.push(PlayerCommand::Search(query.clone()));
    }
    if config.bgm_autostart {
        startup.push(PlayerCommand::Bgm(BgmCommand::Play));
    }
    if config.autostart {
        startup.push(PlayerCommand::Start);
    }
    for command in startup {
        if let Err(e) = controller.handle(command) {
            warn!("Startup command failed: {}", e);
        }
    }
}

/// One-second scheduler ticks, the first one second from now so a countdown
/// armed at start-up gets its full first second.
fn countdown_ticker() -> Interval {
    let period = Duration::from_secs(1);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PlayerConfig::from(Args::parse());

    info!(
        "Meme slideshow player {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_SHORT")
    );
    info!("Image directory: {}", config.image_dir.display());
    info!(
        "Display interval: {} seconds, shuffle {}, loop videos {}",
        config.sequencer.interval_seconds, config.sequencer.shuffle, config.sequencer.loop_videos
    );
    info!("Playlists: {}", config.playlists_path.display());

    let mut controller = build_controller(&config);
    load_initial_view(&mut controller, &config);

    let (command_tx, mut command_rx) = mpsc::channel::<CommandRequest>(64);
    let (status_tx, status_rx) = watch::channel(controller.snapshot());
    let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();

    let _watcher = match setup_filesystem_watcher(fs_tx, &config.image_dir) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(
                "Not watching {} for changes: {}",
                config.image_dir.display(),
                e
            );
            None
        }
    };
    let _signal_handle = setup_signal_handler(command_tx.clone())?;

    let server = http_server::bind_http_server(config.http_addr, command_tx.clone(), status_rx)?;
    tokio::spawn(server);

    let mut ticker = countdown_ticker();
    let mut armed = controller.sequencer().countdown_id();
    let mut rescan_pending = false;

    while !controller.shutdown_requested() {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(id) = armed {
                    controller.sequencer_mut().tick(id);
                }
                // folder events are coalesced into one rescan per tick
                if rescan_pending {
                    rescan_pending = false;
                    controller.rescan();
                }
                status_tx.send_replace(controller.snapshot());
            }
            request = command_rx.recv() => match request {
                Some(request) => controller.handle_request(request, &status_tx),
                None => break,
            },
            Some(()) = fs_rx.recv() => {
                rescan_pending = true;
            }
        }

        // first tick of a fresh countdown lands one second after arming
        let current = controller.sequencer().countdown_id();
        if current != armed {
            armed = current;
            ticker.reset();
        }
    }

    controller.shutdown();
    info!("Slideshow ended");
    Ok(())
}
