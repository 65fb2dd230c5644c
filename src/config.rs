use std::path::PathBuf;

use clap::Parser;

use crate::backend::CommandBackendConfig;
use crate::display::Viewport;
use crate::sequencer::{SequencerConfig, MAX_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS};

#[derive(Parser, Debug)]
#[command(author, version, about = "Folder slideshow with reaction sounds and background music", long_about = None)]
pub struct Args {
    /// Directory containing images and videos to display
    #[arg(short, long, default_value = ".")]
    pub image_dir: PathBuf,

    /// Seconds each item stays on screen
    #[arg(short = 'd', long, default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS))]
    pub interval: u64,

    /// Walk the folder in order instead of picking at random
    #[arg(long)]
    pub no_shuffle: bool,

    /// Loop each video for its own length until skipped
    #[arg(long)]
    pub loop_videos: bool,

    /// Do not play a reaction sound when an image is shown
    #[arg(long)]
    pub no_image_sfx: bool,

    /// Video volume (0-100)
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub volume: u8,

    /// Sound effect volume (0-100)
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub sfx_volume: u8,

    /// Background music volume (0-100)
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub bgm_volume: u8,

    /// Directory holding the sfx/ and bgm/ asset folders
    #[arg(long, default_value = "assets")]
    pub assets_dir: PathBuf,

    /// Playlist document
    #[arg(long, default_value = "playlists.json")]
    pub playlists: PathBuf,

    /// Playlist to activate instead of scanning the image directory
    #[arg(long)]
    pub playlist: Option<String>,

    /// Initial search filter
    #[arg(long)]
    pub search: Option<String>,

    /// Start the slideshow right away
    #[arg(long)]
    pub autostart: bool,

    /// Start background music right away
    #[arg(long)]
    pub bgm: bool,

    /// Media player executable used for video and audio
    #[arg(long, default_value = "mpv")]
    pub player: String,

    /// Probe executable used to read clip durations
    #[arg(long, default_value = "ffprobe")]
    pub probe: String,

    /// Never use an external media player (videos show a placeholder)
    #[arg(long)]
    pub no_backend: bool,

    /// Native window id the video player should render into
    #[arg(long)]
    pub surface: Option<u64>,

    /// Viewport width still frames are fitted to
    #[arg(long, default_value_t = 800)]
    pub viewport_width: u32,

    /// Viewport height still frames are fitted to
    #[arg(long, default_value_t = 450)]
    pub viewport_height: u32,

    /// Write each fitted still frame to this PNG file
    #[arg(long)]
    pub frame_output: Option<PathBuf>,

    /// HTTP port for local control
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,

    /// Address the control server binds to
    #[arg(long, default_value = "127.0.0.1")]
    pub http_bind: std::net::IpAddr,
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub image_dir: PathBuf,
    pub sequencer: SequencerConfig,
    pub image_sfx: bool,
    pub sfx_volume: u8,
    pub bgm_volume: u8,
    pub sfx_dir: PathBuf,
    pub bgm_dir: PathBuf,
    pub playlists_path: PathBuf,
    pub playlist: Option<String>,
    pub search: Option<String>,
    pub autostart: bool,
    pub bgm_autostart: bool,
    pub backend: Option<CommandBackendConfig>,
    pub viewport: Viewport,
    pub frame_output: Option<PathBuf>,
    pub http_addr: std::net::SocketAddr,
}

impl From<Args> for PlayerConfig {
    fn from(args: Args) -> Self {
        let backend = (!args.no_backend).then(|| CommandBackendConfig {
            player: args.player,
            probe: args.probe,
        });

        Self {
            image_dir: args.image_dir,
            sequencer: SequencerConfig {
                interval_seconds: args.interval,
                shuffle: !args.no_shuffle,
                loop_videos: args.loop_videos,
                volume: args.volume,
                surface: args.surface,
            },
            image_sfx: !args.no_image_sfx,
            sfx_volume: args.sfx_volume,
            bgm_volume: args.bgm_volume,
            sfx_dir: args.assets_dir.join("sfx"),
            bgm_dir: args.assets_dir.join("bgm"),
            playlists_path: args.playlists,
            playlist: args.playlist,
            search: args.search,
            autostart: args.autostart,
            bgm_autostart: args.bgm,
            backend,
            viewport: Viewport {
                width: args.viewport_width,
                height: args.viewport_height,
            },
            frame_output: args.frame_output,
            http_addr: std::net::SocketAddr::new(args.http_bind, args.http_port),
        }
    }
}
