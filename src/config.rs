//! Command line and environment configuration

use std::path::PathBuf;

use clap::Parser;

use crate::model::Format;

#[derive(Parser, Debug, Clone)]
#[clap(name = "youtube_downloader", about = "Download YouTube videos and playlists")]
pub struct Config {
    /// Folder downloads are saved to [default: ~/Downloads/YouTube]
    #[clap(long, env = "YTDL_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// yt-dlp executable to use instead of the bundled one or the one on PATH
    #[clap(long = "yt-dlp", env = "YTDL_BINARY")]
    pub yt_dlp: Option<PathBuf>,

    /// Format selected when the window opens (Video or Audio)
    #[clap(long, env = "YTDL_DEFAULT_FORMAT", default_value = "Video")]
    pub format: String,
}

impl Config {
    pub fn output_root(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_root)
    }

    /// Falls back to `Video` on anything unrecognised
    pub fn initial_format(&self) -> Format {
        self.format.parse().unwrap_or_else(|e| {
            tracing::warn!("ignoring default format: {e}");
            Format::Video
        })
    }
}

/// `<home>/Downloads/YouTube`
pub fn default_output_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Downloads")
        .join("YouTube")
}
