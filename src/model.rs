use std::{fmt, path::PathBuf, str::FromStr};

use crate::error::DownloadError;

/// Text shown in the link field while it is empty and unfocused
pub const LINK_PLACEHOLDER: &str = "Enter YouTube Link";

/// What the user wants out of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Highest resolution stream carrying both video and audio
    #[default]
    Video,
    /// Audio-only stream, converted to mp3
    Audio,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Video, Format::Audio];

    pub fn label(self) -> &'static str {
        match self {
            Format::Video => "Video",
            Format::Audio => "Audio",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Format {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Video" => Ok(Format::Video),
            "Audio" => Ok(Format::Audio),
            other => Err(DownloadError::InvalidFormat(other.to_string())),
        }
    }
}

/// One click of the Download button
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub link: String,
    pub format: Format,
    /// Folder single videos land in; playlists get a subfolder here
    pub output_root: PathBuf,
}

/// How a link is going to be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Single,
    Playlist,
}

impl JobKind {
    /// Plain substring check, so any link mentioning "playlist" takes the playlist path.
    pub fn classify(link: &str) -> Self {
        if link.to_lowercase().contains("playlist") {
            JobKind::Playlist
        } else {
            JobKind::Single
        }
    }
}

/// Messages sent from the download worker back to the UI thread
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A line for the log area
    Log(String),
    /// New value for the progress bar, 0..=100
    Progress(u8),
    /// The worker is done
    Finished(Outcome),
}

/// How a download ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Stopped by the user or by closing the window
    Cancelled,
    /// User-facing error message
    Failed(String),
}

impl From<Result<(), DownloadError>> for Outcome {
    fn from(result: Result<(), DownloadError>) -> Self {
        match result {
            Ok(()) => Outcome::Completed,
            Err(DownloadError::Cancelled) => Outcome::Cancelled,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A modal dialog the UI should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn invalid_link() -> Self {
        Self {
            level: NotificationLevel::Warning,
            title: "Invalid Link".to_string(),
            message: DownloadError::InvalidLinkInput.to_string(),
        }
    }

    pub fn success() -> Self {
        Self {
            level: NotificationLevel::Info,
            title: "Download Successful".to_string(),
            message: "Download completed successfully.".to_string(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            level: NotificationLevel::Info,
            title: "Download Cancelled".to_string(),
            message: "The download was cancelled.".to_string(),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: "Error".to_string(),
            message: format!("An error occurred while downloading: {message}"),
        }
    }
}
