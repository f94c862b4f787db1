use thiserror::Error;

/// Everything that can stop a download. The `Display` text is what ends up in the
/// log area and the error dialog.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Link field empty or still showing the placeholder
    #[error("Please enter a valid YouTube link.")]
    InvalidLinkInput,

    #[error("Invalid Format: {0}")]
    InvalidFormat(String),

    /// A download is already running
    #[error("a download is already in progress")]
    Busy,

    #[error("download cancelled")]
    Cancelled,

    #[error("no {0} stream available")]
    NoMatchingStream(&'static str),

    /// yt-dlp failed or produced output we could not use
    #[error("{0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not read stream information: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DownloadResult<T> = Result<T, DownloadError>;
