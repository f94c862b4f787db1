//! The seam between the download logic and whatever actually fetches media.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{DownloadError, DownloadResult},
    model::{Format, JobKind},
    progress::ProgressSink,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video and audio in one file
    Combined,
    VideoOnly,
    AudioOnly,
}

/// A single retrievable track offered for a link
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Provider-specific id used to request this exact stream
    pub id: String,
    pub ext: String,
    pub kind: StreamKind,
    pub height: Option<u32>,
    /// Average audio bitrate in kbit/s
    pub abr: Option<f64>,
    pub filesize: Option<u64>,
}

/// All streams available for one video, in provider order
#[derive(Debug, Clone, Default)]
pub struct StreamSet {
    pub title: String,
    pub streams: Vec<Stream>,
}

impl StreamSet {
    /// Tallest stream that carries both video and audio
    pub fn highest_resolution(&self) -> Option<&Stream> {
        self.streams
            .iter()
            .filter(|s| s.kind == StreamKind::Combined)
            .max_by_key(|s| s.height.unwrap_or(0))
    }

    /// Best audio-only stream, preferring an mp4 container
    pub fn audio_only(&self) -> Option<&Stream> {
        let best = |mp4_only: bool| {
            self.streams
                .iter()
                .filter(|s| s.kind == StreamKind::AudioOnly)
                .filter(|s| !mp4_only || matches!(s.ext.as_str(), "m4a" | "mp4"))
                .max_by(|a, b| {
                    a.abr
                        .unwrap_or(0.0)
                        .partial_cmp(&b.abr.unwrap_or(0.0))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        };
        best(true).or_else(|| best(false))
    }

    /// First audio-only stream in provider order
    pub fn first_audio_only(&self) -> Option<&Stream> {
        self.streams.iter().find(|s| s.kind == StreamKind::AudioOnly)
    }

    /// Picks the stream for `format`. Playlist items take the first audio stream
    /// rather than the best one.
    pub fn select(&self, format: Format, kind: JobKind) -> DownloadResult<&Stream> {
        match (format, kind) {
            (Format::Video, _) => self
                .highest_resolution()
                .ok_or(DownloadError::NoMatchingStream("video")),
            (Format::Audio, JobKind::Single) => self
                .audio_only()
                .ok_or(DownloadError::NoMatchingStream("audio-only")),
            (Format::Audio, JobKind::Playlist) => self
                .first_audio_only()
                .ok_or(DownloadError::NoMatchingStream("audio-only")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistInfo {
    pub title: String,
    /// Item links in playlist order
    pub items: Vec<String>,
}

/// Parameters of one stream transfer
#[derive(Debug)]
pub struct Transfer<'a> {
    pub link: &'a str,
    pub stream: &'a Stream,
    pub destination: &'a Path,
    /// Prepended to the file name, e.g. `"3_"`
    pub filename_prefix: Option<String>,
    /// Re-encode the stream to mp3 after download
    pub convert_to_mp3: bool,
}

#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Streams available for a single video link
    async fn streams(&self, link: &str) -> DownloadResult<StreamSet>;

    /// Title and item links of a playlist
    async fn playlist(&self, link: &str) -> DownloadResult<PlaylistInfo>;

    /// Transfers a stream to disk and returns the path of the written file
    async fn download(
        &self,
        transfer: Transfer<'_>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> DownloadResult<PathBuf>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory provider that writes small real files.

    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    pub struct FakeProvider {
        pub playlist_title: String,
        pub playlist_items: Vec<String>,
        /// Downloads of this link fail
        pub fail_on: Option<String>,
        /// Cancel the token after this many finished downloads
        pub cancel_after: Option<usize>,
        /// Downloads block until notified or cancelled
        pub hold: Option<Arc<Notify>>,
        /// (link, chosen stream) for every transfer, in order
        pub selected: Mutex<Vec<(String, Stream)>>,
        pub finished: AtomicUsize,
    }

    impl FakeProvider {
        pub fn with_playlist(title: &str, items: &[&str]) -> Self {
            Self {
                playlist_title: title.to_string(),
                playlist_items: items.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        pub fn selected(&self) -> Vec<(String, Stream)> {
            self.selected.lock().unwrap().clone()
        }
    }

    fn stream(id: &str, ext: &str, kind: StreamKind, height: Option<u32>, abr: Option<f64>) -> Stream {
        Stream {
            id: id.to_string(),
            ext: ext.to_string(),
            kind,
            height,
            abr,
            filesize: Some(100),
        }
    }

    pub fn sample_streams(title: &str) -> StreamSet {
        StreamSet {
            title: title.to_string(),
            streams: vec![
                stream("251", "webm", StreamKind::AudioOnly, None, Some(160.0)),
                stream("18", "mp4", StreamKind::Combined, Some(360), Some(96.0)),
                stream("140", "m4a", StreamKind::AudioOnly, None, Some(128.0)),
                stream("22", "mp4", StreamKind::Combined, Some(720), Some(192.0)),
                stream("137", "mp4", StreamKind::VideoOnly, Some(1080), None),
            ],
        }
    }

    #[async_trait]
    impl StreamProvider for FakeProvider {
        async fn streams(&self, link: &str) -> DownloadResult<StreamSet> {
            let title = link.rsplit('=').next().unwrap_or(link);
            Ok(sample_streams(title))
        }

        async fn playlist(&self, _link: &str) -> DownloadResult<PlaylistInfo> {
            Ok(PlaylistInfo {
                title: self.playlist_title.clone(),
                items: self.playlist_items.clone(),
            })
        }

        async fn download(
            &self,
            transfer: Transfer<'_>,
            progress: &dyn ProgressSink,
            cancel: &CancellationToken,
        ) -> DownloadResult<PathBuf> {
            self.selected
                .lock()
                .unwrap()
                .push((transfer.link.to_string(), transfer.stream.clone()));

            if let Some(hold) = &self.hold {
                tokio::select! {
                    _ = hold.notified() => {}
                    _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                }
            }
            if self.fail_on.as_deref() == Some(transfer.link) {
                return Err(DownloadError::Provider("HTTP Error 404: Not Found".to_string()));
            }

            progress.on_progress(50, 100);
            progress.on_progress(100, 100);

            let title = transfer.link.rsplit('=').next().unwrap_or("video");
            let ext = if transfer.convert_to_mp3 { "mp3" } else { transfer.stream.ext.as_str() };
            let name = format!(
                "{}{}.{}",
                transfer.filename_prefix.as_deref().unwrap_or(""),
                title,
                ext
            );
            let path = transfer.destination.join(name);
            tokio::fs::write(&path, b"media").await?;

            let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
            if self.cancel_after == Some(done) {
                cancel.cancel();
            }
            Ok(path)
        }
    }
}
