//! Runs one download request against a [`StreamProvider`].

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    error::{DownloadError, DownloadResult},
    model::{DownloadRequest, Format, JobKind, WorkerEvent},
    progress::ProgressReporter,
    provider::{StreamProvider, Transfer},
};

pub struct Orchestrator {
    provider: Arc<dyn StreamProvider>,
    busy: AtomicBool,
}

/// Clears the busy flag when the run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn StreamProvider>) -> Self {
        Self {
            provider,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Downloads everything `request` points at. Log lines and progress go to `events`;
    /// the caller turns the returned result into the final notification.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DownloadError::Busy);
        }
        let _guard = RunGuard(&self.busy);

        let kind = JobKind::classify(&request.link);
        info!(link = %request.link, format = %request.format, ?kind, "starting download");

        let result = match kind {
            JobKind::Single => self.run_single(request, events, cancel).await,
            JobKind::Playlist => self.run_playlist(request, events, cancel).await,
        };

        if let Err(e) = &result {
            error!(link = %request.link, "download failed: {e}");
            let _ = events.send(WorkerEvent::Log(format!("Error: {e}")));
        }
        result
    }

    async fn run_single(
        &self,
        request: &DownloadRequest,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        let destination = destination_dir(&request.output_root, None).await?;
        let set = self.provider.streams(&request.link).await?;
        let stream = set.select(request.format, JobKind::Single)?;
        debug!(title = %set.title, stream = %stream.id, size = ?stream.filesize, "selected stream");

        let reporter = ProgressReporter::new(events.clone());
        let path = self
            .provider
            .download(
                Transfer {
                    link: &request.link,
                    stream,
                    destination: &destination,
                    filename_prefix: None,
                    convert_to_mp3: request.format == Format::Audio,
                },
                &reporter,
                cancel,
            )
            .await?;

        log_line(events, format!("Video downloaded successfully to: {}", path.display()));
        Ok(())
    }

    async fn run_playlist(
        &self,
        request: &DownloadRequest,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        let playlist = self.provider.playlist(&request.link).await?;
        let destination = destination_dir(&request.output_root, Some(&playlist.title)).await?;
        let total = playlist.items.len();
        info!(title = %playlist.title, total, "playlist resolved");

        let reporter = ProgressReporter::new(events.clone());
        for (i, item) in playlist.items.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            let index = i + 1;

            let set = self.provider.streams(item).await?;
            let stream = set.select(request.format, JobKind::Playlist)?;
            debug!(index, title = %set.title, stream = %stream.id, "selected stream");

            let path = self
                .provider
                .download(
                    Transfer {
                        link: item,
                        stream,
                        destination: &destination,
                        filename_prefix: Some(format!("{index}_")),
                        convert_to_mp3: request.format == Format::Audio,
                    },
                    &reporter,
                    cancel,
                )
                .await?;

            log_line(events, format!("Video downloaded successfully to: {}", path.display()));
            reporter.set(overall_progress(index, total));
        }
        Ok(())
    }
}

/// Whole percent of playlist items finished
pub fn overall_progress(finished: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (finished.min(total) * 100 / total) as u8
}

/// `<root>` or `<root>/<playlist title>`, created if missing.
pub async fn destination_dir(root: &Path, playlist_title: Option<&str>) -> DownloadResult<PathBuf> {
    let dir = match playlist_title {
        Some(title) => root.join(folder_name(title)),
        None => root.to_path_buf(),
    };
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

// Keeps the title a single path component that Windows also accepts
fn folder_name(title: &str) -> String {
    let name: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match name.trim() {
        "" | "." | ".." => "Untitled playlist".to_string(),
        _ => name,
    }
}

fn log_line(events: &UnboundedSender<WorkerEvent>, line: String) {
    info!("{line}");
    let _ = events.send(WorkerEvent::Log(line));
}
