//! [`StreamProvider`] backed by the yt-dlp executable.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{DownloadError, DownloadResult},
    progress::{PROGRESS_PREFIX, ProgressSink, parse_progress_from_line},
    provider::{PlaylistInfo, Stream, StreamKind, StreamProvider, StreamSet, Transfer},
};

/// Bundled yt-dlp binaries, if any were placed in `assets/` at build time
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

const FILE_PREFIX: &str = "file:";

fn binary_name() -> &'static str {
    if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" }
}

/// Finds the yt-dlp to run: an explicit path, then the embedded copy, then `PATH`.
pub fn resolve_binary(explicit: Option<&Path>) -> DownloadResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let bin = binary_name();
    let Some(data) = Asset::get(bin) else {
        debug!("no embedded {bin}, using PATH");
        return Ok(PathBuf::from(bin));
    };

    let tmp = std::env::temp_dir().join(bin);
    if !tmp.exists() {
        std::fs::write(&tmp, &data.data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
        info!(path = %tmp.display(), "extracted embedded yt-dlp");
    }
    Ok(tmp)
}

pub struct YtDlp {
    bin: PathBuf,
}

impl YtDlp {
    pub fn new(bin: PathBuf) -> Self {
        Self { bin }
    }

    /// Runs yt-dlp to completion and returns its stdout
    async fn output(&self, args: &[&str]) -> DownloadResult<Vec<u8>> {
        debug!(bin = %self.bin.display(), ?args, "running yt-dlp");
        let out = Command::new(&self.bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| spawn_error(&self.bin, e))?;

        if !out.status.success() {
            return Err(DownloadError::Provider(failure_message(&out.stderr)));
        }
        Ok(out.stdout)
    }
}

fn spawn_error(bin: &Path, e: std::io::Error) -> DownloadError {
    DownloadError::Provider(format!("failed to start {}: {e}", bin.display()))
}

// Last "ERROR:" line from yt-dlp, else the whole stderr
fn failure_message(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .find_map(|l| l.strip_prefix("ERROR:"))
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                "yt-dlp exited with an error".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

#[derive(Debug, Deserialize)]
struct VideoJson {
    #[serde(default)]
    title: String,
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: String,
    #[serde(default)]
    ext: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
}

impl FormatJson {
    fn kind(&self) -> Option<StreamKind> {
        let has = |codec: &Option<String>| codec.as_deref().is_some_and(|c| c != "none");
        match (has(&self.vcodec), has(&self.acodec)) {
            (true, true) => Some(StreamKind::Combined),
            (true, false) => Some(StreamKind::VideoOnly),
            (false, true) => Some(StreamKind::AudioOnly),
            // storyboards and the like
            (false, false) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistJson {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    entries: Vec<EntryJson>,
}

#[derive(Debug, Deserialize)]
struct EntryJson {
    url: Option<String>,
    webpage_url: Option<String>,
    id: Option<String>,
}

impl EntryJson {
    fn link(self) -> Option<String> {
        self.webpage_url
            .or(self.url)
            .or_else(|| self.id.map(|id| format!("https://www.youtube.com/watch?v={id}")))
    }
}

fn parse_stream_set(json: &[u8]) -> DownloadResult<StreamSet> {
    let video: VideoJson = serde_json::from_slice(json)?;
    let streams = video
        .formats
        .into_iter()
        .filter_map(|f| {
            let kind = f.kind()?;
            Some(Stream {
                kind,
                id: f.format_id,
                ext: f.ext,
                height: f.height,
                abr: f.abr,
                filesize: f.filesize.or(f.filesize_approx),
            })
        })
        .collect();
    Ok(StreamSet {
        title: video.title,
        streams,
    })
}

fn parse_playlist(json: &[u8]) -> DownloadResult<PlaylistInfo> {
    let playlist: PlaylistJson = serde_json::from_slice(json)?;
    Ok(PlaylistInfo {
        title: playlist.title.unwrap_or_default(),
        items: playlist.entries.into_iter().filter_map(EntryJson::link).collect(),
    })
}

/// Decodes one output line, replacing bytes that are not UTF-8, and empties `buf`
fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    line
}

fn download_args(transfer: &Transfer<'_>) -> Vec<String> {
    let template = format!(
        "{}%(title)s.%(ext)s",
        transfer.filename_prefix.as_deref().unwrap_or("")
    );
    let mut args = vec![
        "-f".to_owned(),
        transfer.stream.id.clone(),
        "--encoding".to_owned(),
        "utf-8".to_owned(),
        "--no-playlist".to_owned(),
        "--newline".to_owned(),
        "--progress".to_owned(),
        "--progress-template".to_owned(),
        format!(
            "download:{PROGRESS_PREFIX}%(progress.downloaded_bytes)s/%(progress.total_bytes,progress.total_bytes_estimate)s"
        ),
        "--print".to_owned(),
        format!("after_move:{FILE_PREFIX}%(filepath)s"),
        "-P".to_owned(),
        transfer.destination.to_string_lossy().into_owned(),
        "-o".to_owned(),
        template,
    ];
    if transfer.convert_to_mp3 {
        args.extend(["-x", "--audio-format", "mp3"].map(str::to_owned));
    }
    args.push(transfer.link.to_owned());
    args
}

#[async_trait]
impl StreamProvider for YtDlp {
    async fn streams(&self, link: &str) -> DownloadResult<StreamSet> {
        let json = self.output(&["-J", "--no-playlist", "--no-warnings", link]).await?;
        parse_stream_set(&json)
    }

    async fn playlist(&self, link: &str) -> DownloadResult<PlaylistInfo> {
        let json = self
            .output(&["-J", "--flat-playlist", "--no-warnings", link])
            .await?;
        parse_playlist(&json)
    }

    async fn download(
        &self,
        transfer: Transfer<'_>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> DownloadResult<PathBuf> {
        let args = download_args(&transfer);
        debug!(bin = %self.bin.display(), ?args, "spawning yt-dlp");

        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.bin, e))?;

        let out = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Provider("yt-dlp stdout unavailable".to_string()))?;
        let err = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Provider("yt-dlp stderr unavailable".to_string()))?;

        // progress can arrive on either pipe depending on quiet mode
        let mut out = BufReader::new(out);
        let mut err = BufReader::new(err);
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let (mut out_open, mut err_open) = (true, true);
        let mut stderr = Vec::new();
        let mut file_path = None;

        while out_open || err_open {
            // read_until keeps partial bytes in the buffer if the other branch wins
            let (read, from_stderr) = tokio::select! {
                n = out.read_until(b'\n', &mut out_buf), if out_open => (n?, false),
                n = err.read_until(b'\n', &mut err_buf), if err_open => (n?, true),
                _ = cancel.cancelled() => {
                    warn!(link = transfer.link, "cancelling yt-dlp");
                    let _ = child.kill().await;
                    return Err(DownloadError::Cancelled);
                }
            };
            let buf = if from_stderr { &mut err_buf } else { &mut out_buf };
            if read == 0 {
                if from_stderr { err_open = false } else { out_open = false }
                if buf.is_empty() {
                    continue;
                }
            }
            let line = take_line(buf);

            if let Some((done, total)) = parse_progress_from_line(&line) {
                if let Some(total) = total {
                    progress.on_progress(done, total);
                }
            } else if let Some(path) = line.strip_prefix(FILE_PREFIX) {
                file_path = Some(PathBuf::from(path.trim()));
            } else if from_stderr {
                stderr.extend_from_slice(line.as_bytes());
                stderr.push(b'\n');
            } else {
                debug!("yt-dlp> {line}");
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(DownloadError::Provider(failure_message(&stderr)));
        }

        file_path.ok_or_else(|| {
            DownloadError::Provider("yt-dlp did not report the downloaded file".to_string())
        })
    }
}
