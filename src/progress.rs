use tokio::sync::mpsc::UnboundedSender;

use crate::model::WorkerEvent;

/// Prefix of the lines yt-dlp prints through `--progress-template`
pub const PROGRESS_PREFIX: &str = "progress:";

/// Receives byte counts while a stream is being transferred.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, bytes_done: u64, bytes_total: u64);
}

/// Whole percent of `total` already transferred. `None` when the total is unknown (zero).
pub fn percentage(total: u64, remaining: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let done = total.saturating_sub(remaining) as u128;
    Some((done * 100 / total as u128) as u8)
}

/// Publishes transfer progress to the UI as `WorkerEvent::Progress`
#[derive(Clone)]
pub struct ProgressReporter {
    tx: UnboundedSender<WorkerEvent>,
}

impl ProgressReporter {
    pub fn new(tx: UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }

    /// Overwrites the progress bar with `value`
    pub fn set(&self, value: u8) {
        let _ = self.tx.send(WorkerEvent::Progress(value.min(100)));
    }
}

impl ProgressSink for ProgressReporter {
    fn on_progress(&self, bytes_done: u64, bytes_total: u64) {
        let remaining = bytes_total.saturating_sub(bytes_done);
        if let Some(pct) = percentage(bytes_total, remaining) {
            self.set(pct);
        }
    }
}

/// Parses `progress:<downloaded>/<total>`. The total is `None` when yt-dlp prints `NA`.
pub fn parse_progress_from_line(line: &str) -> Option<(u64, Option<u64>)> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let (done, total) = rest.split_once('/')?;
    let done = parse_bytes(done)?;
    Some((done, parse_bytes(total)))
}

// yt-dlp prints estimates as floats ("1234.0")
fn parse_bytes(field: &str) -> Option<u64> {
    let field = field.trim();
    if let Ok(v) = field.parse::<u64>() {
        return Some(v);
    }
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}
