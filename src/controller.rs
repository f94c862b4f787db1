//! UI-facing state and the glue between button clicks and the download worker.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::DownloadError,
    model::{DownloadRequest, Format, LINK_PLACEHOLDER, Notification, Outcome, WorkerEvent},
    orchestrator::Orchestrator,
};

/// Link input with placeholder behaviour: the hint is real text in the field
/// and is removed on focus, put back on blur if nothing was typed.
#[derive(Debug, Clone)]
pub struct LinkField {
    text: String,
    placeholder_shown: bool,
}

impl Default for LinkField {
    fn default() -> Self {
        Self {
            text: LINK_PLACEHOLDER.to_string(),
            placeholder_shown: true,
        }
    }
}

impl LinkField {
    pub fn focus_in(&mut self) {
        if self.text == LINK_PLACEHOLDER {
            self.text.clear();
        }
        self.placeholder_shown = false;
    }

    pub fn focus_out(&mut self) {
        if self.text.is_empty() {
            self.text = LINK_PLACEHOLDER.to_string();
            self.placeholder_shown = true;
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder_shown
    }

    pub fn text_mut(&mut self) -> &mut String {
        &mut self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.placeholder_shown = false;
    }

    /// The link the user entered, if any
    pub fn value(&self) -> Option<&str> {
        let link = self.text.trim();
        (!link.is_empty() && link != LINK_PLACEHOLDER).then_some(link)
    }
}

/// Everything the window renders
#[derive(Debug)]
pub struct AppState {
    pub link: LinkField,
    pub format: Format,
    pub output_root: PathBuf,
    pub log: Vec<String>,
    /// `Some` while a download runs; the bar is hidden otherwise
    pub progress: Option<u8>,
    pub trigger_enabled: bool,
    pub notification: Option<Notification>,
}

impl AppState {
    pub fn new(format: Format, output_root: PathBuf) -> Self {
        Self {
            link: LinkField::default(),
            format,
            output_root,
            log: Vec::new(),
            progress: None,
            trigger_enabled: true,
            notification: None,
        }
    }
}

/// How long closing the window waits for the worker to kill yt-dlp
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Controller {
    pub state: AppState,
    orchestrator: Arc<Orchestrator>,
    runtime: Handle,
    events_tx: UnboundedSender<WorkerEvent>,
    events_rx: UnboundedReceiver<WorkerEvent>,
    cancel: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(state: AppState, orchestrator: Arc<Orchestrator>, runtime: Handle) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            state,
            orchestrator,
            runtime,
            events_tx,
            events_rx,
            cancel: None,
            worker: None,
        }
    }

    pub fn is_downloading(&self) -> bool {
        self.cancel.is_some()
    }

    /// Download button handler. Validates the link on the calling thread and, if it is
    /// usable, hands the request to a worker task.
    pub fn start_download(&mut self) -> Result<(), DownloadError> {
        if self.is_downloading() || self.orchestrator.is_busy() {
            return Err(DownloadError::Busy);
        }
        self.state.trigger_enabled = false;

        let Some(link) = self.state.link.value().map(str::to_owned) else {
            warn!("download requested without a link");
            self.state.notification = Some(Notification::invalid_link());
            self.state.trigger_enabled = true;
            return Err(DownloadError::InvalidLinkInput);
        };

        let request = DownloadRequest {
            link,
            format: self.state.format,
            output_root: self.state.output_root.clone(),
        };

        self.state.log.clear();
        self.state.log.push(format!("Downloading from link: {}", request.link));
        self.state.log.push(format!("Format selected: {}", request.format));
        self.state.log.push(String::new());
        self.state.progress = Some(0);

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());

        let orchestrator = Arc::clone(&self.orchestrator);
        let tx = self.events_tx.clone();
        self.worker = Some(self.runtime.spawn(async move {
            let result = orchestrator.run(&request, &tx, &token).await;
            let _ = tx.send(WorkerEvent::Finished(result.into()));
        }));
        Ok(())
    }

    /// Asks the running download to stop
    pub fn cancel(&mut self) {
        if let Some(token) = &self.cancel {
            info!("cancelling download");
            token.cancel();
            self.state.log.push("Cancelling...".to_string());
        }
    }

    /// Applies pending worker events. Returns true if anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            changed = true;
            match event {
                WorkerEvent::Log(line) => self.state.log.push(line),
                WorkerEvent::Progress(p) => {
                    if self.state.progress.is_some() {
                        self.state.progress = Some(p);
                    }
                }
                WorkerEvent::Finished(outcome) => {
                    self.state.notification = Some(match outcome {
                        Outcome::Completed => {
                            self.state.link.clear();
                            Notification::success()
                        }
                        Outcome::Cancelled => Notification::cancelled(),
                        Outcome::Failed(message) => Notification::failure(&message),
                    });
                    self.state.trigger_enabled = true;
                    self.state.progress = None;
                    self.cancel = None;
                    self.worker = None;
                }
            }
        }
        changed
    }

    pub fn take_notification(&mut self) -> Option<Notification> {
        self.state.notification.take()
    }
}

impl Drop for Controller {
    /// Window closed mid-download: cancel, then give the worker time to kill yt-dlp
    /// before the process exits.
    fn drop(&mut self) {
        let Some(token) = self.cancel.take() else { return };
        token.cancel();

        let Some(worker) = self.worker.take() else { return };
        // blocking is not allowed from inside the runtime
        if Handle::try_current().is_ok() {
            return;
        }
        info!("waiting for the download worker to stop");
        if self.runtime.block_on(tokio::time::timeout(SHUTDOWN_GRACE, worker)).is_err() {
            warn!("download worker did not stop within {SHUTDOWN_GRACE:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        model::NotificationLevel,
        provider::{StreamKind, fake::FakeProvider},
    };

    fn controller(provider: Arc<FakeProvider>, root: PathBuf) -> Controller {
        Controller::new(
            AppState::new(Format::Video, root),
            Arc::new(Orchestrator::new(provider)),
            Handle::current(),
        )
    }

    async fn wait_until_done(c: &mut Controller) {
        for _ in 0..500 {
            c.poll();
            if !c.is_downloading() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("download did not finish");
    }

    #[test]
    fn placeholder_follows_focus() {
        let mut field = LinkField::default();
        assert!(field.is_placeholder());
        assert_eq!(field.text(), LINK_PLACEHOLDER);
        assert_eq!(field.value(), None);

        field.focus_in();
        assert_eq!(field.text(), "");
        field.focus_out();
        assert_eq!(field.text(), LINK_PLACEHOLDER);

        field.focus_in();
        field.text_mut().push_str("https://youtu.be/x");
        field.focus_out();
        assert_eq!(field.value(), Some("https://youtu.be/x"));
        assert!(!field.is_placeholder());
    }

    #[tokio::test]
    async fn empty_or_placeholder_link_never_starts_a_worker() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let mut c = controller(provider.clone(), dir.path().to_path_buf());

        // placeholder text
        assert!(matches!(c.start_download(), Err(DownloadError::InvalidLinkInput)));
        let n = c.take_notification().unwrap();
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.title, "Invalid Link");
        assert!(c.state.trigger_enabled);

        // empty text
        c.state.link.focus_in();
        assert!(matches!(c.start_download(), Err(DownloadError::InvalidLinkInput)));
        assert!(!c.is_downloading());
        assert!(c.state.progress.is_none());

        tokio::task::yield_now().await;
        assert!(!c.poll());
        assert!(provider.selected().is_empty());
    }

    #[tokio::test]
    async fn successful_download_resets_the_form() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let mut c = controller(provider.clone(), dir.path().to_path_buf());
        c.state.format = Format::Audio;
        c.state.link.focus_in();
        c.state.link.text_mut().push_str("https://youtu.be/watch?v=tune");

        c.start_download().unwrap();
        assert!(!c.state.trigger_enabled);
        assert_eq!(c.state.progress, Some(0));
        assert!(matches!(c.start_download(), Err(DownloadError::Busy)));

        wait_until_done(&mut c).await;

        assert_eq!(c.take_notification(), Some(Notification::success()));
        assert_eq!(c.state.link.text(), "");
        assert!(c.state.trigger_enabled);
        assert!(c.state.progress.is_none());
        assert_eq!(c.state.log[0], "Downloading from link: https://youtu.be/watch?v=tune");
        assert_eq!(c.state.log[1], "Format selected: Audio");
        assert!(c.state.log.iter().any(|l| l.starts_with("Video downloaded successfully")));
        assert_eq!(provider.selected()[0].1.kind, StreamKind::AudioOnly);
        assert!(dir.path().join("tune.mp3").exists());
    }

    #[tokio::test]
    async fn cancel_shows_info_instead_of_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider {
            hold: Some(Arc::new(Notify::new())),
            ..Default::default()
        });
        let orchestrator = Arc::new(Orchestrator::new(provider));
        let mut c = Controller::new(
            AppState::new(Format::Video, dir.path().to_path_buf()),
            orchestrator.clone(),
            Handle::current(),
        );
        c.state.link.focus_in();
        c.state.link.text_mut().push_str("https://youtu.be/watch?v=long");

        c.start_download().unwrap();
        while !orchestrator.is_busy() {
            tokio::task::yield_now().await;
        }
        c.cancel();
        wait_until_done(&mut c).await;

        let n = c.take_notification().unwrap();
        assert_eq!(n, Notification::cancelled());
        assert_eq!(n.level, NotificationLevel::Info);
        assert!(c.state.trigger_enabled);
        assert!(c.state.progress.is_none());
        // not cleared, nothing was downloaded
        assert_eq!(c.state.link.text(), "https://youtu.be/watch?v=long");
    }

    #[test]
    fn dropping_the_controller_waits_for_the_worker() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider {
            hold: Some(Arc::new(Notify::new())),
            ..Default::default()
        });
        let orchestrator = Arc::new(Orchestrator::new(provider.clone()));
        let mut c = Controller::new(
            AppState::new(Format::Video, dir.path().to_path_buf()),
            orchestrator.clone(),
            rt.handle().clone(),
        );
        c.state.link.focus_in();
        c.state.link.text_mut().push_str("https://youtu.be/watch?v=stuck");
        c.start_download().unwrap();

        for _ in 0..500 {
            if !provider.selected().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(orchestrator.is_busy());

        drop(c);

        // the worker saw the cancellation and finished before drop returned
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn failure_surfaces_one_error_dialog() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider {
            fail_on: Some("https://youtu.be/watch?v=gone".to_string()),
            ..Default::default()
        });
        let mut c = controller(provider, dir.path().to_path_buf());
        c.state.link.focus_in();
        c.state.link.text_mut().push_str("https://youtu.be/watch?v=gone");

        c.start_download().unwrap();
        wait_until_done(&mut c).await;

        let n = c.take_notification().unwrap();
        assert_eq!(n.level, NotificationLevel::Error);
        assert_eq!(
            n.message,
            "An error occurred while downloading: HTTP Error 404: Not Found"
        );
        assert!(c.take_notification().is_none());
        // the link stays so the user can retry by hand
        assert_eq!(c.state.link.text(), "https://youtu.be/watch?v=gone");
        assert!(c.state.trigger_enabled);
        assert!(c.state.progress.is_none());
    }
}
