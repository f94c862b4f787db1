//! Main application for the YouTube Downloader GUI

// Command line / environment settings
mod config;
// Button handlers and UI-bound state
mod controller;
// yt-dlp backed stream provider
mod downloader;
mod error;
// Requests, formats and worker messages
mod model;
// Single/playlist download flow
mod orchestrator;
// Byte counts to percentages
mod progress;
// Stream provider trait and stream selection
mod provider;

use std::sync::Arc;

use clap::Parser;
use eframe::{App, Frame, egui};
use egui::{Color32, Visuals};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use tokio::runtime::Runtime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use controller::{AppState, Controller};
use downloader::{YtDlp, resolve_binary};
use model::{Format, Notification, NotificationLevel};
use orchestrator::Orchestrator;

const ICON_SIZE: u32 = 32;

/// Window icon: white play triangle on a red tile, drawn at startup so no image
/// decoder is needed
fn app_icon() -> egui::IconData {
    let size = ICON_SIZE as i32;
    let mut rgba = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            // triangle pointing right, vertices (11,8) (11,24) (24,16)
            let in_triangle = x >= 11 && x <= 24 && 2 * (y - 16).abs() <= 24 - x;
            let pixel = if in_triangle {
                [255, 255, 255, 255]
            } else {
                [204, 0, 0, 255]
            };
            rgba.extend_from_slice(&pixel);
        }
    }
    egui::IconData {
        rgba,
        width: ICON_SIZE,
        height: ICON_SIZE,
    }
}

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("youtube_downloader=info")),
        )
        .init();

    let config = Config::parse();

    let rt = match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            error!("failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };
    let handle = RUNTIME.get_or_init(|| rt).handle().clone();

    let bin = match resolve_binary(config.yt_dlp.as_deref()) {
        Ok(bin) => bin,
        Err(e) => {
            error!("could not prepare yt-dlp: {e}");
            std::process::exit(1);
        }
    };
    info!(yt_dlp = %bin.display(), output = %config.output_root().display(), "starting");

    let orchestrator = Arc::new(Orchestrator::new(Arc::new(YtDlp::new(bin))));
    let state = AppState::new(config.initial_format(), config.output_root());
    let controller = Controller::new(state, orchestrator, handle);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_icon(app_icon()),
        ..Default::default()
    };
    eframe::run_native(
        "YouTube Downloader",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp { controller })
        }),
    )
}

struct DownloaderApp {
    controller: Controller,
}

fn show_notification(n: &Notification) {
    let level = match n.level {
        NotificationLevel::Info => MessageLevel::Info,
        NotificationLevel::Warning => MessageLevel::Warning,
        NotificationLevel::Error => MessageLevel::Error,
    };
    MessageDialog::new()
        .set_level(level)
        .set_title(&n.title)
        .set_description(&n.message)
        .set_buttons(MessageButtons::Ok)
        .show();
}

/// GUI update loop: called each frame to drain worker events and redraw
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.controller.poll();
        if let Some(n) = self.controller.take_notification() {
            show_notification(&n);
        }

        let state = &mut self.controller.state;
        let mut download_clicked = false;
        let mut cancel_clicked = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube Downloader");

            ui.label(egui::RichText::new("YouTube Link:").strong());
            let color = if state.link.is_placeholder() { Color32::GRAY } else { Color32::WHITE };
            let response = ui.add(
                egui::TextEdit::singleline(state.link.text_mut())
                    .text_color(color)
                    .desired_width(f32::INFINITY),
            );
            if response.gained_focus() {
                state.link.focus_in();
            }
            if response.lost_focus() {
                state.link.focus_out();
            }

            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("Select Format:").strong());
                egui::ComboBox::from_id_source("format")
                    .selected_text(state.format.label())
                    .show_ui(ui, |ui| {
                        for f in Format::ALL {
                            ui.selectable_value(&mut state.format, f, f.label());
                        }
                    });
            });

            ui.horizontal(|ui| {
                ui.label("Download folder:");
                ui.label(state.output_root.display().to_string());
                if ui.add_enabled(state.trigger_enabled, egui::Button::new("Browse…")).clicked() {
                    if let Some(folder) = FileDialog::new().set_directory(&state.output_root).pick_folder() {
                        state.output_root = folder;
                    }
                }
            });

            ui.horizontal(|ui| {
                let download = egui::Button::new("Download").fill(Color32::from_rgb(0xFF, 0x00, 0x00));
                if ui.add_enabled(state.trigger_enabled, download).clicked() {
                    download_clicked = true;
                }
                if state.progress.is_some() && ui.button("Cancel").clicked() {
                    cancel_clicked = true;
                }
            });

            if let Some(p) = state.progress {
                ui.add(egui::ProgressBar::new(f32::from(p) / 100.0).show_percentage());
            }

            ui.separator();
            let mut log = state.log.join("\n");
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut log)
                            .interactive(false)
                            .desired_width(f32::INFINITY),
                    );
                });
        });

        if download_clicked {
            // invalid input is reported through the notification on the next frame
            if let Err(e) = self.controller.start_download() {
                info!("download not started: {e}");
            }
        }
        if cancel_clicked {
            self.controller.cancel();
        }

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
