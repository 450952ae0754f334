use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use segdl_fetch::{Progress, ProgressCallback};
use std::sync::Arc;

const PB_STYLE: &str = "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<ProgressStyle> = Lazy::new(|| match ProgressStyle::with_template(PB_STYLE) {
    Ok(style) => style.tick_chars(TICK).progress_chars(PB_CHARS),
    Err(_) => ProgressStyle::default_bar(),
});

/// Progress bar fed by the writer's progress callback.
pub struct ProgressTracker {
    pb: ProgressBar,
}

impl ProgressTracker {
    pub fn new(visible: bool) -> Self {
        let pb = if visible {
            ProgressBar::no_length()
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(PB_TEMPLATE.clone());
        Self { pb }
    }

    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Arc::new(move |progress: &Progress| {
            pb.set_length(progress.file_size);
            pb.set_position(progress.bytes_written);
        })
    }

    pub fn finish(&self, msg: Option<String>) {
        match msg {
            Some(msg) => self.pb.finish_with_message(msg),
            None => self.pb.finish(),
        }
    }

    pub fn abandon(&self) {
        self.pb.abandon();
    }
}
