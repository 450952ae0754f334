use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use segdl_fetch::{DownloadReport, Downloader};
use tracing::debug;

mod cli;
mod logging;
mod tracker;

use cli::App;
use tracker::ProgressTracker;

const EXIT_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let app = App::parse();
    logging::init();

    let tracker = ProgressTracker::new(!app.quiet);
    match run(&app, &tracker).await {
        Ok(report) => {
            debug!(?report, "download finished");
            if report.succeeded() {
                tracker.finish(None);
            } else {
                tracker.abandon();
            }
            println!("{}", report.outcome);
            if report.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILED)
            }
        }
        Err(e) => {
            tracker.abandon();
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(app: &App, tracker: &ProgressTracker) -> Result<DownloadReport> {
    let options = app.download_options().on_progress(tracker.callback());
    let downloader = Downloader::with_reqwest(options).context("invalid download settings")?;
    downloader
        .download(&app.url)
        .await
        .with_context(|| format!("cannot download {}", app.url))
}
