use std::path::PathBuf;

use clap::{Parser, value_parser};
use segdl_fetch::{DownloadOptions, RefillPolicy};

#[derive(Clone, Debug, Parser)]
#[command(name = "segdl", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
pub struct App {
    /// URL of the resource to download
    pub url: String,

    /// Number of parallel range requests
    #[arg(
        value_name = "MAX_CONCURRENT_CONNECTIONS",
        default_value_t = 1,
        value_parser = value_parser!(u64).range(1..)
    )]
    pub max_connections: u64,

    /// Aggregate throughput ceiling in bytes per second [default: 1000000]
    #[arg(value_name = "MAX_BYTES_PER_SECOND", value_parser = value_parser!(u64).range(1..))]
    pub max_bytes_per_second: Option<u64>,

    /// Directory for the output file and its progress file
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Reset the token budget every second instead of letting it accumulate
    #[arg(long)]
    pub hard_limit: bool,

    /// Give up after this many consecutive waves without progress
    #[arg(long, default_value_t = 5, value_parser = value_parser!(u32).range(1..))]
    pub max_stalled_waves: u32,

    /// Do not draw a progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl App {
    pub fn download_options(&self) -> DownloadOptions {
        let refill_policy = if self.hard_limit {
            RefillPolicy::Reset
        } else {
            RefillPolicy::Accumulate
        };

        DownloadOptions::default()
            .max_connections(usize::try_from(self.max_connections).unwrap_or(usize::MAX))
            .max_bytes_per_second(self.max_bytes_per_second)
            .refill_policy(refill_policy)
            .output_dir(&self.output_dir)
            .max_stalled_waves(self.max_stalled_waves)
    }
}
