use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "segdl=info,segdl_fetch=info";

/// Log to stderr so stdout carries only the final outcome line.
///
/// `RUST_LOG` overrides the default filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
