use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set. With `json_output` the human log lines move to stderr so stdout
/// carries only the machine-readable report.
pub fn init_tracing(default_filter: &str, json_output: bool) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(false);

    let res = if json_output {
        builder.with_writer(std::io::stderr).try_init()
    } else {
        builder.try_init()
    };
    res.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
