use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

/// Initialises the stdout tracer for the calling binary.
/// The log level is taken from the `RUST_LOG` environment variable,
/// falling back to `info` when it is not set.
pub fn init_tracer() {
    let stdout_tracer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    let log_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber =
        tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

    //  This is only called once, so will never panic
    tracing::subscriber::set_global_default(subscriber)
        .expect("tracing::subscriber::set_global_default should only be called once");
}
