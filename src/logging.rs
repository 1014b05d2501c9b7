use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` takes precedence over `filter`.
/// Calling it again once a subscriber is installed does nothing.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).try_init();
}
