pub mod config;
pub mod inference;
pub mod payload;
pub mod server;

/// Logging setup shared by the binary
pub mod util {
    use tracing_subscriber::EnvFilter;

    /// Filter used when `RUST_LOG` is unset
    pub const DEFAULT_LOG_FILTER: &str = "info,actix_web=info";

    /// Install the global `tracing` subscriber. `log` records emitted by
    /// actix-web's request logger are forwarded to it.
    pub fn init_tracing() {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
