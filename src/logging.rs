use tracing_subscriber::EnvFilter;

/// Per-frame diagnostics (the four encoded values of every frame sent or
/// received) are logged under this target at debug level.
pub const WIRE_TARGET: &str = "pius_link::wire";

/// Lifecycle at info, plus one line per frame on the wire target.
/// `RUST_LOG=pius_link=info` silences the per-frame lines.
pub const DEFAULT_FILTER: &str = "pius_link=info,pius_link::wire=debug";

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// A second call is ignored, so tests and bindings may call it freely.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}
