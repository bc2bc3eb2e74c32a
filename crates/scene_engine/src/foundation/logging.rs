//! Logging utilities
//!
//! The engine only emits records through the `log` facade. Binaries pick the
//! backend; `init` and `init_with_level` wire up `env_logger`.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize the logging system with a default filter such as `"info"` or
/// `"scene_engine=debug"`; `RUST_LOG` still takes precedence when set
pub fn init_with_level(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}
