//! Logging helpers
//!
//! `RUST_LOG` wins over the configured level when both are present. Without
//! it the logger accepts everything and the global max level does the
//! filtering, so the level can be changed once configuration is resolved.

use log::LevelFilter;

/// Initialize the global logger
///
/// # Parameters
///
/// * `level` - Default log level (off, error, warn, info, debug, trace);
///   anything else falls back to `info`
///
/// Calling this more than once is harmless; only the first call installs a logger.
pub fn init_logger(level: &str) {
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", "trace");

    let installed = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_ok();

    if installed && !rust_log_set {
        log::set_max_level(parse_level(level));
    }
}

/// Change the level of an installed logger
///
/// Has no effect when `RUST_LOG` is set.
pub fn set_log_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(parse_level(level));
    }
}

/// Parse a level name, case-insensitively; unknown names map to `info`
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}
