//! Logging configuration for kfuse
//!
//! Library code logs through the `log` facade; binaries and tests pick a
//! backend here, built on `env_logger`.
//!
//! # Log Levels
//!
//! - `warn!` - A chain was rejected (multi-input kernel, unexpected signature)
//! - `info!` - A kernel was fused or an invokable wrapped
//! - `debug!` - Planning and commit steps, bundle I/O
//! - `trace!` - Per-stage signatures, metadata extraction
//!
//! # Environment Variable
//!
//! ```bash
//! RUST_LOG=info kfuse fuse kernels.json --stage image:0 --stage image:1 --name fused
//! RUST_LOG=compiler::fusion=debug kfuse fuse ...
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging at Warn level. Later calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level.
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {}:{} - {}",
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from `RUST_LOG`, defaulting to Warn.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests. Safe to call from every test.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}

/// Whether `init`, `init_with_level` or `init_from_env` has run
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_is_idempotent() {
        init_test();
        init_test();
        log::warn!("rejected chain in test");
    }
}
