// src/utils/logging.rs
//! Log setup for the daemon and the one-shot commands
//!
//! The long-running `run` daemon logs at Info so the watchdog and
//! supervisor lines stay readable over days of uptime; the one-shot
//! `profit` command defaults to Debug so a single invocation shows the
//! price-fetch and ranking detail. Both share the
//! `[ts LEVEL module:line] msg` line format and defer to `RUST_LOG`
//! when it is set.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging for the long-running daemon
///
/// Info by default; supervisor, watchdog, and auto-switch activity all
/// land at Info or above, so a default run stays quiet between events.
pub fn init_logging() {
    common_log_config().filter(None, LevelFilter::Info).init();
}

/// Initializes logging for one-shot diagnostic commands
///
/// Same format as the daemon logger, but defaults to Debug when
/// `RUST_LOG` is unset so a single `profit` run prints its workings.
pub fn init_verbose_logging() {
    let mut builder = common_log_config();

    // Set default to debug level if RUST_LOG not configured
    if env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.parse_env("RUST_LOG");
    }

    builder.init();
}

/// Base builder shared by both entry points
///
/// Formats every record as `[ts LEVEL module:line] msg` with a
/// seconds-since-epoch timestamp and writes to stdout.
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let level = record.level();
            let module = record.module_path().unwrap_or_default();
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                ts,
                level,
                module,
                line,
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
