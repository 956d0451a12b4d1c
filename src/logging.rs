//! Logger setup for hosts and the render CLI.
//!
//! The library itself only talks to the `log` facade; this module installs an
//! `env_logger` backend that writes exactly one line per record.

pub use crate::core::config::LogMode;

/// Installs the global logger. `RUST_LOG` overrides the default `info`
/// filter unless the mode is [`LogMode::None`]. Calling it twice is harmless.
#[cfg(feature = "debug")]
pub fn init(mode: LogMode) {
    if builder(mode).try_init().is_err() {
        log::debug!("Logger already initialised");
    }
}

/// Logger configuration for `mode`; `LogMode::None` ignores `RUST_LOG`
/// entirely.
#[cfg(feature = "debug")]
fn builder(mode: LogMode) -> env_logger::Builder {
    use std::io::Write;

    use env_logger::{Builder, Env};
    use log::LevelFilter;

    if mode == LogMode::None {
        let mut builder = Builder::new();
        builder.filter_level(LevelFilter::Off);
        return builder;
    }

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    match mode {
        LogMode::Full => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{} {} [{}:{}] {}",
                    buf.timestamp_millis(),
                    record.level(),
                    record.module_path().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            });
        }
        LogMode::Light => {
            builder.format(|buf, record| writeln!(buf, "{}", record.args()));
        }
        LogMode::None => {}
    }
    builder
}

/// Without the `debug` feature only the level filter is honoured.
#[cfg(not(feature = "debug"))]
pub fn init(mode: LogMode) {
    if mode == LogMode::None {
        log::set_max_level(log::LevelFilter::Off);
    }
}
