use crate::config::DEFAULT_LOG_LEVEL;
use log::LevelFilter;
use std::io::Write;

/// Install the process-wide logger with timestamped output.
///
/// An explicit `level` (for example from the command line) wins over
/// `RUST_LOG`; without one, `RUST_LOG` is honoured and falls back to
/// [`DEFAULT_LOG_LEVEL`]. Calling this more than once is harmless.
pub fn init(level: Option<&str>) {
    let mut builder = env_logger::Builder::new();

    // webrtc's internals are chatty at debug
    builder.filter_module("webrtc", LevelFilter::Warn);
    builder.parse_filters(DEFAULT_LOG_LEVEL);

    match level {
        Some(level) => {
            builder.parse_filters(level);
        }
        None => {
            if let Ok(filters) = std::env::var("RUST_LOG") {
                builder.parse_filters(&filters);
            }
        }
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] {:<5} {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    // a test harness or embedding application may have installed one already
    let _ = builder.try_init();
}
