use chrono::Local;
use env_logger::{Builder, Env};
use log::SetLoggerError;
use std::io::Write;

/// Installs the process-wide logger. `RUST_LOG` overrides the default `info` level.
pub fn init_logger() -> Result<(), SetLoggerError> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
}
