use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_PORT: u16 = 3742;
pub const DEFAULT_SWEEP_SECS: u64 = 300;

/// Server settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// `None` disables the background sweep.
    pub sweep_interval: Option<Duration>,
    /// Sweep before serving `GET /api/tasks`.
    pub sweep_on_read: bool,
}

impl ServerConfig {
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            debug: false,
            sweep_interval: sweep_interval(DEFAULT_SWEEP_SECS),
            sweep_on_read: true,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Zero seconds turns the background sweep off.
pub fn sweep_interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".gtd").join("gtd.db"))
}

/// Use the explicit path if given, else `$HOME/.gtd/gtd.db`.
pub fn resolve_db_path(cli_db: Option<String>) -> Result<String> {
    match cli_db {
        Some(p) => Ok(p),
        None => {
            let path = default_db_path()?;
            Ok(path
                .to_str()
                .context("default DB path is not valid UTF-8")?
                .to_string())
        }
    }
}

/// Dependencies log at info. The debug flag raises only this crate to debug.
fn log_builder(debug: bool) -> env_logger::Builder {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Info)
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .format_timestamp_millis();
    builder
}

/// `RUST_LOG` overrides the defaults.
pub fn init_logging(debug: bool) {
    log_builder(debug).parse_default_env().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_db_path_wins() {
        let path = resolve_db_path(Some("/tmp/x.db".into())).unwrap();
        assert_eq!(path, "/tmp/x.db");
    }

    #[test]
    fn default_db_path_under_home() {
        if std::env::var("HOME").is_ok() {
            let path = resolve_db_path(None).unwrap();
            assert!(path.ends_with(".gtd/gtd.db"), "unexpected path: {path}");
        }
    }

    #[test]
    fn zero_interval_disables_sweep() {
        assert!(sweep_interval(0).is_none());
        assert_eq!(sweep_interval(60), Some(Duration::from_secs(60)));
    }

    fn enabled(logger: &env_logger::Logger, target: &str, level: log::Level) -> bool {
        use log::Log;
        logger.enabled(&log::Metadata::builder().target(target).level(level).build())
    }

    #[test]
    fn debug_flag_scoped_to_crate() {
        let logger = log_builder(true).build();
        assert!(enabled(&logger, "gtd::server", log::Level::Debug));
        assert!(!enabled(&logger, "hyper::proto", log::Level::Debug));
        assert!(enabled(&logger, "hyper::proto", log::Level::Info));

        let quiet = log_builder(false).build();
        assert!(!enabled(&quiet, "gtd::server", log::Level::Debug));
        assert!(enabled(&quiet, "gtd::server", log::Level::Info));
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::new("gtd.db".into());
        assert_eq!(config.addr(), "0.0.0.0:3742");
        assert!(config.sweep_on_read);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(300)));
    }
}
