//! Logger initialization
//!
//! Library crates log through the `log` facade; only the daemon (and tests)
//! install an actual logger.

pub use log::{Level, LevelFilter};

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const CONSOLE_APPENDER: &str = "stdout";
const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{({l}):5.5}] {m}{n}";

fn console_config(level: LevelFilter) -> Config {
    let stdout = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build();
    Config::builder()
        .appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(stdout)))
        .build(Root::builder().appender(CONSOLE_APPENDER).build(level))
        .unwrap()
}

pub fn init_logger(filter: &str) {
    let level = filter.parse().unwrap_or(LevelFilter::Info);
    let _ = log4rs::init_config(console_config(level)).unwrap();
}

/// Tries to init the global logger, but does not panic if it was already setup.
/// Should be used for tests.
pub fn try_init_logger(filter: &str) {
    let level = filter.parse().unwrap_or(LevelFilter::Info);
    let _ = log4rs::init_config(console_config(level));
}
