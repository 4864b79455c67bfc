//! Logging facilities
//!
//! Plain text lines on standard error. Verbosity (`-v`, `-vv`) raises the
//! level from info through trace.

use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Logger, Root},
    encode::pattern::PatternEncoder,
};

pub fn init(bin_name: &str, verbosity: u8) {
    let pattern = "{d(%Y-%m-%d %H:%M:%S)} {h({l}):<5} {m}{n}";

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .target(Target::Stderr)
        .build();

    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .logger(Logger::builder().build(bin_name, level))
        .logger(Logger::builder().build("hopper", level))
        .build(Root::builder().appender("console").build(level))
        .expect("logging config");

    log4rs::init_config(config).expect("logging");
}
