use std::io::stderr;
use std::io::Write;
use std::sync::OnceLock;

use log::LevelFilter;
use log::Log;
use log::Metadata;
use log::Record;
use log::SetLoggerError;

pub struct Logger;

impl Logger {
    pub fn init(verbose: bool) -> Result<(), SetLoggerError> {
        let max_level = if verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Warn
        };
        log::set_logger(LOGGER.get_or_init(|| Logger)).map(|()| log::set_max_level(max_level))
    }
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let mut stderr = stderr().lock();
        let _ = writeln!(stderr, "{} {}", record.level(), record.args());
    }

    fn flush(&self) {
        let _ = stderr().flush();
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();
