use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use log::{LevelFilter, Log};

static LOG_INITIALIZED: AtomicBool = AtomicBool::new(false);
static LOGGER: StderrLogger = StderrLogger {
    lock: Mutex::new(()),
};

/// Installs the logger. `WS281X_LOG` overrides `max_level`.
pub fn init(max_level: LevelFilter) {
    let already_initialized = LOG_INITIALIZED.swap(true, Ordering::SeqCst);

    if !already_initialized {
        if let Err(e) = log::set_logger(&LOGGER) {
            eprintln!("Unable to set logger: {}", e);
        }

        let max_level = std::env::var("WS281X_LOG")
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(max_level);
        log::set_max_level(max_level);
    }
}

struct StderrLogger {
    lock: Mutex<()>,
}

impl Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        critical_section::with(|cs| {
            let _guard = self.lock.borrow(cs);
            let color = match record.level() {
                log::Level::Error => "31",
                log::Level::Warn => "33",
                log::Level::Info => "39",
                log::Level::Debug => "38;5;243",
                log::Level::Trace => "38;5;19",
            };
            let _ = writeln!(
                std::io::stderr().lock(),
                "\x1b[{}m[{}] {}\x1b[0m",
                color,
                record.target(),
                record.args()
            );
        })
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
