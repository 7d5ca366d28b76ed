//! Console backend for the `log` facade.
//!
//! On wasm every record goes to the matching `console.*` method; on the host
//! target (tests, tooling) it falls back to stderr.

use log::{Level, LevelFilter, Log, Metadata, Record};

pub struct ConsoleLogger {
    level: LevelFilter,
}

static LOGGER: ConsoleLogger = ConsoleLogger {
    level: LevelFilter::Trace,
};

/// Install the console logger. Later calls only adjust the max level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Init logging and, when the feature is on, the readable panic hook.
pub fn init_runtime(test_mode: bool) {
    init(if test_mode {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[wc-stripe] {}: {}", record.target(), record.args());
        write_line(record.level(), &line);
    }

    fn flush(&self) {}
}

#[cfg(target_arch = "wasm32")]
fn write_line(level: Level, line: &str) {
    let value = wasm_bindgen::JsValue::from_str(line);
    match level {
        Level::Error => web_sys::console::error_1(&value),
        Level::Warn => web_sys::console::warn_1(&value),
        Level::Info => web_sys::console::info_1(&value),
        Level::Debug | Level::Trace => web_sys::console::debug_1(&value),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn write_line(level: Level, line: &str) {
    eprintln!("[{}] {}", level, line);
}
