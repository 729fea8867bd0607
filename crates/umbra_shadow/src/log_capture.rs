//! Capturing of warnings emitted during tests.

use std::{cell::RefCell, sync::Once};
use umbra_log::{Level, LevelFilter, Log, Metadata, Record};

thread_local! {
    static CAPTURED_WARNINGS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Records warnings emitted on the current thread, so that tests running in
/// parallel do not see each other's warnings.
#[derive(Debug)]
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            CAPTURED_WARNINGS
                .with(|warnings| warnings.borrow_mut().push(record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

/// Runs the given closure and returns its result along with every warning it
/// emitted on the current thread.
pub(crate) fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    static INSTALL_LOGGER: Once = Once::new();
    static LOGGER: CaptureLogger = CaptureLogger;

    INSTALL_LOGGER.call_once(|| {
        if umbra_log::set_logger(&LOGGER).is_ok() {
            umbra_log::set_max_level(LevelFilter::Warn);
        }
    });

    CAPTURED_WARNINGS.with(|warnings| warnings.borrow_mut().clear());
    let result = f();
    let warnings = CAPTURED_WARNINGS.with(|warnings| warnings.take());
    (result, warnings)
}
