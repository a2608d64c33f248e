//! Injected diagnostics sink: diagnostics go through a caller-supplied
//! logger rather than writing to stdout/stderr.
//!
//! No `log` or `tracing` dependency here; platform concerns are threaded
//! through caller-supplied trait objects the same way the VFS layer is, and
//! `Logger` follows that shape instead of reaching for an external logging
//! facade.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink for engine diagnostics. The default [`NullLogger`] discards
/// everything; callers that want output wire up their own implementation
/// (to `log`/`tracing`, a file, stderr, whatever fits their application).
pub trait Logger: Send {
    fn log(&mut self, level: Level, message: &dyn fmt::Display);
}

#[derive(Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&mut self, _level: Level, _message: &dyn fmt::Display) {}
}

macro_rules! log_at {
    ($name:ident, $level:expr) => {
        #[allow(unused)]
        pub(crate) fn $name(logger: &mut dyn Logger, message: impl fmt::Display) {
            logger.log($level, &message);
        }
    };
}

log_at!(debug, Level::Debug);
log_at!(info, Level::Info);
log_at!(warn, Level::Warn);
log_at!(error, Level::Error);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<String>>>);
    impl Logger for Recording {
        fn log(&mut self, level: Level, message: &dyn fmt::Display) {
            self.0.lock().unwrap().push(format!("{level:?}: {message}"));
        }
    }

    #[test]
    fn null_logger_discards() {
        let mut l = NullLogger;
        info(&mut l, "ignored");
    }

    #[test]
    fn custom_logger_records() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let mut l = Recording(buf.clone());
        warn(&mut l, "careful");
        assert_eq!(buf.lock().unwrap().len(), 1);
    }
}
