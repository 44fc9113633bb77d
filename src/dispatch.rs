// SPDX-License-Identifier: MIT OR Apache-2.0

//! Narration of trackwise's own bookkeeping.
//!
//! A component narrates to the [`Logger`] it was built with.  Without one it narrates
//! through logwise's macros, so records reach logwise's global loggers and follow
//! logwise's level rules:
//!
//! | Narration                        | Level           |
//! |----------------------------------|-----------------|
//! | lifecycle of calls and operations | `debuginternal` |
//! | futures and operations dropped early | `info`       |
//! | misuse, isolated listener panics | `warning`       |
//!
//! `debuginternal` narration is compiled out of release builds and, in debug builds,
//! is off unless the `logwise_internal` feature is on or the current logwise context
//! is tracing.  A logger passed explicitly receives every record.

use logwise::{Level, LogRecord, Logger};
use std::sync::Arc;

/// Where a component's narration goes.
#[derive(Debug, Clone, Default)]
pub(crate) struct Narrator {
    logger: Option<Arc<dyn Logger>>,
}

impl Narrator {
    pub(crate) fn new(logger: Option<Arc<dyn Logger>>) -> Self {
        Narrator { logger }
    }

    pub(crate) fn internal<M: FnOnce() -> String>(&self, origin: &str, message: M) {
        match &self.logger {
            Some(logger) => deliver(&**logger, Level::DebugInternal, "DEBUG: ", origin, message()),
            None => {
                logwise::debuginternal_sync!("{origin}: {message}", origin = origin, message = message());
            }
        }
    }

    pub(crate) fn info<M: FnOnce() -> String>(&self, origin: &str, message: M) {
        match &self.logger {
            Some(logger) => deliver(&**logger, Level::Info, "INFO: ", origin, message()),
            None => {
                logwise::info_sync!("{origin}: {message}", origin = origin, message = message());
            }
        }
    }

    pub(crate) fn warn<M: FnOnce() -> String>(&self, origin: &str, message: M) {
        match &self.logger {
            Some(logger) => deliver(&**logger, Level::Warning, "WARN: ", origin, message()),
            None => {
                logwise::warn_sync!("{origin}: {message}", origin = origin, message = message());
            }
        }
    }
}

fn deliver(logger: &dyn Logger, level: Level, prefix: &str, origin: &str, message: String) {
    let mut record = LogRecord::new(level);
    record.log(prefix);
    record.log(origin);
    record.log(": ");
    record.log_owned(message);
    logger.finish_log_record(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use logwise::InMemoryLogger;

    #[test]
    fn explicit_logger_receives_every_level() {
        let logger = Arc::new(InMemoryLogger::new());
        let narrator = Narrator::new(Some(logger.clone()));
        narrator.internal("test", || "detail".to_string());
        narrator.info("test", || "notice".to_string());
        narrator.warn("test", || "careful".to_string());
        assert_eq!(
            logger.drain_logs(),
            "DEBUG: test: detail\nINFO: test: notice\nWARN: test: careful"
        );
    }

    #[test]
    fn global_narration_does_not_touch_an_explicit_logger() {
        let logger = Arc::new(InMemoryLogger::new());
        let _unused = Narrator::new(Some(logger.clone()));
        Narrator::default().warn("test", || "to the global loggers".to_string());
        assert_eq!(logger.drain_logs(), "");
    }
}
