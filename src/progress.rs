use std::io::{self, Write};
use std::time::Instant;

use anyhow::anyhow;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Stderr logger with elapsed-time stamps. Installed once by the binary.
pub struct ConsoleProgress {
    level: LevelFilter,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            t0: Instant::now(),
        }
    }

    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => LevelFilter::Off,
            (false, true) => LevelFilter::Debug,
            (false, false) => LevelFilter::Info,
        };
        Self::new(level)
    }

    /// Route the `log` macros here. Fails if a logger is already set.
    pub fn install(self) -> anyhow::Result<&'static ConsoleProgress> {
        let level = self.level;
        let logger: &'static ConsoleProgress = Box::leak(Box::new(self));
        log::set_logger(logger).map_err(|e| anyhow!("install logger: {e}"))?;
        log::set_max_level(level);
        Ok(logger)
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if self.level < Level::Info {
            return;
        }
        self.emit(&format!("{:<5} {}", Level::Info, msg.as_ref()));
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if self.level < Level::Info {
            return;
        }
        let total = total.max(1);
        let current = current.min(total);
        let pct = (current as f64 / total as f64) * 100.0;
        self.emit(&format!("{:<5} {label} {current}/{total} ({pct:5.1}%)", Level::Info));
    }

    fn emit(&self, line: &str) {
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {line}");
    }
}

impl Log for ConsoleProgress {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.emit(&format!("{:<5} {}", record.level(), record.args()));
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_format() {
        assert_eq!(fmt_elapsed(5.4), "00:05");
        assert_eq!(fmt_elapsed(125.0), "02:05");
        assert_eq!(fmt_elapsed(3725.0), "01:02:05");
        assert_eq!(fmt_elapsed(-1.0), "00:00");
    }

    #[test]
    fn flags_pick_level() {
        let meta = |level| Metadata::builder().level(level).build();
        let quiet = ConsoleProgress::from_flags(true, true);
        assert!(!quiet.enabled(&meta(Level::Error)));
        let normal = ConsoleProgress::from_flags(false, false);
        assert!(normal.enabled(&meta(Level::Info)));
        assert!(!normal.enabled(&meta(Level::Debug)));
        let verbose = ConsoleProgress::from_flags(true, false);
        assert!(verbose.enabled(&meta(Level::Debug)));
    }
}
