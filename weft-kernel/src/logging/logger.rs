//! Kernel logging
//!
//! Provides logging infrastructure using the `log` crate.
//!
//! # Log output
//!
//! Log messages are written to:
//! 1. A lock-free ring buffer (for draining through a memory channel)
//! 2. A console sink, when the embedder installed one
//!
//! The console sink is a plain `fn(&str)` registered once at startup, so
//! the kernel core stays independent of any particular UART or host
//! stdout plumbing.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Once;

use crate::logging::buffer::{self, LogEntry};

/// Stack buffer for formatting log messages before pushing to the lock-free queue
struct MessageBuffer {
    data: [u8; buffer::LOG_ENTRY_CONTENT_SIZE],
    len: usize,
}

impl MessageBuffer {
    const fn new() -> Self {
        Self {
            data: [0u8; buffer::LOG_ENTRY_CONTENT_SIZE],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.data[..self.len]).unwrap_or("<invalid>")
    }
}

impl Write for MessageBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = buffer::LOG_ENTRY_CONTENT_SIZE - self.len;
        let to_copy = bytes.len().min(remaining);
        self.data[self.len..self.len + to_copy].copy_from_slice(&bytes[..to_copy]);
        self.len += to_copy;
        Ok(())
    }
}

/// Kernel logger implementation
struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

            // Format message into stack buffer (no locks!)
            let mut msg_buf = MessageBuffer::new();
            let _ = write!(msg_buf, "{}", record.args());

            let entry = LogEntry::new(seq, record.level(), record.target(), msg_buf.as_str());
            buffer::push(entry);

            if CONSOLE_ENABLED.load(Ordering::Acquire) {
                if let Some(console) = CONSOLE.get() {
                    let level_str = match record.level() {
                        Level::Error => "\x1b[31mERROR\x1b[0m",
                        Level::Warn => "\x1b[33m WARN\x1b[0m",
                        Level::Info => "\x1b[32m INFO\x1b[0m",
                        Level::Debug => "\x1b[34mDEBUG\x1b[0m",
                        Level::Trace => "\x1b[35mTRACE\x1b[0m",
                    };

                    let mut console_buf = MessageBuffer::new();
                    let _ = writeln!(
                        console_buf,
                        "[{:>8}] {} {}: {}",
                        seq,
                        level_str,
                        record.target(),
                        msg_buf.as_str()
                    );
                    console(console_buf.as_str());
                }
            }
        }
    }

    fn flush(&self) {}
}

/// Global logger instance
static LOGGER: KernelLogger = KernelLogger;

/// Monotonic stamp for ordering entries across the ring and the console
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

static CONSOLE: Once<fn(&str)> = Once::new();
static CONSOLE_ENABLED: AtomicBool = AtomicBool::new(true);

/// Initialise the logging system
///
/// Safe to call more than once; later calls keep the first logger and
/// only the first `set_max_level` takes effect.
pub fn init(filter: LevelFilter) {
    buffer::enable();

    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(filter))
        .ok();
}

/// Install the console sink. Only the first installation sticks.
pub fn set_console(console: fn(&str)) {
    CONSOLE.call_once(|| console);
}

/// Stop mirroring log lines to the console sink
///
/// Call this once a drain channel has taken over; entries then go to the
/// ring buffer only. Queued boot-era entries are dropped so the drain
/// does not replay lines the console already showed.
pub fn transition_to_drain() {
    CONSOLE_ENABLED.store(false, Ordering::Release);
    buffer::clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_buffer_accumulates_writes() {
        let mut buf = MessageBuffer::new();
        write!(buf, "vpe {} on pe {}", 3, 7).unwrap();
        assert_eq!(buf.as_str(), "vpe 3 on pe 7");
    }

    #[test]
    fn test_message_buffer_truncates_at_capacity() {
        let mut buf = MessageBuffer::new();
        for _ in 0..buffer::LOG_ENTRY_CONTENT_SIZE {
            write!(buf, "ab").unwrap();
        }
        assert_eq!(buf.as_str().len(), buffer::LOG_ENTRY_CONTENT_SIZE);
        assert!(buf.as_str().starts_with("ababab"));
    }
}
