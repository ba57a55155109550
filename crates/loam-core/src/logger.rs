//! Diagnostic text sinks.
//!
//! The module system and task service report setup failures and dropped
//! callbacks through a [`Logger`]. Applications choose where those lines end
//! up: nowhere, the `log` facade, or an in-memory buffer.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::{self, Write};

use crate::ring::RingQueue;

/// Longest line [`Logger::logf`] will emit. Longer output is truncated.
pub const LINE_CAPACITY: usize = 512;

/// Lines a [`MemoryLogger::new`] keeps before dropping the oldest.
pub const MEMORY_LINES: usize = 32;

/// A sink that accepts one formatted line at a time.
pub trait Logger {
    fn log(&self, line: &str);

    /// Format into a fixed line buffer and forward it to [`Logger::log`].
    fn logf(&self, args: fmt::Arguments<'_>) {
        let mut line = LineBuffer::default();
        // Overflow only truncates the line.
        let _ = line.write_fmt(args);
        self.log(line.0.as_str());
    }
}

#[derive(Default)]
struct LineBuffer(heapless::String<LINE_CAPACITY>);

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            self.0.push(c).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

/// Discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _line: &str) {}
}

/// Forwards lines to the `log` crate at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, line: &str) {
        log::info!("{}", line);
    }
}

/// Keeps the most recent lines in memory, dropping the oldest once full.
#[derive(Debug)]
pub struct MemoryLogger {
    lines: RefCell<RingQueue<String>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_LINES)
    }

    pub fn with_capacity(lines: usize) -> Self {
        Self {
            lines: RefCell::new(RingQueue::with_capacity(lines)),
        }
    }

    /// A copy of the retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lines.borrow().capacity()
    }

    /// Number of retained lines exactly equal to `line`.
    pub fn count(&self, line: &str) -> usize {
        self.lines.borrow().iter().filter(|l| *l == line).count()
    }

    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, line: &str) {
        let _ = self.lines.borrow_mut().push_back(line.to_string());
    }
}
