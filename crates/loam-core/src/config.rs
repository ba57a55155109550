use alloc::rc::Rc;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::logger::{LogFacade, Logger, MemoryLogger, NullLogger};

/// Where diagnostic lines from the module system and task service go.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Discard.
    #[default]
    None,
    /// Forward to the `log` crate.
    Facade,
    /// Keep the most recent `lines` in memory.
    Memory { lines: u16 },
}

impl LogKind {
    /// Build the sink. The memory sink is also returned typed so its owner
    /// can read it back.
    pub fn logger(self) -> (Rc<dyn Logger>, Option<Rc<MemoryLogger>>) {
        match self {
            LogKind::None => (Rc::new(NullLogger), None),
            LogKind::Facade => (Rc::new(LogFacade), None),
            LogKind::Memory { lines } => {
                let memory = Rc::new(MemoryLogger::with_capacity(usize::from(lines)));
                (memory.clone(), Some(memory))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to encode config: {0}")]
    Encode(postcard::Error),
    #[error("Failed to decode config: {0}")]
    Decode(postcard::Error),
}

/// Capacity and logging choices fixed at startup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    /// Most modules the system accepts, the task service included.
    pub reserve_modules: usize,
    /// Most tasks queued at once.
    pub reserve_tasks: usize,
    pub log_kind: LogKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reserve_modules: 8,
            reserve_tasks: 16,
            log_kind: LogKind::None,
        }
    }
}

impl AppConfig {
    pub fn with_reserve_modules(mut self, reserve_modules: usize) -> Self {
        self.reserve_modules = reserve_modules;
        self
    }

    pub fn with_reserve_tasks(mut self, reserve_tasks: usize) -> Self {
        self.reserve_tasks = reserve_tasks;
        self
    }

    pub fn with_log_kind(mut self, log_kind: LogKind) -> Self {
        self.log_kind = log_kind;
        self
    }

    /// Encode for storage in flash.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(ConfigError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(ConfigError::Decode)
    }
}
