//! Application shell: a [`ModuleSystem`] with the [`Tasks`] service already
//! registered.

use alloc::rc::Rc;

use log::{error, info};

use crate::config::AppConfig;
use crate::logger::{Logger, MemoryLogger};
use crate::system::{Module, ModuleId, ModuleSystem, SystemError};
use crate::tasks::Tasks;
use crate::time::{Clock, Millis};

pub struct App {
    system: ModuleSystem,
    tasks: Rc<Tasks>,
    config: AppConfig,
    memory_log: Option<Rc<MemoryLogger>>,
}

impl App {
    /// Build an app logging to the sink named by `config.log_kind`.
    pub fn new(config: AppConfig, clock: Rc<dyn Clock>) -> Result<Self, SystemError> {
        let (logger, memory_log) = config.log_kind.logger();
        let mut app = Self::with_logger(config, clock, logger)?;
        app.memory_log = memory_log;
        Ok(app)
    }

    pub fn with_logger(
        config: AppConfig,
        clock: Rc<dyn Clock>,
        logger: Rc<dyn Logger>,
    ) -> Result<Self, SystemError> {
        let mut system = ModuleSystem::new(logger.clone(), config.reserve_modules);
        let tasks = Tasks::new(config.reserve_tasks, clock, logger);
        tasks.module().register(&mut system)?;
        Ok(Self {
            system,
            tasks,
            config,
            memory_log: None,
        })
    }

    pub fn register(&mut self, module: Module) -> Result<ModuleId, SystemError> {
        module.register(&mut self.system)
    }

    /// Link, init and start every registered module.
    pub fn setup(&mut self) -> Result<(), SystemError> {
        match self.system.setup() {
            Ok(()) => {
                info!("App started: {:?}", self.system.sorted_names());
                Ok(())
            }
            Err(e) => {
                error!("App setup failed: {}", e);
                Err(e)
            }
        }
    }

    /// One pass over every update callback, due tasks included.
    pub fn loop_once(&mut self) -> Result<usize, SystemError> {
        self.system.update()
    }

    pub fn tasks(&self) -> &Rc<Tasks> {
        &self.tasks
    }

    pub fn system(&self) -> &ModuleSystem {
        &self.system
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn logger(&self) -> &Rc<dyn Logger> {
        self.system.logger()
    }

    /// Retained diagnostics when built with [`LogKind::Memory`].
    ///
    /// [`LogKind::Memory`]: crate::config::LogKind::Memory
    pub fn memory_log(&self) -> Option<&Rc<MemoryLogger>> {
        self.memory_log.as_ref()
    }

    pub fn now(&self) -> Millis {
        self.tasks.now()
    }

    pub fn is_ok(&self) -> bool {
        self.system.is_ok()
    }
}
