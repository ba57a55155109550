//! Hand-off from interrupt handlers to the cooperative loop.
//!
//! An interrupt handler only calls [`WakeQueue::raise`] with its pin number.
//! The [`InterruptRouter`] module drains the wake queue on every update pass
//! and queues the task registered for each pin on the [`Tasks`] service, so
//! routed callbacks always run from the main loop.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use core::cell::RefCell;

use critical_section::Mutex;
use log::debug;

use crate::logger::Logger;
use crate::ring::StaticRingQueue;
use crate::system::Module;
use crate::tasks::{Task, TaskId, Tasks};

/// Interrupt source number, usually the GPIO number.
pub type PinId = u8;

/// Something the router can drain pending wake events from.
pub trait WakeSource {
    fn take(&self) -> Option<PinId>;
}

/// Bounded FIFO of pending wake events, safe to fill from interrupt context.
///
/// A pin already pending is not queued twice. Declare it as a `static` and
/// share it between the handler and the router.
pub struct WakeQueue<const N: usize> {
    pending: Mutex<RefCell<StaticRingQueue<PinId, N>>>,
}

impl<const N: usize> WakeQueue<N> {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(RefCell::new(StaticRingQueue::new())),
        }
    }

    /// Record a wake for `pin`. Returns `false` if it was already pending or
    /// the queue is full.
    pub fn raise(&self, pin: PinId) -> bool {
        critical_section::with(|cs| {
            let mut pending = self.pending.borrow_ref_mut(cs);
            if pending.is_full() || pending.iter().any(|&queued| queued == pin) {
                return false;
            }
            pending.push_back(pin).is_none()
        })
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.pending.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> Default for WakeQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> WakeSource for WakeQueue<N> {
    fn take(&self) -> Option<PinId> {
        critical_section::with(|cs| self.pending.borrow_ref_mut(cs).pop_front())
    }
}

/// Routes pin wake events to tasks. One task per pin.
pub struct InterruptRouter {
    wakes: &'static dyn WakeSource,
    routes: RefCell<BTreeMap<PinId, Task>>,
    tasks: RefCell<Option<Rc<Tasks>>>,
    logger: Rc<dyn Logger>,
}

impl InterruptRouter {
    pub const NAME: &'static str = "interrupts";

    pub fn new(wakes: &'static dyn WakeSource, logger: Rc<dyn Logger>) -> Rc<Self> {
        Rc::new(Self {
            wakes,
            routes: RefCell::new(BTreeMap::new()),
            tasks: RefCell::new(None),
            logger,
        })
    }

    /// Run `task` whenever `pin` wakes. Replaces any earlier route for the
    /// pin and returns it.
    pub fn route(&self, pin: PinId, task: Task) -> Option<Task> {
        let previous = self.routes.borrow_mut().insert(pin, task);
        if previous.is_some() {
            self.logger
                .logf(format_args!("Interrupt route for pin {} replaced.", pin));
        }
        previous
    }

    pub fn unroute(&self, pin: PinId) -> bool {
        // Release the table before the task drops.
        let removed = self.routes.borrow_mut().remove(&pin);
        removed.is_some()
    }

    pub fn is_routed(&self, pin: PinId) -> bool {
        self.routes.borrow().contains_key(&pin)
    }

    /// Module that binds the router to the task service and drains wakes on
    /// every update pass.
    pub fn module(self: &Rc<Self>) -> Module {
        let linker = self.clone();
        let dispatcher = self.clone();
        Module::new(Self::NAME)
            .depends_on(Tasks::NAME)
            .with_handle(self.clone())
            .on_link(move |modules| match Tasks::get(modules) {
                Some(tasks) => {
                    *linker.tasks.borrow_mut() = Some(tasks);
                    true
                }
                None => false,
            })
            .on_update(move || {
                let _ = dispatcher.dispatch();
            })
    }

    /// Drain pending wakes and queue the routed tasks. Returns how many were
    /// queued.
    pub fn dispatch(&self) -> usize {
        let Some(tasks) = self.tasks.borrow().clone() else {
            return 0;
        };
        let mut queued = 0;
        while let Some(pin) = self.wakes.take() {
            let route = self.routes.borrow().get(&pin).cloned();
            match route {
                Some(task) => {
                    if tasks.run_in(0, task, TaskId::ANONYMOUS).is_ok() {
                        queued += 1;
                    }
                }
                None => debug!("Wake on unrouted pin {}", pin),
            }
        }
        queued
    }
}
