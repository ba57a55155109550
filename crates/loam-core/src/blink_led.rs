//! Blinking status LED driven by the task service.

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};

use embedded_hal::digital::{Error as _, OutputPin};
use log::warn;

use crate::system::Module;
use crate::tasks::{TaskScheduler, Tasks, task};
use crate::time::Millis;

/// An LED that can be switched or blinked a number of times.
///
/// Active-low by default, as on most dev boards. The off time defaults to
/// the on time.
pub struct BlinkLed<P: OutputPin + 'static> {
    inner: Rc<BlinkInner<P>>,
}

struct BlinkInner<P> {
    name: &'static str,
    pin: RefCell<P>,
    on_msec: Millis,
    off_msec: Cell<Millis>,
    active_low: Cell<bool>,
    is_on: Cell<bool>,
    remaining: Cell<u8>,
    scheduler: RefCell<TaskScheduler>,
}

impl<P: OutputPin + 'static> BlinkLed<P> {
    pub fn new(name: &'static str, pin: P, on_msec: Millis) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<BlinkInner<P>>| {
            let weak = weak.clone();
            BlinkInner {
                name,
                pin: RefCell::new(pin),
                on_msec,
                off_msec: Cell::new(on_msec),
                active_low: Cell::new(true),
                is_on: Cell::new(false),
                remaining: Cell::new(0),
                scheduler: RefCell::new(TaskScheduler::unbound(task(move || {
                    if let Some(led) = weak.upgrade() {
                        led.step();
                    }
                }))),
            }
        });
        Self { inner }
    }

    /// Drive the pin high to light the LED.
    pub fn active_high(self) -> Self {
        self.inner.active_low.set(false);
        self
    }

    pub fn with_off_msec(self, off_msec: Millis) -> Self {
        self.inner.off_msec.set(off_msec);
        self
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn on(&self) {
        self.inner.set(true);
    }

    pub fn off(&self) {
        self.inner.set(false);
    }

    pub fn is_on(&self) -> bool {
        self.inner.is_on.get()
    }

    /// Flash `count` times starting now.
    pub fn blink(&self, count: u8) {
        self.inner.remaining.set(count);
        if count == 0 {
            return;
        }
        self.inner.set(true);
        let _ = self.inner.scheduler.borrow().run_in(self.inner.on_msec);
    }

    /// Flash `count` times starting `delay` milliseconds from now.
    pub fn delayed_blink(&self, delay: Millis, count: u8) {
        self.inner.remaining.set(count);
        if count == 0 {
            return;
        }
        self.inner.set(false);
        let _ = self.inner.scheduler.borrow().run_in(delay);
    }

    /// Cancel any blinking in progress and turn off.
    pub fn stop(&self) {
        self.inner.remaining.set(0);
        let _ = self.inner.scheduler.borrow().cancel();
        self.inner.set(false);
    }

    /// Module that binds the LED to the task service and turns it off on
    /// init.
    pub fn module(&self) -> Module {
        let linker = self.inner.clone();
        let init = self.inner.clone();
        Module::new(self.inner.name)
            .depends_on(Tasks::NAME)
            .on_link(move |modules| match Tasks::get(modules) {
                Some(tasks) => {
                    linker.scheduler.borrow_mut().set_tasks(&tasks);
                    true
                }
                None => false,
            })
            .on_init(move || init.set(false))
    }
}

impl<P: OutputPin> BlinkInner<P> {
    fn set(&self, on: bool) {
        self.is_on.set(on);
        let high = on != self.active_low.get();
        let mut pin = self.pin.borrow_mut();
        let result = if high { pin.set_high() } else { pin.set_low() };
        if let Err(e) = result {
            warn!("LED '{}' pin write failed: {:?}", self.name, e.kind());
        }
    }

    fn step(&self) {
        if self.is_on.get() {
            self.set(false);
            let remaining = self.remaining.get().saturating_sub(1);
            self.remaining.set(remaining);
            if remaining > 0 {
                let _ = self.scheduler.borrow().run_in(self.off_msec.get());
            }
        } else {
            self.set(true);
            let _ = self.scheduler.borrow().run_in(self.on_msec);
        }
    }
}
