//! Desktop simulator for loam modules.
//!
//! Runs a small application against the host clock so the module system and
//! task service can be exercised without hardware:
//!
//! | Module       | Behaviour                                        |
//! |--------------|--------------------------------------------------|
//! | `sensor`     | Synthetic temperature sampled every 500 ms       |
//! | `publisher`  | Depends on `sensor`, logs the reading every 2 s  |
//! | `status`     | Blinking LED on a fake pin                       |
//! | `interrupts` | Routes the simulated button to a blink burst     |
//!
//! A background thread stands in for the button interrupt and raises a wake
//! event every few seconds. Run with `RUST_LOG=info` (or `debug`).

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embedded_hal::digital::{ErrorType, OutputPin};
use log::{error, info};

use loam_core::blink_led::BlinkLed;
use loam_core::interrupts::{InterruptRouter, PinId, WakeQueue};
use loam_core::tasks::PeriodicTaskScheduler;
use loam_core::{App, AppConfig, Clock, LogKind, Millis, Module, SystemError, Tasks, task};

/// How long the simulation runs before exiting.
const SIM_DURATION: Duration = Duration::from_secs(10);

/// Pause between loop passes.
const LOOP_INTERVAL: Duration = Duration::from_millis(1);

const SAMPLE_PERIOD_MS: Millis = 500;
const PUBLISH_PERIOD_MS: Millis = 2_000;

/// Interval between simulated button presses.
const BUTTON_PERIOD: Duration = Duration::from_millis(3_700);
const BUTTON_PIN: PinId = 0;

static WAKES: WakeQueue<4> = WakeQueue::new();

// ---------------------------------------------------------------------------
// Host stand-ins for hardware
// ---------------------------------------------------------------------------

/// Milliseconds since the simulator started, wrapping like the hardware timer.
struct StdClock {
    start: Instant,
}

impl Clock for StdClock {
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

/// Output pin that logs its level.
struct SimPin {
    label: &'static str,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        info!("{}: low", self.label);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        info!("{}: high", self.label);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Demo modules
// ---------------------------------------------------------------------------

/// Synthetic temperature sensor.
#[derive(Default)]
struct Sensor {
    reading: Cell<f32>,
    samples: Cell<u32>,
}

impl Sensor {
    const NAME: &'static str = "sensor";

    fn sample(&self) {
        let n = self.samples.get() + 1;
        let t = n as f32 * SAMPLE_PERIOD_MS as f32 / 1000.0;
        self.reading.set(23.0 + 3.0 * (t / 12.0).sin());
        self.samples.set(n);
    }
}

/// Bind `periodic` to the task service during link and start it on start.
fn periodic_module(name: &'static str, periodic: &Rc<PeriodicTaskScheduler>) -> Module {
    let (linker, starter) = (periodic.clone(), periodic.clone());
    Module::new(name)
        .depends_on(Tasks::NAME)
        .on_link(move |modules| match Tasks::get(modules) {
            Some(tasks) => {
                linker.set_tasks(&tasks);
                true
            }
            None => false,
        })
        .on_start(move || {
            let _ = starter.start();
        })
}

struct Demo {
    sensor: Rc<Sensor>,
    _sampler: Rc<PeriodicTaskScheduler>,
    _publisher: Rc<PeriodicTaskScheduler>,
    _led: Rc<BlinkLed<SimPin>>,
    _router: Rc<InterruptRouter>,
}

fn build(app: &mut App) -> Result<Demo, SystemError> {
    // Registered out of dependency order on purpose.
    let latest: Rc<RefCell<Option<Rc<Sensor>>>> = Rc::default();
    let source = latest.clone();
    let publisher = Rc::new(PeriodicTaskScheduler::unbound(
        PUBLISH_PERIOD_MS,
        PUBLISH_PERIOD_MS,
        task(move || {
            if let Some(sensor) = source.borrow().as_ref() {
                info!(
                    "publish: {:.2} C after {} samples",
                    sensor.reading.get(),
                    sensor.samples.get()
                );
            }
        }),
    ));
    app.register(
        periodic_module("publisher", &publisher)
            .depends_on(Sensor::NAME)
            .on_link(move |modules| {
                *latest.borrow_mut() = modules.get::<Sensor>(Sensor::NAME);
                latest.borrow().is_some()
            }),
    )?;

    let sensor = Rc::new(Sensor::default());
    let sampled = sensor.clone();
    let sampler = Rc::new(PeriodicTaskScheduler::unbound(
        0,
        SAMPLE_PERIOD_MS,
        task(move || sampled.sample()),
    ));
    app.register(periodic_module(Sensor::NAME, &sampler).with_handle(sensor.clone()))?;

    let led = Rc::new(BlinkLed::new("status", SimPin { label: "status led" }, 150).with_off_msec(100));
    app.register(led.module())?;

    let router = InterruptRouter::new(&WAKES, app.logger().clone());
    let blinker = led.clone();
    let _ = router.route(
        BUTTON_PIN,
        task(move || {
            info!("button pressed");
            blinker.blink(3);
        }),
    );
    app.register(router.module())?;

    Ok(Demo {
        sensor,
        _sampler: sampler,
        _publisher: publisher,
        _led: led,
        _router: router,
    })
}

fn run() -> Result<(), SystemError> {
    let clock = Rc::new(StdClock {
        start: Instant::now(),
    });
    let config = AppConfig::default().with_log_kind(LogKind::Facade);
    let mut app = App::new(config, clock)?;
    let demo = build(&mut app)?;
    app.setup()?;

    std::thread::spawn(|| {
        loop {
            std::thread::sleep(BUTTON_PERIOD);
            if !WAKES.raise(BUTTON_PIN) {
                info!("button wake already pending");
            }
        }
    });

    let started = Instant::now();
    let mut passes: u64 = 0;
    while started.elapsed() < SIM_DURATION {
        app.loop_once()?;
        passes += 1;
        std::thread::sleep(LOOP_INTERVAL);
    }

    info!(
        "Simulator exiting after {} passes and {} samples",
        passes,
        demo.sensor.samples.get()
    );
    Ok(())
}

fn main() {
    env_logger::init();
    info!("Starting loam simulator");

    if let Err(e) = run() {
        error!("Simulator stopped: {}", e);
        std::process::exit(1);
    }
}
