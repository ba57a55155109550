#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;

use alloc::rc::Rc;
use critical_section::Mutex;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Event, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::handler;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};

use loam_core::blink_led::BlinkLed;
use loam_core::interrupts::{InterruptRouter, PinId, WakeQueue};
use loam_core::{App, AppConfig, Clock, LogKind, Millis, task};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// BOOT button on most ESP32-S3 dev boards.
const BUTTON_PIN: PinId = 0;

/// Pause between loop passes.
const LOOP_INTERVAL: Duration = Duration::from_millis(1);

static WAKES: WakeQueue<4> = WakeQueue::new();
static BUTTON: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));

/// Milliseconds since boot from the system timer.
struct EspClock;

impl Clock for EspClock {
    fn now_ms(&self) -> Millis {
        esp_hal::time::Instant::now()
            .duration_since_epoch()
            .as_millis() as Millis
    }
}

#[handler]
fn gpio_handler() {
    critical_section::with(|cs| {
        if let Some(button) = BUTTON.borrow_ref_mut(cs).as_mut() {
            if button.is_interrupt_set() {
                button.clear_interrupt();
                let _ = WAKES.raise(BUTTON_PIN);
            }
        }
    });
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // Button interrupt only records a wake; the router picks it up in the loop.
    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(gpio_handler);
    let mut button = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );
    critical_section::with(|cs| {
        button.listen(Event::FallingEdge);
        BUTTON.borrow_ref_mut(cs).replace(button);
    });

    let led_pin = Output::new(peripherals.GPIO2, Level::High, OutputConfig::default());

    let app_config = AppConfig::default().with_log_kind(LogKind::Facade);
    let mut app = match App::new(app_config, Rc::new(EspClock)) {
        Ok(app) => app,
        Err(e) => halt(e),
    };

    let led = Rc::new(BlinkLed::new("status", led_pin, 200).with_off_msec(200));
    if let Err(e) = app.register(led.module()) {
        halt(e);
    }

    let router = InterruptRouter::new(&WAKES, app.logger().clone());
    let blinker = led.clone();
    let _ = router.route(BUTTON_PIN, task(move || blinker.blink(2)));
    if let Err(e) = app.register(router.module()) {
        halt(e);
    }

    if let Err(e) = app.setup() {
        halt(e);
    }
    led.blink(3);

    let _ = spawner;

    loop {
        if let Err(e) = app.loop_once() {
            error!("Loop failed: {}", e);
        }
        Timer::after(LOOP_INTERVAL).await;
    }
}

/// Setup failures leave no useful degraded mode: report and stop.
fn halt(e: loam_core::SystemError) -> ! {
    error!("Setup failed: {}", e);
    loop {
        core::hint::spin_loop();
    }
}
