//! Hardware-independent core library for loam firmware
//!
//! This crate contains the platform-agnostic pieces every loam application is
//! built from: fixed-capacity ring buffers, the deadline-ordered task queue and
//! its scheduling handles, and the module system that resolves dependencies
//! between modules and runs their lifecycle callbacks in dependency order.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app;
pub mod blink_led;
pub mod config;
pub mod interrupts;
pub mod logger;
pub mod ring;
pub mod system;
pub mod tasks;
pub mod time;

pub use app::App;
pub use config::{AppConfig, LogKind};
pub use logger::Logger;
pub use system::{Module, ModuleId, ModuleSystem, NameToModule, SystemError};
pub use tasks::{Task, TaskId, Tasks, task};
pub use time::{Clock, Millis};
