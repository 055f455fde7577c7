//! E-nose pump control: cancel in-flight manual stepper motion without
//! letting the step generator run ahead of the stop.

pub mod config;
pub mod gcode;
pub mod hardware;
pub mod motion;
pub mod printer;
pub mod scheduler;
pub mod stop;
pub mod web;

pub use config::{Config, ConfigError, load_config};
pub use printer::{Printer, PrinterError};
pub use stop::{StopReport, StopTargets};
