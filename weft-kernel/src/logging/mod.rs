//! Kernel logging: the `log` facade, a lock-free ring and a console sink

pub mod buffer;
mod logger;

pub use logger::{init, set_console, transition_to_drain};
