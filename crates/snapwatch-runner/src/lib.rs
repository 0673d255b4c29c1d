//! Imperative shell: config file, store/notifier wiring and the
//! load → collect → plan → send → save pipeline.

pub mod config;
pub mod pipeline;
pub mod runner;

pub use config::*;
pub use pipeline::*;
pub use runner::*;
