//! Configuration types for the delivery engine.
//!
//! These types represent the validated runtime configuration used by the
//! processors. Loading and parsing the configuration file is handled by the
//! server crate.

mod alert;
mod config_store;
mod scheduler;
mod stream;

pub use alert::AlertConfig;
pub use config_store::{ConfigStore, ConfigWatcher};
pub use scheduler::SchedulerConfig;
pub use stream::StreamConfig;
