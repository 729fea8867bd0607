//! Logging for the shadow map runtime.

#[macro_use]
mod macros;

pub use log::{
    Level, LevelFilter, Log, Metadata, Record, debug, error, info, log_enabled, set_logger,
    set_max_level, trace, warn,
};
