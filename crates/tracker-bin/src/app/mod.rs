//! Command implementations.

mod commands;
mod daemon;

pub use commands::{
    build_event, clear, flush, init_config, migrate, parse_attribute, show_config, status, track,
};
pub use daemon::run_daemon;
