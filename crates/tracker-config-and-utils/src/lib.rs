//! Configuration, file system layout and logging setup for the tracker
//! pipeline.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    MarshallerKind, TrackerConfig, DEFAULT_LOG_LEVEL, DEFAULT_SERVER_HOST,
    MAX_DATA_VALIDITY_PERIOD_DAYS, MIN_DATA_VALIDITY_PERIOD_DAYS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
