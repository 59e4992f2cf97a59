//! Utility modules for rangetrace

pub mod logging;

pub use logging::{init_logging, log_level};
