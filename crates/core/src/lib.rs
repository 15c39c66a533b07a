// Queueline Core - Queue rules, ports and coordination
// No infrastructure dependencies: storage and transport live in adapter crates

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, ErrorDetail, ErrorKind, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
