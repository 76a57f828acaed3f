pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod prompt;
pub mod session;
pub mod task;
pub mod transport;
