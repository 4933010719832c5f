pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod error_recovery;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod playback;
pub mod queue;
pub mod source;

#[cfg(test)]
mod integration_tests;

pub use error::*;
pub use models::*;
