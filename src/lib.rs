pub mod agent;
pub mod checks;
mod config;
pub mod container;
mod error;
pub mod harness;
pub mod hub;
pub mod mcp;
pub mod probe;
pub mod report;
pub mod sse;
pub mod term;
#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::{Error, Result};
