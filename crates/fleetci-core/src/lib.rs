pub mod access;
pub mod cache;
pub mod config;
pub mod error;
pub mod io;
pub mod metrics;
pub mod parser;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{FleetError, Result};
