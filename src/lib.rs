pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod manager;
pub mod store;
pub mod worker;

pub use error::{Error, Result};
