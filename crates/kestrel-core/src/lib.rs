pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod fuzzy;
pub mod platform;
pub mod plugin;
pub mod query;
pub mod router;

mod engine;
mod error;

#[cfg(test)]
mod tests;

pub use engine::{Launcher, QueryTicket};
pub use error::{Error, Result};

pub use kestrel_types::*;
