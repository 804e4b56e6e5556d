//! Data models

mod application;
mod log;

pub use application::*;
pub use log::*;
