//! HTTP API over the orchestrator

mod handlers;
mod server;
mod types;

pub use handlers::AppState;
pub use server::{router, Server};
pub use types::*;
