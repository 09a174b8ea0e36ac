/// Search Service client module
mod client;
mod types;
mod writeback;

pub use client::{ProgramSource, SearchClient};
pub use types::*;
pub use writeback::WritebackClient;
