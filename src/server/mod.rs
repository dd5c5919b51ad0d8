//! Stats server, static assets, and the submission client

pub mod assets;
pub mod client;
pub mod service;

// Re-export main types and functions
pub use assets::{content_type_for, AssetDir};
pub use client::StatsClient;
pub use service::{compress_data, decompress_data, router, serve, ServerState};
