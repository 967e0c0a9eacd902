//! GitHub Releases API client and types.

pub mod client;
pub mod types;

pub use client::ReleaseClient;
pub use types::{Asset, Release};
