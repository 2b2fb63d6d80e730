//! Upstream registry module
//!
//! Forwards requests that passed the tag filter to the registry being protected.

pub mod client;

pub use client::UpstreamClient;
