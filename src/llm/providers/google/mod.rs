//! Google provider adapter

pub mod client;
pub mod config;
pub mod types;

pub use client::{extract_deltas, GoogleClient};
