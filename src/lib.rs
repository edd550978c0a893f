//! Content pipeline for a statically generated blog.
//!
//! Markdown articles are listed from a GitHub repository directory,
//! downloaded by content hash, normalized into [`domain::posts::Post`]
//! values and cached in a memory tier backed by a durable tier.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
