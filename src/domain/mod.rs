//! Domain layer types and invariants.

pub mod authors;
pub mod content;
pub mod error;
pub mod files;
pub mod posts;
pub mod slug;
