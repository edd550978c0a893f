//! Application services: the content pipeline and its consumers.

pub mod blog;
pub mod error;
pub mod fetcher;
pub mod lister;
pub mod processor;
pub mod remote;
pub mod render;
pub mod sitemap;
