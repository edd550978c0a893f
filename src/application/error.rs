use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

use crate::{
    application::remote::TransportError, config::LoadError, domain::error::ContentError,
    infra::error::InfraError,
};

/// Failures surfaced by the content pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("remote rate limit exhausted; resets in {}s", wait.as_secs())]
    RateLimit { wait: Duration },
    #[error("listing the content directory failed")]
    Upstream(#[source] TransportError),
    #[error("fetching `{file}` failed")]
    Fetch {
        file: String,
        #[source]
        source: TransportError,
    },
    #[error("`{file}` is not a valid post")]
    Validation {
        file: String,
        #[source]
        source: ContentError,
    },
    #[error("no posts available and no fallback cached")]
    AggregateFetch(#[source] Box<PipelineError>),
}

impl PipelineError {
    pub fn validation(file: impl Into<String>, source: ContentError) -> Self {
        Self::Validation {
            file: file.into(),
            source,
        }
    }
}

/// Flatten an error and its sources into one line per cause.
pub fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
