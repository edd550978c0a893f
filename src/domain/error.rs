use thiserror::Error;

use super::slug::SlugError;

/// Reasons a content file cannot become a post.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("author is mandatory and cannot be empty")]
    MissingAuthor,
    #[error("author profile has no name")]
    AuthorWithoutName,
    #[error("front matter is malformed: {message}")]
    FrontMatter { message: String },
    #[error("front matter field `{field}` is unusable: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("markdown could not be rendered: {message}")]
    Render { message: String },
    #[error(transparent)]
    Slug(#[from] SlugError),
}

impl ContentError {
    pub fn front_matter(message: impl Into<String>) -> Self {
        Self::FrontMatter {
            message: message.into(),
        }
    }

    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }
}
