//! Turns a raw markdown file into a canonical [`Post`].

use std::sync::Arc;

use crate::application::error::PipelineError;
use crate::application::render::MarkdownRenderer;
use crate::cache::Clock;
use crate::domain::{
    authors::resolve_author,
    content::{Document, calculate_read_time, generate_excerpt},
    error::ContentError,
    files::RemoteFile,
    posts::{DEFAULT_EMOJI, Post},
    slug::derive_slug_with_fallback,
};

pub const DEFAULT_EXCERPT_LENGTH: usize = 160;
pub const DEFAULT_WORDS_PER_MINUTE: u32 = 200;

pub struct PostProcessor {
    renderer: Arc<dyn MarkdownRenderer>,
    clock: Arc<dyn Clock>,
    excerpt_length: usize,
    words_per_minute: u32,
}

impl PostProcessor {
    pub fn new(renderer: Arc<dyn MarkdownRenderer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            renderer,
            clock,
            excerpt_length: DEFAULT_EXCERPT_LENGTH,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }

    pub fn with_excerpt_length(mut self, excerpt_length: usize) -> Self {
        self.excerpt_length = excerpt_length;
        self
    }

    pub fn with_words_per_minute(mut self, words_per_minute: u32) -> Self {
        self.words_per_minute = words_per_minute;
        self
    }

    pub fn process(&self, raw: &str, file: &RemoteFile) -> Result<Post, PipelineError> {
        self.build(raw, file)
            .map_err(|source| PipelineError::validation(&file.name, source))
    }

    fn build(&self, raw: &str, file: &RemoteFile) -> Result<Post, ContentError> {
        let Document { front_matter, body } = Document::parse(raw)?;

        let author = resolve_author(front_matter.author.clone())?;

        let title = front_matter
            .title()
            .unwrap_or_else(|| file.stem().to_string());
        let slug_source = front_matter.slug().unwrap_or_else(|| title.clone());
        let slug = derive_slug_with_fallback([slug_source.as_str(), file.stem()])?;

        let published_at = match front_matter.published_at()? {
            Some(instant) => instant,
            None => self.clock.now(),
        };
        let updated_at = front_matter.updated_at()?;

        let excerpt = front_matter
            .excerpt()
            .unwrap_or_else(|| generate_excerpt(body, self.excerpt_length));
        let read_time = front_matter
            .read_time()
            .unwrap_or_else(|| calculate_read_time(body, self.words_per_minute));

        let content = self
            .renderer
            .render(body)
            .map_err(|err| ContentError::render(err.to_string()))?;

        Ok(Post {
            id: file.sha.clone(),
            slug,
            title,
            excerpt,
            content,
            author,
            published_at,
            updated_at,
            tags: front_matter.tags(),
            emoji: front_matter
                .emoji()
                .unwrap_or_else(|| DEFAULT_EMOJI.to_string()),
            read_time,
            featured: front_matter.featured(),
            cover_image: front_matter.cover_image(),
            metadata: front_matter.metadata()?,
        })
    }
}
