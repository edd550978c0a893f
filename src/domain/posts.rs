//! Canonical post shape handed to the rendering layer.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const DEFAULT_EMOJI: &str = "📝";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub name: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Optional SEO block passed through from front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Content hash of the source file.
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    /// Rendered HTML.
    pub content: String,
    pub author: AuthorProfile,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub emoji: String,
    pub read_time: u32,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PostMetadata>,
}

/// Post without its body, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary<'a> {
    pub id: &'a str,
    pub slug: &'a str,
    pub title: &'a str,
    pub excerpt: &'a str,
    pub author: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    pub tags: &'a [String],
    pub emoji: &'a str,
    pub read_time: u32,
    pub featured: bool,
}

impl Post {
    pub fn summary(&self) -> PostSummary<'_> {
        PostSummary {
            id: &self.id,
            slug: &self.slug,
            title: &self.title,
            excerpt: &self.excerpt,
            author: &self.author.name,
            published_at: self.published_at,
            tags: &self.tags,
            emoji: &self.emoji,
            read_time: self.read_time,
            featured: self.featured,
        }
    }

    /// Most recent modification instant.
    pub fn last_modified(&self) -> OffsetDateTime {
        self.updated_at.unwrap_or(self.published_at)
    }
}

/// Order by publication date, newest first. Equal dates keep their order.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
