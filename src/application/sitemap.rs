//! Sitemap service for sitemap.xml and robots.txt generation.
//!
//! Works from an already fetched post collection so that sitemap builds
//! reuse the cached aggregate.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::domain::posts::Post;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeFrequency {
    Daily,
    Weekly,
}

impl ChangeFrequency {
    fn as_str(self) -> &'static str {
        match self {
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
        }
    }
}

/// Service for generating sitemap.xml and robots.txt.
#[derive(Debug, Clone)]
pub struct SitemapService {
    base: String,
}

impl SitemapService {
    pub fn new(public_site_url: &str) -> Self {
        Self {
            base: normalize_public_site_url(public_site_url),
        }
    }

    /// Generate sitemap.xml content.
    ///
    /// Static pages are stamped with `generated_at`; posts with their last
    /// modification.
    pub fn sitemap_xml(&self, posts: &[Post], generated_at: OffsetDateTime) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );

        xml.push_str(&self.entry("/", generated_at, ChangeFrequency::Daily, "1.0"));
        xml.push_str(&self.entry("/articles", generated_at, ChangeFrequency::Daily, "0.9"));

        for post in posts {
            xml.push_str(&self.entry(
                &format!("/articles/{}", post.slug),
                post.last_modified(),
                ChangeFrequency::Weekly,
                "0.8",
            ));
        }

        xml.push_str("</urlset>\n");
        xml
    }

    /// Generate robots.txt content.
    pub fn robots_txt(&self) -> String {
        let sitemap_url = format!("{}sitemap.xml", self.base);
        format!("User-agent: *\nAllow: /\nSitemap: {sitemap_url}\n")
    }

    fn entry(
        &self,
        path: &str,
        lastmod: OffsetDateTime,
        changefreq: ChangeFrequency,
        priority: &str,
    ) -> String {
        let loc = escape_xml(&canonical_url(&self.base, path));
        let lastmod = lastmod
            .format(&Rfc3339)
            .map(|formatted| format!("<lastmod>{formatted}</lastmod>"))
            .unwrap_or_default();
        format!(
            "  <url><loc>{loc}</loc>{lastmod}<changefreq>{}</changefreq><priority>{priority}</priority></url>\n",
            changefreq.as_str()
        )
    }
}

fn normalize_public_site_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    format!("{trimmed}/")
}

fn canonical_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path == "/" {
        base.to_string()
    } else {
        format!("{base}{path}")
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
