//! Markdown document parsing and derived fields.
//!
//! A document is an optional leading YAML block fenced by `---` lines
//! followed by a markdown body. Excerpts and reading time are derived from a
//! plain-text rendition of the body.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, format_description::FormatItem,
    format_description::well_known::Rfc3339, macros::format_description,
};

use super::error::ContentError;
use super::posts::PostMetadata;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATETIME_T_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const DATETIME_SPACE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const ELLIPSIS: &str = "...";
const MIN_SENTENCE_CHARS: usize = 20;

static THEMATIC_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?m)^[ \t]*(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$"));
static HEADER_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?m)^#{1,6}[ \t]+.*$"));
static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| compile(r"```[\s\S]*?```"));
static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| compile(r"`[^`]*`"));
static IMAGE_RE: Lazy<Regex> = Lazy::new(|| compile(r"!\[[^\]]*\]\([^)]*\)"));
static LINK_RE: Lazy<Regex> = Lazy::new(|| compile(r"\[([^\]]+)\]\([^)]+\)"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| compile(r"\*\*([^*]+)\*\*"));
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| compile(r"\*([^*]+)\*"));
static MARKUP_CHARS_RE: Lazy<Regex> = Lazy::new(|| compile(r"[#*_`]"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| compile(r"\s+"));
static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| compile(r"[.!?]+"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is valid")
}

/// Front matter as written, with loosely typed fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontMatter {
    pub title: Option<Value>,
    pub slug: Option<Value>,
    pub excerpt: Option<Value>,
    pub author: Option<Value>,
    pub published_at: Option<Value>,
    pub date: Option<Value>,
    pub updated_at: Option<Value>,
    pub tags: Option<Value>,
    pub emoji: Option<Value>,
    pub featured: Option<Value>,
    pub read_time: Option<Value>,
    pub cover_image: Option<Value>,
    pub metadata: Option<Value>,
}

/// A document split into its header and markdown body.
#[derive(Debug)]
pub struct Document<'a> {
    pub front_matter: FrontMatter,
    pub body: &'a str,
}

impl<'a> Document<'a> {
    pub fn parse(raw: &'a str) -> Result<Self, ContentError> {
        let (header, body) = split_front_matter(raw);
        let front_matter = match header {
            Some(header) => parse_front_matter(header)?,
            None => FrontMatter::default(),
        };
        Ok(Self { front_matter, body })
    }
}

impl FrontMatter {
    pub fn title(&self) -> Option<String> {
        self.title.as_ref().and_then(scalar_text)
    }

    pub fn slug(&self) -> Option<String> {
        self.slug.as_ref().and_then(scalar_text)
    }

    pub fn excerpt(&self) -> Option<String> {
        self.excerpt.as_ref().and_then(scalar_text)
    }

    pub fn emoji(&self) -> Option<String> {
        self.emoji.as_ref().and_then(scalar_text)
    }

    pub fn cover_image(&self) -> Option<String> {
        self.cover_image.as_ref().and_then(scalar_text)
    }

    /// `true` only for a boolean `true` or the string `"true"`.
    pub fn featured(&self) -> bool {
        match &self.featured {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => text == "true",
            _ => false,
        }
    }

    /// Tags in declaration order; anything but a sequence yields none.
    pub fn tags(&self) -> Vec<String> {
        match &self.tags {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_text).collect(),
            _ => Vec::new(),
        }
    }

    /// A positive supplied reading time, in whole minutes.
    pub fn read_time(&self) -> Option<u32> {
        let minutes = match self.read_time.as_ref()? {
            Value::Number(number) => number.as_f64()?,
            Value::String(text) => text.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !minutes.is_finite() || minutes <= 0.0 {
            return None;
        }
        u32::try_from(minutes.ceil() as u64).ok()
    }

    /// `publishedAt`, falling back to `date`.
    pub fn published_at(&self) -> Result<Option<OffsetDateTime>, ContentError> {
        match (&self.published_at, &self.date) {
            (Some(value), _) if !value.is_null() => parse_date_value("publishedAt", value),
            (_, Some(value)) => parse_date_value("date", value),
            _ => Ok(None),
        }
    }

    pub fn updated_at(&self) -> Result<Option<OffsetDateTime>, ContentError> {
        match &self.updated_at {
            Some(value) => parse_date_value("updatedAt", value),
            None => Ok(None),
        }
    }

    pub fn metadata(&self) -> Result<Option<PostMetadata>, ContentError> {
        match &self.metadata {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|err| ContentError::invalid_field("metadata", err.to_string())),
        }
    }
}

/// Split a leading `---` fenced block from the body.
///
/// The closing fence may be `---` or `...`. Content without a complete
/// fence is returned whole as the body.
pub fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let Some(rest) = text.strip_prefix("---") else {
        return (None, text);
    };
    let Some(newline) = rest.find('\n') else {
        return (None, text);
    };
    if !rest[..newline].trim().is_empty() {
        return (None, text);
    }

    let header_block = &rest[newline + 1..];
    let mut offset = 0;
    for line in header_block.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return (
                Some(&header_block[..offset]),
                &header_block[offset + line.len()..],
            );
        }
        offset += line.len();
    }

    (None, text)
}

fn parse_front_matter(header: &str) -> Result<FrontMatter, ContentError> {
    if header.trim().is_empty() {
        return Ok(FrontMatter::default());
    }

    let value: Value =
        serde_yaml::from_str(header).map_err(|err| ContentError::front_matter(err.to_string()))?;

    match value {
        Value::Null => Ok(FrontMatter::default()),
        Value::Mapping(_) => {
            serde_yaml::from_value(value).map_err(|err| ContentError::front_matter(err.to_string()))
        }
        _ => Err(ContentError::front_matter("expected a mapping")),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn parse_date_value(
    field: &'static str,
    value: &Value,
) -> Result<Option<OffsetDateTime>, ContentError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => parse_date(text)
            .map(Some)
            .ok_or_else(|| ContentError::invalid_field(field, format!("`{text}` is not a date"))),
        other => Err(ContentError::invalid_field(
            field,
            format!("expected a date string, found {other:?}"),
        )),
    }
}

/// Parse RFC 3339, a bare `YYYY-MM-DD` (midnight UTC), or a naive
/// `YYYY-MM-DD[T ]HH:MM:SS` taken as UTC.
pub fn parse_date(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();

    if let Ok(instant) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(instant);
    }
    if let Ok(date) = Date::parse(text, DATE_FORMAT) {
        return Some(date.midnight().assume_utc());
    }
    [DATETIME_T_FORMAT, DATETIME_SPACE_FORMAT]
        .into_iter()
        .find_map(|format| PrimitiveDateTime::parse(text, format).ok())
        .map(PrimitiveDateTime::assume_utc)
}

/// Plain text of a markdown body for excerpts.
pub fn plain_text(markdown: &str) -> String {
    let text = THEMATIC_BREAK_RE.replace_all(markdown, "");
    let text = HEADER_RE.replace_all(&text, "");
    let text = CODE_FENCE_RE.replace_all(&text, "");
    let text = INLINE_CODE_RE.replace_all(&text, "");
    let text = IMAGE_RE.replace_all(&text, "");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = BOLD_RE.replace_all(&text, "$1");
    let text = ITALIC_RE.replace_all(&text, "$1");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Summarize a markdown body in at most `max_chars` characters.
///
/// Whole sentences longer than 20 characters are joined while they fit; the
/// leading characters are used when none qualify. A result that reaches the
/// limit is cut at a word boundary and suffixed with `...`.
pub fn generate_excerpt(markdown: &str, max_chars: usize) -> String {
    let clean = plain_text(markdown);

    let mut excerpt = String::new();
    let mut excerpt_len = 0;
    for sentence in SENTENCE_END_RE.split(&clean) {
        let sentence = sentence.trim();
        let sentence_len = sentence.chars().count();
        if sentence_len <= MIN_SENTENCE_CHARS {
            continue;
        }
        if excerpt_len + sentence_len > max_chars {
            break;
        }
        if !excerpt.is_empty() {
            excerpt.push_str(". ");
            excerpt_len += 2;
        }
        excerpt.push_str(sentence);
        excerpt_len += sentence_len;
    }

    if excerpt.is_empty() {
        excerpt = clean.chars().take(max_chars).collect();
        excerpt_len = excerpt.chars().count();
    }

    if excerpt_len >= max_chars {
        return truncate_at_word(&excerpt, max_chars);
    }
    excerpt
}

fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if max_chars <= ELLIPSIS.len() {
        return chars.into_iter().take(max_chars).collect();
    }

    let limit = max_chars - ELLIPSIS.len();
    let search_end = limit.min(chars.len().saturating_sub(1));
    let cut = chars[..=search_end]
        .iter()
        .rposition(|ch| *ch == ' ')
        .filter(|index| *index > 0)
        .unwrap_or(limit)
        .min(chars.len());

    let mut out: String = chars[..cut].iter().collect();
    out.push_str(ELLIPSIS);
    out
}

/// Reading time in whole minutes, at least one.
pub fn calculate_read_time(markdown: &str, words_per_minute: u32) -> u32 {
    let text = THEMATIC_BREAK_RE.replace_all(markdown, "");
    let text = CODE_FENCE_RE.replace_all(&text, "");
    let text = INLINE_CODE_RE.replace_all(&text, "");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = MARKUP_CHARS_RE.replace_all(&text, "");

    let words = u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX);
    words.div_ceil(words_per_minute.max(1)).max(1)
}
