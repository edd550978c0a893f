//! Author resolution.
//!
//! Front matter may name a known author by key or inline a full profile.

use serde::Deserialize;

use super::error::ContentError;
use super::posts::AuthorProfile;

pub const GENERIC_AVATAR: &str = "https://github.com/surus.png";
const CONTRIBUTOR_BIO: &str = "Contributor";

struct KnownAuthor {
    key: &'static str,
    name: &'static str,
    avatar: &'static str,
    bio: &'static str,
}

const KNOWN_AUTHORS: &[KnownAuthor] = &[
    KnownAuthor {
        key: "marian",
        name: "Marian Basti",
        avatar: "https://avatars.githubusercontent.com/u/31198560",
        bio: "CTO de surus",
    },
    KnownAuthor {
        key: "surus",
        name: "surus Team",
        avatar: GENERIC_AVATAR,
        bio: "Tech enthusiasts",
    },
];

/// The `author` front-matter field as written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AuthorField {
    Named(String),
    Profile {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        bio: Option<String>,
    },
}

impl AuthorField {
    pub fn resolve(self) -> Result<AuthorProfile, ContentError> {
        match self {
            AuthorField::Named(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ContentError::MissingAuthor);
                }
                Ok(lookup(name).unwrap_or_else(|| AuthorProfile {
                    name: name.to_string(),
                    avatar: GENERIC_AVATAR.to_string(),
                    bio: Some(CONTRIBUTOR_BIO.to_string()),
                }))
            }
            AuthorField::Profile { name, avatar, bio } => {
                let name = name
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .ok_or(ContentError::AuthorWithoutName)?;
                let avatar = avatar
                    .filter(|avatar| !avatar.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_AVATAR.to_string());
                Ok(AuthorProfile { name, avatar, bio })
            }
        }
    }
}

fn lookup(key: &str) -> Option<AuthorProfile> {
    KNOWN_AUTHORS
        .iter()
        .find(|author| author.key == key)
        .map(|author| AuthorProfile {
            name: author.name.to_string(),
            avatar: author.avatar.to_string(),
            bio: Some(author.bio.to_string()),
        })
}

/// Resolve the raw `author` value; absent or null is rejected.
pub fn resolve_author(raw: Option<serde_yaml::Value>) -> Result<AuthorProfile, ContentError> {
    let raw = match raw {
        None | Some(serde_yaml::Value::Null) => return Err(ContentError::MissingAuthor),
        Some(raw) => raw,
    };

    let field: AuthorField = serde_yaml::from_value(raw)
        .map_err(|err| ContentError::invalid_field("author", err.to_string()))?;
    field.resolve()
}
