//! Remote content file identity.

use serde::{Deserialize, Serialize};

const MARKDOWN_EXTENSION: &str = ".md";

/// A markdown file in the content directory.
///
/// `sha` identifies the bytes; two files with the same `sha` have the same
/// body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub download_url: String,
    pub sha: String,
}

impl RemoteFile {
    /// Build a file from a directory entry, keeping only markdown files.
    pub fn from_entry(
        name: &str,
        kind: &str,
        download_url: Option<&str>,
        sha: &str,
    ) -> Option<Self> {
        if kind != "file" || !is_markdown(name) {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            download_url: download_url?.to_string(),
            sha: sha.to_string(),
        })
    }

    /// File name without the `.md` extension.
    pub fn stem(&self) -> &str {
        let cut = self.name.len().saturating_sub(MARKDOWN_EXTENSION.len());
        match self.name.get(cut..) {
            Some(ext) if ext.eq_ignore_ascii_case(MARKDOWN_EXTENSION) => &self.name[..cut],
            _ => &self.name,
        }
    }
}

fn is_markdown(name: &str) -> bool {
    let cut = name.len().saturating_sub(MARKDOWN_EXTENSION.len());
    name.len() > MARKDOWN_EXTENSION.len()
        && name
            .get(cut..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_markdown_files_only() {
        let url = Some("https://raw.example/post.md");
        assert!(RemoteFile::from_entry("post.md", "file", url, "1").is_some());
        assert!(RemoteFile::from_entry("POST.MD", "file", url, "1").is_some());
        assert!(RemoteFile::from_entry("image.png", "file", url, "1").is_none());
        assert!(RemoteFile::from_entry("drafts.md", "dir", None, "1").is_none());
        assert!(RemoteFile::from_entry(".md", "file", url, "1").is_none());
        assert!(RemoteFile::from_entry("post.md", "file", None, "1").is_none());
    }

    #[test]
    fn stem_strips_extension() {
        let file = RemoteFile::from_entry("hola-mundo.MD", "file", Some("u"), "1").expect("file");
        assert_eq!(file.stem(), "hola-mundo");
    }

    #[test]
    fn stem_of_multibyte_name() {
        let file = RemoteFile {
            name: "árbol.md".to_string(),
            download_url: "u".to_string(),
            sha: "1".to_string(),
        };
        assert_eq!(file.stem(), "árbol");
    }
}
